//! Terminal configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parser::{DEFAULT_MAX_PARAMS, DEFAULT_MAX_SUB_PARAMS, PAYLOAD_LIMIT};

/// Buffer dimensions and parser limits
///
/// Missing fields in a config file take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Number of columns
    pub cols: usize,
    /// Number of visible rows
    pub rows: usize,
    /// Rows kept above the viewport
    pub scrollback: usize,
    /// Maximum OSC/DCS/APC payload in codepoints
    pub payload_limit: usize,
    /// Maximum number of CSI/DCS parameters
    pub max_params: usize,
    /// Maximum number of sub-parameters
    pub max_sub_params: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback: 1000,
            payload_limit: PAYLOAD_LIMIT,
            max_params: DEFAULT_MAX_PARAMS,
            max_sub_params: DEFAULT_MAX_SUB_PARAMS,
        }
    }
}

impl TerminalConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TerminalConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `~/.config/vtcore/config.json`, falling back to defaults
    pub fn load_or_default() -> Self {
        if let Some(config_dir) = config_dir() {
            let config_path = config_dir.join("config.json");
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return config;
                }
            }
        }
        Self::default()
    }
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("vtcore"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_config_default() {
        let config = TerminalConfig::default();
        assert_eq!((config.cols, config.rows), (80, 24));
        assert_eq!(config.scrollback, 1000);
        assert_eq!(config.payload_limit, PAYLOAD_LIMIT);
        assert_eq!(config.max_params, 32);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TerminalConfig {
            cols: 132,
            scrollback: 0,
            ..TerminalConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TerminalConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"rows": 50}"#).unwrap();
        let config = TerminalConfig::load(&path).unwrap();
        assert_eq!(config.rows, 50);
        assert_eq!(config.cols, 80);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(TerminalConfig::load(&missing), Err(Error::Io(_))));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(TerminalConfig::load(&bad), Err(Error::Json(_))));
    }
}
