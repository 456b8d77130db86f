//! Deterministic buffer snapshots
//!
//! A snapshot captures the viewport, cursor and scroll state of a
//! [`Buffer`] in a serializable form. Feeding the same byte stream into a
//! fresh buffer yields an identical snapshot.

use serde::{Deserialize, Serialize};

use crate::buffer::{AttributeData, Buffer, CellData, ColorMode, UnderlineStyle};

/// Viewport state of a buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cols: usize,
    pub rows: usize,
    /// Visible rows, top to bottom
    pub grid: Vec<Vec<CellSnapshot>>,
    /// Soft-wrap flag of each visible row
    pub wrapped: Vec<bool>,
    pub cursor: CursorSnapshot,
    pub scroll_top: usize,
    pub scroll_bottom: usize,
    pub title: String,
    /// Rows above the viewport
    pub scrollback_lines: usize,
}

/// A single cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub content: String,
    pub fg: ColorSnapshot,
    pub bg: ColorSnapshot,
    pub style: StyleSnapshot,
    /// 0 for the right half of a wide char
    pub width: u8,
    /// Target of the OSC 8 link covering the cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColorSnapshot {
    Default,
    Indexed { index: u8 },
    Rgb { r: u8, g: u8, b: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleSnapshot {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dim: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_none_style")]
    pub underline: UnderlineStyle,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blink: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inverse: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub invisible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub overline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub protected: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_none_style(style: &UnderlineStyle) -> bool {
    *style == UnderlineStyle::None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub col: usize,
    pub row: usize,
}

impl ColorSnapshot {
    fn new(mode: ColorMode, value: Option<u32>) -> Self {
        let value = value.unwrap_or(0);
        match mode {
            ColorMode::Default => ColorSnapshot::Default,
            ColorMode::P16 | ColorMode::P256 => ColorSnapshot::Indexed {
                index: (value & 0xff) as u8,
            },
            ColorMode::Rgb => {
                let [r, g, b] = AttributeData::to_color_rgb(value);
                ColorSnapshot::Rgb { r, g, b }
            }
        }
    }
}

impl From<&AttributeData> for StyleSnapshot {
    fn from(attr: &AttributeData) -> Self {
        StyleSnapshot {
            bold: attr.is_bold(),
            dim: attr.is_dim(),
            italic: attr.is_italic(),
            underline: attr.underline_style(),
            blink: attr.is_blink(),
            inverse: attr.is_inverse(),
            invisible: attr.is_invisible(),
            strikethrough: attr.is_strikethrough(),
            overline: attr.is_overline(),
            protected: attr.is_protected(),
        }
    }
}

impl CellSnapshot {
    fn new(cell: &CellData, buffer: &Buffer) -> Self {
        let attr = &cell.attr;
        let url_id = cell.extended().url_id();
        CellSnapshot {
            content: cell.chars(),
            fg: ColorSnapshot::new(attr.fg_color_mode(), attr.fg_color()),
            bg: ColorSnapshot::new(attr.bg_color_mode(), attr.bg_color()),
            style: StyleSnapshot::from(attr),
            width: cell.width() as u8,
            link: (url_id != 0)
                .then(|| buffer.links.uri(url_id).map(str::to_string))
                .flatten(),
        }
    }
}

impl Snapshot {
    /// Capture the viewport of `buffer`
    pub fn from_buffer(buffer: &Buffer) -> Self {
        let mut grid = Vec::with_capacity(buffer.rows());
        let mut wrapped = Vec::with_capacity(buffer.rows());
        let mut cell = CellData::new();

        for y in 0..buffer.rows() {
            let mut row = Vec::with_capacity(buffer.cols());
            match buffer.line(y) {
                Some(line) => {
                    for x in 0..line.len() {
                        row.push(CellSnapshot::new(line.load_cell(x, &mut cell), buffer));
                    }
                    wrapped.push(line.is_wrapped);
                }
                None => wrapped.push(false),
            }
            grid.push(row);
        }

        Snapshot {
            cols: buffer.cols(),
            rows: buffer.rows(),
            grid,
            wrapped,
            cursor: CursorSnapshot {
                col: buffer.x,
                row: buffer.y,
            },
            scroll_top: buffer.scroll_top,
            scroll_bottom: buffer.scroll_bottom,
            title: buffer.title.clone(),
            scrollback_lines: buffer.ybase,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Plain text of the grid, trailing blanks and empty rows removed
    pub fn to_text(&self) -> String {
        let mut result = String::new();
        for row in &self.grid {
            for cell in row {
                if cell.width == 0 {
                    continue;
                }
                if cell.content.is_empty() {
                    result.push(' ');
                } else {
                    result.push_str(&cell.content);
                }
            }
            while result.ends_with(' ') {
                result.pop();
            }
            result.push('\n');
        }
        while result.ends_with("\n\n") {
            result.pop();
        }
        result
    }

    /// Same dimensions and cells
    pub fn content_equals(&self, other: &Snapshot) -> bool {
        self.cols == other.cols && self.rows == other.rows && self.grid == other.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputHandler;

    fn snapshot(input: &str) -> Snapshot {
        let mut handler = InputHandler::new(6, 3, 10).unwrap();
        handler.parse_str(input).unwrap();
        Snapshot::from_buffer(handler.buffer())
    }

    #[test]
    fn test_snapshot_grid_and_cursor() {
        let snap = snapshot("Hi\r\n\x1b[1;38;5;100mX");
        assert_eq!(snap.grid[0][0].content, "H");
        assert_eq!(snap.grid[1][0].content, "X");
        assert!(snap.grid[1][0].style.bold);
        assert_eq!(snap.grid[1][0].fg, ColorSnapshot::Indexed { index: 100 });
        assert_eq!((snap.cursor.col, snap.cursor.row), (1, 1));
        assert_eq!(snap.to_text(), "Hi\nX\n");
    }

    #[test]
    fn test_snapshot_wide_and_wrapped() {
        let snap = snapshot("abcde\u{4e2d}");
        assert_eq!(snap.grid[1][0].width, 2);
        assert_eq!(snap.grid[1][1].width, 0);
        assert!(snap.wrapped[1]);
        assert_eq!(snap.to_text(), "abcde\n\u{4e2d}\n");
    }

    #[test]
    fn test_snapshot_link_and_json_roundtrip() {
        let snap = snapshot("\x1b]8;;http://example.com\x07L\x1b]8;;\x07\x1b[48;2;1;2;3mB");
        assert_eq!(snap.grid[0][0].link.as_deref(), Some("http://example.com"));
        assert_eq!(snap.grid[0][1].link, None);
        assert_eq!(snap.grid[0][1].bg, ColorSnapshot::Rgb { r: 1, g: 2, b: 3 });

        let json = snap.to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap();
        assert!(snap.content_equals(&restored));
    }
}
