//! vtcore terminal emulation core
//!
//! A VT500-compatible escape sequence parser and the buffer model it drives,
//! without any rendering or PTY layer.
//!
//! - `parser`: transition-table parser with CSI/ESC handler chains and
//!   OSC/DCS/APC sub-parsers
//! - `buffer`: packed cells and lines, the scrollback ring buffer, markers
//! - `input`: handlers that apply parsed sequences to a buffer
//! - `snapshot`: serializable view of a buffer for tests and tooling

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod input;
pub mod parser;
pub mod snapshot;

pub use buffer::Buffer;
pub use config::TerminalConfig;
pub use error::{Error, Result};
pub use input::InputHandler;
pub use parser::EscapeSequenceParser;
pub use snapshot::Snapshot;
