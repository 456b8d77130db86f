//! Error types
//!
//! Malformed terminal input is never an error: the parser recovers and keeps
//! going. The variants here are contract violations by the caller (bad
//! parameter values, out-of-range list operations, feeding the parser while a
//! handler is still pending) and configuration I/O failures.

use thiserror::Error;

/// vtcore error type
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter or sub-parameter value below -1 was added
    #[error("values lesser than -1 are not allowed (got {0})")]
    InvalidParamValue(i32),

    /// A function identifier could not be encoded
    #[error("invalid function identifier: {0}")]
    InvalidIdentifier(String),

    /// An index passed to a list operation is outside the populated range
    #[error("start argument out of range")]
    StartOutOfRange,

    /// A shift would move elements in front of index 0
    #[error("Cannot shift elements in list beyond index 0")]
    ShiftBeyondStart,

    /// `recycle` was called on a list that has free capacity
    #[error("Can only recycle when the buffer is full")]
    RecycleNotFull,

    /// `parse` was called while a handler continuation is outstanding
    #[error("improper continuation due to previous async handler, giving up parsing")]
    ImproperContinuation,

    /// `resume` was called without a pending handler
    #[error("no suspended handler to resume")]
    NotSuspended,

    /// Configuration file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for vtcore operations
pub type Result<T> = std::result::Result<T, Error>;
