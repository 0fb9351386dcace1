//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing protocol lines
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line exceeds the maximum permitted length
    #[error("Line too long: {len} bytes exceeds maximum of {max} bytes")]
    LineTooLong { len: usize, max: usize },

    /// Line is not valid UTF-8
    #[error("Invalid UTF-8 in line: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
