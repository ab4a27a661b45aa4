//! Parse errors.

use thiserror::Error;

/// Errors produced while parsing a raw IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    #[error("empty message")]
    EmptyMessage,

    #[error("invalid or missing command")]
    InvalidCommand,
}
