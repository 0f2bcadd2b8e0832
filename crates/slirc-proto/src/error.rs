//! Errors from reading a line off the wire.

use thiserror::Error;

/// Convenience alias for results carrying a [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// A line that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Nothing but whitespace and line terminators.
    #[error("empty line")]
    Empty,

    /// A prefix with no command after it.
    #[error("missing command")]
    MissingCommand,

    /// The command needs more parameters than it was given.
    #[error("not enough parameters for {0}")]
    NeedMoreParams(&'static str),

    /// A parameter that should be numeric is not.
    #[error("invalid number in {command}: {value}")]
    InvalidNumber { command: &'static str, value: String },
}
