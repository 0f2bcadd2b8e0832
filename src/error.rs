//! Unified error handling for slircd-tree.
//!
//! Topology rejections live in `slirc_tree::TopologyError`; everything that
//! can go wrong on a server link is a [`LinkError`].

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

// ============================================================================
// Protocol Errors (line parsing, from slirc-proto)
// ============================================================================

pub use slirc_proto::ProtocolError;

// ============================================================================
// Link Errors (handshake and established links)
// ============================================================================

/// Errors that end a server link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no link block for server {0}")]
    UnknownServer(String),

    #[error("invalid password for server {0}")]
    AuthenticationFailed(String),

    #[error("server {name} announced SID {got}, expected {expected}")]
    SidMismatch {
        name: String,
        expected: String,
        got: String,
    },

    #[error("server {name} ({sid}) already exists")]
    Loop { name: String, sid: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid line: {0}")]
    Parse(#[from] ProtocolError),

    #[error("handshake timed out")]
    Timeout,

    #[error("peer sent ERROR: {0}")]
    Remote(String),

    #[error("link closed by peer")]
    Closed,

    #[error("sync manager is not running")]
    ManagerGone,

    #[error("codec error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownServer(_) => "unknown_server",
            Self::AuthenticationFailed(_) => "auth_failed",
            Self::SidMismatch { .. } => "sid_mismatch",
            Self::Loop { .. } => "loop",
            Self::Protocol(_) => "protocol",
            Self::Parse(_) => "parse",
            Self::Timeout => "timeout",
            Self::Remote(_) => "remote",
            Self::Closed => "closed",
            Self::ManagerGone => "manager_gone",
            Self::Codec(_) => "codec",
            Self::Io(_) => "io",
        }
    }

    /// Text for the `ERROR` line sent before closing, if the peer should
    /// be told why.
    pub fn peer_message(&self) -> Option<String> {
        match self {
            Self::UnknownServer(_) | Self::AuthenticationFailed(_) | Self::SidMismatch { .. } => {
                Some("Invalid credentials".to_string())
            }
            Self::Loop { .. } | Self::Protocol(_) | Self::Parse(_) => Some(self.to_string()),
            Self::Timeout => Some("Handshake timeout".to_string()),
            Self::Remote(_) | Self::Closed | Self::ManagerGone | Self::Codec(_) | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_not_leaked_to_peer() {
        let err = LinkError::AuthenticationFailed("leaf.example".to_string());
        assert_eq!(err.peer_message().as_deref(), Some("Invalid credentials"));
        assert_eq!(err.error_code(), "auth_failed");
    }

    #[test]
    fn loop_is_reported_to_peer() {
        let err = LinkError::Loop {
            name: "leaf.example".to_string(),
            sid: "0LF".to_string(),
        };
        assert_eq!(
            err.peer_message().as_deref(),
            Some("server leaf.example (0LF) already exists")
        );
    }

    #[test]
    fn transport_errors_are_silent() {
        assert!(LinkError::Closed.peer_message().is_none());
        assert_eq!(LinkError::Closed.error_code(), "closed");
    }
}
