//! # slirc-proto
//!
//! The wire layer shared by the link daemon: raw IRC lines and the
//! RFC 1459 case mapping used for nicknames.
//!
//! ```rust
//! use slirc_proto::{Line, irc_eq};
//!
//! let line: Line = ":0HB SQUIT 0LF :Ping timeout".parse().unwrap();
//! assert_eq!(line.command, "SQUIT");
//! assert_eq!(line.to_string(), ":0HB SQUIT 0LF :Ping timeout");
//! assert!(irc_eq("Nick[Away]", "nick{away}"));
//! ```

pub mod casemap;
pub mod error;
pub mod line;

pub use casemap::{irc_eq, irc_lower_char, irc_to_lower};
pub use error::ProtocolError;
pub use line::Line;
