//! Sync Module - Server-to-Server Linking.
//!
//! This module maintains the spanning tree of linked servers.
//! It handles link handshakes, bursts, routing, keepalive and netsplits.

pub mod burst;
pub mod handshake;
pub mod keepalive;
pub mod link;
pub mod manager;
pub mod protocol;
mod split;


pub use link::LinkContext;
pub use manager::{MapEntry, SyncEvent, SyncHandle, SyncManager, SyncSettings};
