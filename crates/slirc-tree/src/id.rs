//! Identifiers used by the server tree.

use std::borrow::Borrow;
use std::fmt;

/// A unique identifier for a server in the network.
///
/// Uses the server's SID (3 characters) for compact representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(String);

impl ServerId {
    /// Create a new server ID from a SID string.
    pub fn new(sid: impl Into<String>) -> Self {
        Self(sid.into())
    }

    /// Get the inner SID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(sid: &str) -> Self {
        Self::new(sid)
    }
}

impl Borrow<str> for ServerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Handle to a server node inside a [`Topology`](crate::Topology).
///
/// Generational: once a node is destroyed its handle never resolves again,
/// even if the arena slot is reused for a later server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

/// Opaque handle for the transport session of a direct link.
///
/// Every node reached through a link carries that link's id; the local
/// root carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}
