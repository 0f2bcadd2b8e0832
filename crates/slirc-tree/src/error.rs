//! Topology errors.

use thiserror::Error;

/// Rejections from [`Topology::create_server`](crate::Topology::create_server).
///
/// None of these leave partial state behind: the check happens before the
/// arena or the index is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("server name already in use: {0}")]
    DuplicateName(String),

    #[error("server id already in use: {0}")]
    DuplicateSid(String),

    #[error("parent server is not in the tree")]
    UnknownParent,
}
