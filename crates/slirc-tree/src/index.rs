//! Name and SID lookup tables for the tree.

use crate::id::{NodeId, ServerId};
use std::collections::HashMap;

/// Two exact-match maps over the live server set.
///
/// Server names are compared ASCII case-insensitively, SIDs exactly. The
/// tree arena owns the nodes; the index only holds handles.
#[derive(Debug, Default)]
pub struct TopologyIndex {
    by_name: HashMap<String, NodeId>,
    by_sid: HashMap<ServerId, NodeId>,
}

fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl TopologyIndex {
    pub(crate) fn insert(&mut self, name: &str, sid: &ServerId, id: NodeId) {
        self.by_name.insert(name_key(name), id);
        self.by_sid.insert(sid.clone(), id);
    }

    /// Erase both entries, but only while they still point at `id`.
    pub(crate) fn remove(&mut self, name: &str, sid: &ServerId, id: NodeId) {
        let key = name_key(name);
        if self.by_name.get(&key) == Some(&id) {
            self.by_name.remove(&key);
        }
        if self.by_sid.get(sid.as_str()) == Some(&id) {
            self.by_sid.remove(sid.as_str());
        }
    }

    pub fn by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(&name_key(name)).copied()
    }

    pub fn by_sid(&self, sid: &str) -> Option<NodeId> {
        self.by_sid.get(sid).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(&name_key(name))
    }

    pub fn contains_sid(&self, sid: &str) -> bool {
        self.by_sid.contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.by_sid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sid.is_empty()
    }
}
