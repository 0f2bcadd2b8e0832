//! The server tree.
//!
//! Nodes live in an arena addressed by generational [`NodeId`]s; parent,
//! child and route links are stored as ids. [`Topology`] is the only thing
//! that mutates the arena or the [`TopologyIndex`].

use crate::clock::Clock;
use crate::error::TopologyError;
use crate::id::{LinkId, NodeId, ServerId};
use crate::index::TopologyIndex;
use crate::node::{LocalServer, NewServer, ServerNode, ServerUser};
use tracing::debug;

/// Default seconds between keepalive pings on a link.
pub const DEFAULT_PING_FREQ: i64 = 60;

/// Tunables for the tree.
#[derive(Debug, Clone, Copy)]
pub struct TopologyOptions {
    /// Seconds between keepalive pings.
    pub ping_freq: i64,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            ping_freq: DEFAULT_PING_FREQ,
        }
    }
}

/// A server that was removed from the tree.
#[derive(Debug, Clone)]
pub struct RemovedServer {
    pub id: NodeId,
    pub name: String,
    pub sid: ServerId,
    pub link: Option<LinkId>,
    pub user_count: u32,
    /// The server's synthetic user. It no longer resolves through the
    /// tree once the server is gone.
    pub server_user: ServerUser,
}

struct Slot {
    generation: u32,
    node: Option<ServerNode>,
}

/// The spanning tree of servers as seen from the local server.
pub struct Topology {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: TopologyIndex,
    root: NodeId,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) options: TopologyOptions,
}

impl Topology {
    /// Create a tree containing only the local server.
    pub fn new(local: LocalServer, clock: Box<dyn Clock>, options: TopologyOptions) -> Self {
        let root_node = ServerNode::root(local, clock.now_millis());
        let root = NodeId::new(0, 0);
        let mut index = TopologyIndex::default();
        index.insert(&root_node.name, &root_node.sid, root);

        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            index,
            root,
            clock,
            options,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// The local server. Always present; `tidy` and `destroy` never
    /// remove it.
    pub fn root(&self) -> Option<&ServerNode> {
        self.get(self.root)
    }

    pub fn options(&self) -> TopologyOptions {
        self.options
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn now_secs(&self) -> i64 {
        self.clock.now_secs()
    }

    pub fn index(&self) -> &TopologyIndex {
        &self.index
    }

    pub fn get(&self, id: NodeId) -> Option<&ServerNode> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ServerNode> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.index.by_name(name)
    }

    pub fn find_by_sid(&self, sid: &str) -> Option<NodeId> {
        self.index.by_sid(sid)
    }

    /// Number of live servers, the root included.
    pub fn server_count(&self) -> usize {
        self.index.len()
    }

    /// Every live server in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ServerNode)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.node
                .as_ref()
                .map(|node| (NodeId::new(i, slot.generation), node))
        })
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(ServerNode::parent)
    }

    pub fn route_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(ServerNode::route)
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(ServerNode::children).unwrap_or(&[])
    }

    /// Servers directly linked to us.
    pub fn direct_links(&self) -> Vec<NodeId> {
        self.children_of(self.root).to_vec()
    }

    /// Hop count from the local server.
    pub fn hops(&self, id: NodeId) -> u32 {
        let mut hops = 0;
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            hops += 1;
            current = parent;
        }
        hops
    }

    /// `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children_of(current).iter().rev().copied());
        }
        out
    }

    /// Add a server below `new.parent`.
    ///
    /// Name and SID must both be unused; nothing is mutated on rejection.
    pub fn create_server(&mut self, new: NewServer) -> Result<NodeId, TopologyError> {
        if !self.contains(new.parent) {
            return Err(TopologyError::UnknownParent);
        }
        if self.index.contains_name(&new.name) {
            return Err(TopologyError::DuplicateName(new.name));
        }
        if self.index.contains_sid(new.sid.as_str()) {
            return Err(TopologyError::DuplicateSid(new.sid.to_string()));
        }

        let parent = new.parent;
        let upstream = self.resolve_route(parent);
        let id = self.allocate();
        let route = upstream.unwrap_or(id);

        let now_ms = self.clock.now_millis();
        let node = ServerNode::child(new, route, now_ms, self.options.ping_freq);
        debug!(sid = %node.sid, started_ms = now_ms, "Server started bursting");

        self.index.insert(&node.name, &node.sid, id);
        self.slots[id.index()].node = Some(node);
        if let Some(p) = self.get_mut(parent) {
            p.add_child(id);
        }
        Ok(id)
    }

    /// Find the direct neighbour a new child of `parent` is reached
    /// through. `None` means the child will itself be a direct neighbour.
    fn resolve_route(&self, parent: NodeId) -> Option<NodeId> {
        if parent == self.root {
            return None;
        }
        let mut hop = parent;
        while let Some(up) = self.parent_of(hop) {
            if up == self.root {
                break;
            }
            hop = up;
        }
        debug_assert_eq!(Some(hop), self.route_of(parent));
        Some(hop)
    }

    fn allocate(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            NodeId::new(index, self.slots[index].generation)
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: None,
            });
            NodeId::new(self.slots.len() - 1, 0)
        }
    }

    /// Drop a node from the arena and the index. Does not touch the parent's
    /// child list or the node's children.
    pub(crate) fn destroy(&mut self, id: NodeId) -> Option<RemovedServer> {
        if id == self.root {
            return None;
        }
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.index.remove(&node.name, &node.sid, id);

        Some(RemovedServer {
            id,
            name: node.name,
            sid: node.sid,
            link: node.link,
            user_count: node.user_count,
            server_user: node.server_user,
        })
    }

    pub fn set_version(&mut self, id: NodeId, version: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                node.version = version.into();
                true
            }
            None => false,
        }
    }

    pub fn set_user_count(&mut self, id: NodeId, count: u32) {
        if let Some(node) = self.get_mut(id) {
            node.user_count = count;
        }
    }

    pub fn adjust_user_count(&mut self, id: NodeId, delta: i32) {
        if let Some(node) = self.get_mut(id) {
            node.user_count = node.user_count.saturating_add_signed(delta);
        }
    }

    pub fn set_oper_count(&mut self, id: NodeId, count: u32) {
        if let Some(node) = self.get_mut(id) {
            node.oper_count = count;
        }
    }

    pub fn adjust_oper_count(&mut self, id: NodeId, delta: i32) {
        if let Some(node) = self.get_mut(id) {
            node.oper_count = node.oper_count.saturating_add_signed(delta);
        }
    }

    pub fn set_rtt(&mut self, id: NodeId, rtt_ms: i64) {
        if let Some(node) = self.get_mut(id) {
            node.rtt_ms = rtt_ms;
        }
    }

    pub fn set_warned(&mut self, id: NodeId, warned: bool) {
        if let Some(node) = self.get_mut(id) {
            node.warned = warned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn topology() -> Topology {
        let local = LocalServer {
            name: "hub.example".to_string(),
            sid: ServerId::new("0HB"),
            description: "Hub".to_string(),
            version: "slircd-tree-test".to_string(),
        };
        Topology::new(
            local,
            Box::new(ManualClock::new(1_000_000)),
            TopologyOptions::default(),
        )
    }

    fn add(topo: &mut Topology, name: &str, sid: &str, parent: NodeId) -> NodeId {
        topo.create_server(NewServer {
            name: name.to_string(),
            sid: ServerId::new(sid),
            description: format!("{name} server"),
            parent,
            link: Some(LinkId(1)),
            hidden: false,
        })
        .expect("server should be created")
    }

    #[test]
    fn root_is_indexed_and_stable() {
        let topo = topology();
        let root = topo.root_id();
        assert_eq!(topo.find_by_name("HUB.example"), Some(root));
        assert_eq!(topo.find_by_sid("0HB"), Some(root));
        assert!(!topo.root().unwrap().is_bursting());
        assert_eq!(topo.root().unwrap().route(), None);
        assert_eq!(topo.root().unwrap().link(), None);
        assert_eq!(topo.server_count(), 1);
    }

    #[test]
    fn routes_resolve_to_direct_neighbour() {
        // hub -> B -> D -> G, hub -> B -> E, hub -> C
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        let c = add(&mut topo, "c.example", "00C", root);
        let d = add(&mut topo, "d.example", "00D", b);
        let e = add(&mut topo, "e.example", "00E", b);
        let g = add(&mut topo, "g.example", "00G", d);

        assert_eq!(topo.route_of(b), Some(b));
        assert_eq!(topo.route_of(c), Some(c));
        assert_eq!(topo.route_of(d), Some(b));
        assert_eq!(topo.route_of(e), Some(b));
        assert_eq!(topo.route_of(g), Some(b));
        assert_eq!(topo.hops(g), 3);
    }

    #[test]
    fn every_child_appears_once_under_its_parent() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        let d = add(&mut topo, "d.example", "00D", b);
        add(&mut topo, "e.example", "00E", d);

        for (id, node) in topo.iter() {
            match node.parent() {
                None => assert_eq!(id, root),
                Some(parent) => {
                    let hits = topo.children_of(parent).iter().filter(|c| **c == id).count();
                    assert_eq!(hits, 1, "{} listed {} times", node.name(), hits);
                }
            }
        }
    }

    #[test]
    fn duplicates_are_rejected_without_side_effects() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);

        let dup_name = topo.create_server(NewServer {
            name: "B.EXAMPLE".to_string(),
            sid: ServerId::new("00X"),
            description: String::new(),
            parent: root,
            link: None,
            hidden: false,
        });
        assert_eq!(
            dup_name,
            Err(TopologyError::DuplicateName("B.EXAMPLE".to_string()))
        );

        let dup_sid = topo.create_server(NewServer {
            name: "x.example".to_string(),
            sid: ServerId::new("00B"),
            description: String::new(),
            parent: root,
            link: None,
            hidden: false,
        });
        assert_eq!(dup_sid, Err(TopologyError::DuplicateSid("00B".to_string())));

        assert_eq!(topo.server_count(), 2);
        assert_eq!(topo.children_of(root), &[b]);
        assert!(topo.find_by_sid("00X").is_none());
    }

    #[test]
    fn new_server_starts_bursting_with_ping_scheduled() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        let node = topo.get(b).unwrap();

        assert!(node.is_bursting());
        assert_eq!(node.burst_started_ms(), 1_000_000);
        assert_eq!(node.next_ping_time(), 1_000 + DEFAULT_PING_FREQ);
        assert!(node.answered_last_ping());
        assert_eq!(node.server_user().uid, "00B");
        assert_eq!(node.link(), Some(LinkId(1)));
    }

    #[test]
    fn stale_ids_do_not_resolve_after_slot_reuse() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        topo.tidy(b);

        let c = add(&mut topo, "c.example", "00C", root);
        assert!(topo.get(b).is_none());
        assert_eq!(topo.get(c).map(ServerNode::name), Some("c.example"));
    }

    #[test]
    fn version_is_mutable() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        assert!(topo.set_version(b, "slircd-tree-1.0 b.example"));
        assert_eq!(topo.get(b).unwrap().version(), "slircd-tree-1.0 b.example");
    }

    #[test]
    fn counters_saturate() {
        let mut topo = topology();
        let root = topo.root_id();
        let b = add(&mut topo, "b.example", "00B", root);
        topo.adjust_user_count(b, 2);
        topo.adjust_user_count(b, -5);
        assert_eq!(topo.get(b).unwrap().user_count(), 0);
    }
}
