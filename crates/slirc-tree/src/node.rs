//! Server nodes: one vertex of the spanning tree.

use crate::id::{LinkId, NodeId, ServerId};

/// The synthetic user that stands in for a server as the source of
/// server-originated events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUser {
    pub uid: String,
    pub nick: String,
}

/// Identity of the local server, used to build the root node.
#[derive(Debug, Clone)]
pub struct LocalServer {
    pub name: String,
    pub sid: ServerId,
    pub description: String,
    pub version: String,
}

/// Parameters for a server introduced by a link or a burst.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub name: String,
    pub sid: ServerId,
    pub description: String,
    pub parent: NodeId,
    /// The direct link this server is reached through.
    pub link: Option<LinkId>,
    /// Hidden from /MAP and /LINKS.
    pub hidden: bool,
}

/// A server in the network, local or remote.
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub(crate) name: String,
    pub(crate) sid: ServerId,
    pub(crate) description: String,
    pub(crate) version: String,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) route: Option<NodeId>,

    pub(crate) server_user: ServerUser,
    pub(crate) user_count: u32,
    pub(crate) oper_count: u32,
    pub(crate) created_at: i64,
    pub(crate) rtt_ms: i64,

    pub(crate) link: Option<LinkId>,
    pub(crate) hidden: bool,

    pub(crate) bursting: bool,
    pub(crate) burst_started_ms: i64,
    pub(crate) warned: bool,

    pub(crate) next_ping: i64,
    pub(crate) last_ping_answered: bool,
    pub(crate) ping_sent_ms: i64,
}

impl ServerNode {
    /// The local server. It has no parent, no route and no link, and it
    /// never bursts.
    pub(crate) fn root(local: LocalServer, now_ms: i64) -> Self {
        let server_user = ServerUser {
            uid: local.sid.as_str().to_string(),
            nick: local.name.clone(),
        };
        Self {
            name: local.name,
            sid: local.sid,
            description: local.description,
            version: local.version,
            parent: None,
            children: Vec::new(),
            route: None,
            server_user,
            user_count: 0,
            oper_count: 0,
            created_at: now_ms.div_euclid(1000),
            rtt_ms: 0,
            link: None,
            hidden: false,
            bursting: false,
            burst_started_ms: 0,
            warned: false,
            next_ping: 0,
            last_ping_answered: true,
            ping_sent_ms: 0,
        }
    }

    /// A freshly linked or introduced server. Starts bursting with its first
    /// ping due one interval from now.
    pub(crate) fn child(new: NewServer, route: NodeId, now_ms: i64, ping_freq: i64) -> Self {
        let now = now_ms.div_euclid(1000);
        let server_user = ServerUser {
            uid: new.sid.as_str().to_string(),
            nick: new.name.clone(),
        };
        let mut node = Self {
            name: new.name,
            sid: new.sid,
            description: new.description,
            version: String::new(),
            parent: Some(new.parent),
            children: Vec::new(),
            route: Some(route),
            server_user,
            user_count: 0,
            oper_count: 0,
            created_at: now,
            rtt_ms: 0,
            link: new.link,
            hidden: new.hidden,
            bursting: true,
            burst_started_ms: now_ms,
            warned: false,
            next_ping: 0,
            last_ping_answered: false,
            ping_sent_ms: 0,
        };
        node.set_next_ping_time(now + ping_freq);
        node.set_ping_flag();
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sid(&self) -> &ServerId {
        &self.sid
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The direct link through which this server is reached. `None` only
    /// for the root; a direct neighbour routes through itself.
    pub fn route(&self) -> Option<NodeId> {
        self.route
    }

    pub fn server_user(&self) -> &ServerUser {
        &self.server_user
    }

    pub fn user_count(&self) -> u32 {
        self.user_count
    }

    pub fn oper_count(&self) -> u32 {
        self.oper_count
    }

    /// Unix seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn rtt_ms(&self) -> i64 {
        self.rtt_ms
    }

    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_bursting(&self) -> bool {
        self.bursting
    }

    pub fn burst_started_ms(&self) -> i64 {
        self.burst_started_ms
    }

    pub fn warned(&self) -> bool {
        self.warned
    }

    pub fn next_ping_time(&self) -> i64 {
        self.next_ping
    }

    pub fn answered_last_ping(&self) -> bool {
        self.last_ping_answered
    }

    pub fn ping_sent_ms(&self) -> i64 {
        self.ping_sent_ms
    }

    pub(crate) fn set_next_ping_time(&mut self, t: i64) {
        self.next_ping = t;
        self.last_ping_answered = false;
    }

    pub(crate) fn set_ping_flag(&mut self) {
        self.last_ping_answered = true;
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn del_child(&mut self, child: NodeId) -> bool {
        match self.children.iter().position(|c| *c == child) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }
}
