//! # slirc-tree
//!
//! The spanning tree of linked IRC servers, as seen from one server.
//!
//! - [`Topology`] owns every [`ServerNode`] in an arena and is the only
//!   mutation surface: creation, burst completion, keepalive state and
//!   netsplit teardown all go through it.
//! - [`TopologyIndex`] answers "is server X known" by name or SID.
//! - Routes are resolved once, when a server is created: traffic for any
//!   server leaves through the direct neighbour returned by
//!   [`Topology::route_of`].
//!
//! Nothing here performs I/O. Users, bans, notices and events are reached
//! through the traits in [`hooks`].
//!
//! ```rust
//! use slirc_tree::{LinkId, LocalServer, ManualClock, NewServer, ServerId, Topology, TopologyOptions};
//!
//! let local = LocalServer {
//!     name: "hub.example".into(),
//!     sid: ServerId::new("0HB"),
//!     description: "Hub".into(),
//!     version: "slircd-tree".into(),
//! };
//! let mut topo = Topology::new(local, Box::new(ManualClock::new(0)), TopologyOptions::default());
//! let root = topo.root_id();
//! let leaf = topo
//!     .create_server(NewServer {
//!         name: "leaf.example".into(),
//!         sid: ServerId::new("0LF"),
//!         description: "Leaf".into(),
//!         parent: root,
//!         link: Some(LinkId(1)),
//!         hidden: false,
//!     })
//!     .unwrap();
//! assert_eq!(topo.route_of(leaf), Some(leaf));
//! ```

#![deny(clippy::all)]

pub mod burst;
pub mod clock;
pub mod error;
pub mod hooks;
pub mod id;
pub mod index;
mod keepalive;
pub mod node;
pub mod split;
pub mod topology;

pub use burst::{BURST_TIME_SECS_THRESHOLD_MS, BurstReport, format_burst_time};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TopologyError;
pub use hooks::{
    BanRules, BurstHooks, NoticeClass, NoticeSink, QuitReason, TopologyEvents, UserEntry,
    UserRegistry,
};
pub use id::{LinkId, NodeId, ServerId};
pub use index::TopologyIndex;
pub use node::{LocalServer, NewServer, ServerNode, ServerUser};
pub use split::{HIDDEN_SPLIT_REASON, SplitPolicy, quit_server_users, split_reason};
pub use topology::{DEFAULT_PING_FREQ, RemovedServer, Topology, TopologyOptions};
