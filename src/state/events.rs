//! Topology event fan-out.
//!
//! Anything outside the sync actor that cares about servers coming and
//! going subscribes here. Publishing never blocks; slow subscribers lag
//! and lose the oldest events.

use slirc_tree::TopologyEvents;
use tokio::sync::broadcast;

/// Something changed in the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// A direct peer completed its handshake.
    ServerLinked { name: String, sid: String },
    /// A server (and everything it burst) finished bursting.
    ServerStable { name: String },
    /// A server left the tree.
    ServerSplit { name: String, sid: String },
    /// A remote user was disconnected by a netsplit.
    UserQuit {
        uid: String,
        nick: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TopologyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: TopologyEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl TopologyEvents for EventBus {
    fn server_stable(&mut self, name: &str) {
        self.publish(TopologyEvent::ServerStable {
            name: name.to_string(),
        });
    }
}
