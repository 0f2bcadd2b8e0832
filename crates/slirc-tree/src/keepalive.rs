//! Per-server keepalive state.
//!
//! Only the state lives here. Deciding when to ping and when a link is
//! dead belongs to the daemon's timer loop.

use crate::id::NodeId;
use crate::topology::Topology;

impl Topology {
    /// Schedule the next ping at `t` (unix seconds). Clears the answered flag.
    pub fn set_next_ping_time(&mut self, id: NodeId, t: i64) {
        if let Some(node) = self.get_mut(id) {
            node.set_next_ping_time(t);
        }
    }

    /// Mark the most recent ping as answered.
    pub fn set_ping_flag(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.set_ping_flag();
        }
    }

    pub fn answered_last_ping(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.answered_last_ping())
    }

    pub fn next_ping_time(&self, id: NodeId) -> Option<i64> {
        self.get(id).map(|n| n.next_ping_time())
    }

    /// Remember when a ping left, for the round-trip estimate.
    pub fn mark_ping_sent(&mut self, id: NodeId, now_ms: i64) {
        if let Some(node) = self.get_mut(id) {
            node.ping_sent_ms = now_ms;
        }
    }

    /// A pong arrived: set the answered flag and update the round-trip
    /// estimate. Returns the new estimate if a ping was outstanding.
    pub fn record_pong(&mut self, id: NodeId) -> Option<i64> {
        let now_ms = self.clock.now_millis();
        let node = self.get_mut(id)?;
        node.set_ping_flag();
        if node.ping_sent_ms == 0 {
            return None;
        }
        node.rtt_ms = (now_ms - node.ping_sent_ms).max(0);
        Some(node.rtt_ms)
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::{Clock, ManualClock};
    use crate::id::{LinkId, NodeId, ServerId};
    use crate::node::{LocalServer, NewServer};
    use crate::topology::{Topology, TopologyOptions};

    fn setup() -> (Topology, ManualClock, NodeId) {
        let clock = ManualClock::new(100_000);
        let mut topo = Topology::new(
            LocalServer {
                name: "hub.example".to_string(),
                sid: ServerId::new("0HB"),
                description: String::new(),
                version: String::new(),
            },
            Box::new(clock.clone()),
            TopologyOptions::default(),
        );
        let root = topo.root_id();
        let b = topo
            .create_server(NewServer {
                name: "b.example".to_string(),
                sid: ServerId::new("00B"),
                description: String::new(),
                parent: root,
                link: Some(LinkId(1)),
                hidden: false,
            })
            .unwrap();
        (topo, clock, b)
    }

    #[test]
    fn scheduling_clears_answered() {
        let (mut topo, _clock, b) = setup();
        assert!(topo.answered_last_ping(b));

        topo.set_next_ping_time(b, 500);
        assert!(!topo.answered_last_ping(b));
        assert_eq!(topo.next_ping_time(b), Some(500));

        topo.set_ping_flag(b);
        assert!(topo.answered_last_ping(b));
        assert!(topo.answered_last_ping(b));

        topo.set_next_ping_time(b, 560);
        assert!(!topo.answered_last_ping(b));
    }

    #[test]
    fn pong_updates_round_trip() {
        let (mut topo, clock, b) = setup();
        assert_eq!(topo.record_pong(b), None);

        topo.set_next_ping_time(b, 160);
        topo.mark_ping_sent(b, clock.now_millis());
        clock.advance(42);

        assert_eq!(topo.record_pong(b), Some(42));
        assert!(topo.answered_last_ping(b));
        assert_eq!(topo.get(b).unwrap().rtt_ms(), 42);
    }

    #[test]
    fn unknown_node_reads_as_unanswered() {
        let (mut topo, _clock, b) = setup();
        topo.tidy(b);
        assert!(!topo.answered_last_ping(b));
        assert_eq!(topo.next_ping_time(b), None);
    }
}
