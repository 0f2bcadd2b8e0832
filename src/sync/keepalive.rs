//! Keepalive decisions for direct links.
//!
//! [`check`] only reads the tree and says what should happen; the sync
//! manager carries it out. A ping is due when `now` reaches the node's
//! next ping time. If the previous ping was never answered by then, the
//! link has timed out instead.

use super::manager::{SyncEvent, SyncHandle};
use slirc_tree::{NodeId, Topology};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    SendPing(NodeId),
    /// No answer for `ping_warn_time` seconds.
    Warn(NodeId),
    Timeout(NodeId),
}

pub fn check(topology: &Topology, now: i64, ping_freq: i64, ping_warn_time: i64) -> Vec<KeepaliveAction> {
    let mut actions = Vec::new();
    for id in topology.direct_links() {
        let Some(node) = topology.get(id) else {
            continue;
        };
        if node.link().is_none() {
            continue;
        }
        let next = node.next_ping_time();
        if now >= next {
            if node.answered_last_ping() {
                actions.push(KeepaliveAction::SendPing(id));
            } else {
                actions.push(KeepaliveAction::Timeout(id));
            }
        } else if ping_warn_time > 0
            && !node.warned()
            && !node.answered_last_ping()
            && now >= next - (ping_freq - ping_warn_time)
        {
            actions.push(KeepaliveAction::Warn(id));
        }
    }
    actions
}

/// Send a [`SyncEvent::Tick`] every `period` until the manager goes away.
pub async fn run_ticker(handle: SyncHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if handle.send(SyncEvent::Tick).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slirc_tree::{LinkId, LocalServer, ManualClock, NewServer, ServerId, TopologyOptions};

    // Clock starts at t=1000s; first ping is due at 1060.
    fn setup() -> (Topology, NodeId) {
        let mut topo = Topology::new(
            LocalServer {
                name: "hub.example".to_string(),
                sid: ServerId::new("0HB"),
                description: String::new(),
                version: String::new(),
            },
            Box::new(ManualClock::new(1_000_000)),
            TopologyOptions { ping_freq: 60 },
        );
        let root = topo.root_id();
        let leaf = topo
            .create_server(NewServer {
                name: "leaf.example".to_string(),
                sid: ServerId::new("0LF"),
                description: String::new(),
                parent: root,
                link: Some(LinkId(1)),
                hidden: false,
            })
            .unwrap();
        (topo, leaf)
    }

    #[test]
    fn nothing_before_first_deadline() {
        let (topo, _) = setup();
        assert!(check(&topo, 1059, 60, 15).is_empty());
    }

    #[test]
    fn ping_then_warn_then_timeout() {
        let (mut topo, leaf) = setup();
        assert_eq!(check(&topo, 1060, 60, 15), [KeepaliveAction::SendPing(leaf)]);

        // Ping sent at 1060, next deadline 1120.
        topo.set_next_ping_time(leaf, 1120);
        assert!(check(&topo, 1074, 60, 15).is_empty());
        assert_eq!(check(&topo, 1075, 60, 15), [KeepaliveAction::Warn(leaf)]);

        topo.set_warned(leaf, true);
        assert!(check(&topo, 1100, 60, 15).is_empty());
        assert_eq!(check(&topo, 1120, 60, 15), [KeepaliveAction::Timeout(leaf)]);
    }

    #[test]
    fn answered_ping_reschedules() {
        let (mut topo, leaf) = setup();
        topo.set_next_ping_time(leaf, 1120);
        topo.set_ping_flag(leaf);
        assert!(check(&topo, 1100, 60, 15).is_empty());
        assert_eq!(check(&topo, 1120, 60, 15), [KeepaliveAction::SendPing(leaf)]);
    }

    #[test]
    fn warning_can_be_disabled() {
        let (mut topo, leaf) = setup();
        topo.set_next_ping_time(leaf, 1120);
        assert!(check(&topo, 1119, 60, 0).is_empty());
    }
}
