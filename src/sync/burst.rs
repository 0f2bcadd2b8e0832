//! Burst generation.
//!
//! A new peer is told about every server we know (parents before
//! children), our version strings, the active G-lines and every user, and
//! then gets our `EOB`. Nothing behind the peer itself is sent back to it.

use super::protocol::{Command, Line, ServerIntro, UserIntro};
use crate::state::{UserManager, XLineStore};
use slirc_tree::{NodeId, Topology};
use std::collections::HashSet;

/// Build the burst for the peer at `peer`. `now` is in unix seconds.
pub fn build(
    topology: &Topology,
    users: &UserManager,
    bans: &XLineStore,
    peer: NodeId,
    now: i64,
) -> Vec<Line> {
    let root = topology.root_id();
    let local_sid = topology
        .root()
        .map(|n| n.sid().to_string())
        .unwrap_or_default();
    let behind_peer: HashSet<NodeId> = topology.subtree(peer).into_iter().collect();
    let mut lines = Vec::new();

    for id in topology.subtree(root) {
        if behind_peer.contains(&id) {
            continue;
        }
        let Some(node) = topology.get(id) else {
            continue;
        };
        if let Some(parent) = node.parent().and_then(|p| topology.get(p)) {
            lines.push(
                Command::Sid(ServerIntro {
                    name: node.name().to_string(),
                    hops: topology.hops(id) + 1,
                    sid: node.sid().to_string(),
                    description: node.description().to_string(),
                    hidden: node.is_hidden(),
                })
                .into_line(Some(parent.sid().as_str())),
            );
        }
        if !node.version().is_empty() {
            lines.push(
                Command::Version {
                    text: node.version().to_string(),
                }
                .into_line(Some(node.sid().as_str())),
            );
        }
    }

    for line in bans.active().iter().filter(|l| !l.is_expired(now)) {
        lines.push(
            Command::Gline {
                mask: line.mask.clone(),
                duration: line.remaining(now),
                reason: line.reason.clone(),
            }
            .into_line(Some(&local_sid)),
        );
    }

    let mut known: Vec<_> = users
        .iter()
        .filter_map(|user| {
            let server = topology.find_by_name(&user.server)?;
            (!behind_peer.contains(&server)).then_some((server, user))
        })
        .collect();
    known.sort_by(|a, b| a.1.uid.cmp(&b.1.uid));
    for (server, user) in known {
        let Some(node) = topology.get(server) else {
            continue;
        };
        lines.push(
            Command::Uid(UserIntro {
                nick: user.nick.clone(),
                hops: topology.hops(server) + 1,
                ts: user.ts,
                user: user.user.clone(),
                host: user.host.clone(),
                uid: user.uid.clone(),
                modes: user.modes.clone(),
                realname: user.realname.clone(),
            })
            .into_line(Some(node.sid().as_str())),
        );
    }

    lines.push(Command::Eob.into_line(Some(&local_sid)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EventBus, User, XLine};
    use slirc_tree::{BanRules, LinkId, LocalServer, ManualClock, NewServer, ServerId, TopologyOptions};

    // hub -> {a -> d (hidden), new}
    fn topology() -> (Topology, NodeId) {
        let mut topo = Topology::new(
            LocalServer {
                name: "hub.example".to_string(),
                sid: ServerId::new("0HB"),
                description: "Hub".to_string(),
                version: "slircd-tree-0.1.0".to_string(),
            },
            Box::new(ManualClock::new(1_000_000)),
            TopologyOptions::default(),
        );
        let root = topo.root_id();
        let mut add = |name: &str, sid: &str, parent: NodeId, link: u64| {
            topo.create_server(NewServer {
                name: name.to_string(),
                sid: ServerId::new(sid),
                description: format!("{name} desc"),
                parent,
                link: Some(LinkId(link)),
                hidden: sid == "00D",
            })
            .unwrap()
        };
        let a = add("a.example", "00A", root, 1);
        add("d.example", "00D", a, 1);
        let peer = add("new.example", "0NW", root, 2);
        (topo, peer)
    }

    fn user(uid: &str, nick: &str, server: &str) -> User {
        User {
            uid: uid.to_string(),
            nick: nick.to_string(),
            user: "u".to_string(),
            host: "h.example".to_string(),
            realname: "Real".to_string(),
            modes: "+i".to_string(),
            ts: 100,
            server: server.to_string(),
            local: false,
        }
    }

    #[test]
    fn burst_order_and_split_horizon() {
        let (topo, peer) = topology();
        let mut users = UserManager::new(EventBus::new(4));
        users.add(user("00DAAAAAB", "dave", "d.example")).unwrap();
        users.add(user("00AAAAAAA", "amy", "a.example")).unwrap();
        users.add(user("0NWAAAAAA", "newbie", "new.example")).unwrap();

        let mut bans = XLineStore::new();
        bans.queue(XLine {
            mask: "*@bad.example".to_string(),
            reason: "no".to_string(),
            setter: "a.example".to_string(),
            set_at: 900,
            duration: 300,
        });
        bans.apply_pending();

        let lines: Vec<String> = build(&topo, &users, &bans, peer, 1000)
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            lines,
            [
                ":0HB VERSION slircd-tree-0.1.0",
                ":0HB SID a.example 2 00A :a.example desc",
                ":00A SID d.example 3 00D :(H) d.example desc",
                ":0HB GLINE *@bad.example 200 no",
                ":00A UID amy 2 100 u h.example 00AAAAAAA +i Real",
                ":00D UID dave 3 100 u h.example 00DAAAAAB +i Real",
                ":0HB EOB",
            ]
        );
    }
}
