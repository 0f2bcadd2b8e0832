//! Burst lifecycle: moving a linked subtree from bursting to stable.

use crate::hooks::{BurstHooks, NoticeClass};
use crate::id::NodeId;
use crate::topology::Topology;
use tracing::debug;

/// Burst times above this are reported in seconds.
pub const BURST_TIME_SECS_THRESHOLD_MS: i64 = 10_000;

/// Outcome of a completed burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstReport {
    pub name: String,
    pub duration_ms: i64,
    /// The server is one of our direct links.
    pub direct: bool,
}

/// Render a burst duration the way operators see it.
pub fn format_burst_time(duration_ms: i64) -> String {
    if duration_ms > BURST_TIME_SECS_THRESHOLD_MS {
        format!("{:.1} secs", duration_ms as f64 / 1000.0)
    } else {
        format!("{duration_ms} msecs")
    }
}

impl Topology {
    /// Mark `id` and everything below it as finished bursting.
    ///
    /// Descendants are finished unconditionally: the neighbour that sent the
    /// end of burst vouches for its whole subtree. Ban application, the
    /// operator notice and the stable event happen for `id` on every call,
    /// including a late end of burst from a server an ancestor already
    /// finished. The burst time is always measured from `id`'s own link.
    ///
    /// Returns `None` only for an unknown or stale id.
    pub fn finish_burst(&mut self, id: NodeId, hooks: &mut BurstHooks<'_>) -> Option<BurstReport> {
        let was_bursting = self.get(id)?.is_bursting();
        self.finish_burst_internal(id);
        if !was_bursting {
            debug!(node = ?id, "End of burst for a server already finished by its uplink");
        }

        hooks.bans.apply_pending();

        let now_ms = self.clock.now_millis();
        let node = self.get(id)?;
        let duration_ms = (now_ms - node.burst_started_ms()).max(0);
        let direct = node.parent() == Some(self.root_id());
        let burst_time = format_burst_time(duration_ms);

        let (class, text) = if direct {
            (
                NoticeClass::LinkLocal,
                format!(
                    "Received end of netburst from \x02{}\x02 (burst time: {})",
                    node.name(),
                    burst_time
                ),
            )
        } else {
            let via = node
                .route()
                .and_then(|r| self.get(r))
                .map(|r| r.name())
                .unwrap_or("*");
            (
                NoticeClass::LinkRemote,
                format!(
                    "Received end of netburst from \x02{}\x02 behind \x02{}\x02 (burst time: {})",
                    node.name(),
                    via,
                    burst_time
                ),
            )
        };
        hooks.notices.notice(class, &text);
        hooks.events.server_stable(node.name());

        Some(BurstReport {
            name: node.name().to_string(),
            duration_ms,
            direct,
        })
    }

    fn finish_burst_internal(&mut self, id: NodeId) {
        let next_ping = self.clock.now_secs() + self.options.ping_freq;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get_mut(current) else {
                continue;
            };
            node.bursting = false;
            node.set_next_ping_time(next_ping);
            node.set_ping_flag();
            stack.extend(node.children.iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hooks::{BanRules, NoticeSink, TopologyEvents};
    use crate::id::{LinkId, ServerId};
    use crate::node::{LocalServer, NewServer};
    use crate::topology::TopologyOptions;

    #[derive(Default)]
    struct Recorder {
        applied: usize,
        notices: Vec<(NoticeClass, String)>,
        stable: Vec<String>,
    }

    impl BanRules for Recorder {
        fn apply_pending(&mut self) -> usize {
            self.applied += 1;
            0
        }
    }

    impl NoticeSink for Recorder {
        fn notice(&mut self, class: NoticeClass, text: &str) {
            self.notices.push((class, text.to_string()));
        }
    }

    impl TopologyEvents for Recorder {
        fn server_stable(&mut self, name: &str) {
            self.stable.push(name.to_string());
        }
    }

    struct Sinks {
        bans: Recorder,
        notices: Recorder,
        events: Recorder,
    }

    impl Sinks {
        fn new() -> Self {
            Self {
                bans: Recorder::default(),
                notices: Recorder::default(),
                events: Recorder::default(),
            }
        }

        fn hooks(&mut self) -> BurstHooks<'_> {
            BurstHooks {
                bans: &mut self.bans,
                notices: &mut self.notices,
                events: &mut self.events,
            }
        }
    }

    fn setup() -> (Topology, ManualClock, NodeId, NodeId) {
        let clock = ManualClock::new(5_000_000);
        let mut topo = Topology::new(
            LocalServer {
                name: "hub.example".to_string(),
                sid: ServerId::new("0HB"),
                description: "Hub".to_string(),
                version: "test".to_string(),
            },
            Box::new(clock.clone()),
            TopologyOptions { ping_freq: 30 },
        );
        let root = topo.root_id();
        let b = topo
            .create_server(NewServer {
                name: "b.example".to_string(),
                sid: ServerId::new("00B"),
                description: String::new(),
                parent: root,
                link: Some(LinkId(7)),
                hidden: false,
            })
            .unwrap();
        let d = topo
            .create_server(NewServer {
                name: "d.example".to_string(),
                sid: ServerId::new("00D"),
                description: String::new(),
                parent: b,
                link: Some(LinkId(7)),
                hidden: false,
            })
            .unwrap();
        (topo, clock, b, d)
    }

    #[test]
    fn finishing_a_neighbour_finishes_its_subtree() {
        let (mut topo, clock, b, d) = setup();
        clock.advance(250);
        let mut sinks = Sinks::new();

        let report = topo.finish_burst(b, &mut sinks.hooks()).unwrap();

        assert!(!topo.get(b).unwrap().is_bursting());
        assert!(!topo.get(d).unwrap().is_bursting());
        assert_eq!(
            report,
            BurstReport {
                name: "b.example".to_string(),
                duration_ms: 250,
                direct: true,
            }
        );
        assert_eq!(sinks.bans.applied, 1);
        assert_eq!(sinks.notices.notices.len(), 1);
        assert_eq!(sinks.notices.notices[0].0, NoticeClass::LinkLocal);
        assert_eq!(
            sinks.notices.notices[0].1,
            "Received end of netburst from \x02b.example\x02 (burst time: 250 msecs)"
        );
        assert_eq!(sinks.events.stable, vec!["b.example".to_string()]);
    }

    #[test]
    fn late_signal_from_descendant_repeats_side_effects() {
        let (mut topo, clock, b, d) = setup();
        let mut sinks = Sinks::new();
        topo.finish_burst(b, &mut sinks.hooks()).unwrap();
        assert!(!topo.get(d).unwrap().is_bursting());

        clock.advance(500);
        topo.set_next_ping_time(d, 0);
        let report = topo.finish_burst(d, &mut sinks.hooks()).unwrap();

        assert_eq!(
            report,
            BurstReport {
                name: "d.example".to_string(),
                duration_ms: 500,
                direct: false,
            }
        );
        assert_eq!(sinks.bans.applied, 2);
        assert_eq!(sinks.notices.notices.len(), 2);
        assert_eq!(sinks.notices.notices[1].0, NoticeClass::LinkRemote);
        assert_eq!(
            sinks.notices.notices[1].1,
            "Received end of netburst from \x02d.example\x02 behind \x02b.example\x02 (burst time: 500 msecs)"
        );
        assert_eq!(
            sinks.events.stable,
            vec!["b.example".to_string(), "d.example".to_string()]
        );

        let node = topo.get(d).unwrap();
        assert_eq!(node.next_ping_time(), 5_000 + 30);
        assert!(node.answered_last_ping());
    }

    #[test]
    fn remote_burst_is_reported_behind_its_route() {
        let (mut topo, clock, _b, d) = setup();
        clock.advance(12_345);
        let mut sinks = Sinks::new();

        let report = topo.finish_burst(d, &mut sinks.hooks()).unwrap();

        assert!(!report.direct);
        assert_eq!(sinks.notices.notices[0].0, NoticeClass::LinkRemote);
        assert_eq!(
            sinks.notices.notices[0].1,
            "Received end of netburst from \x02d.example\x02 behind \x02b.example\x02 (burst time: 12.3 secs)"
        );
    }

    #[test]
    fn unknown_node_is_ignored() {
        let (mut topo, _clock, b, _d) = setup();
        topo.tidy(b);
        let mut sinks = Sinks::new();
        assert!(topo.finish_burst(b, &mut sinks.hooks()).is_none());
        assert!(sinks.notices.notices.is_empty());
    }

    #[test]
    fn burst_time_units_switch_above_ten_seconds() {
        assert_eq!(format_burst_time(0), "0 msecs");
        assert_eq!(format_burst_time(10_000), "10000 msecs");
        assert_eq!(format_burst_time(10_001), "10.0 secs");
        assert_eq!(format_burst_time(65_460), "65.5 secs");
    }
}
