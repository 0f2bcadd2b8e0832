//! Netsplit handling.
//!
//! Removes a lost server and everything behind it: users first, then the
//! servers themselves. Telling the remaining links is up to the caller,
//! since a locally detected split and a relayed SQUIT propagate
//! differently.

use super::manager::SyncManager;
use crate::metrics;
use crate::state::TopologyEvent;
use slirc_tree::{NodeId, NoticeClass, NoticeSink, split_reason};
use tracing::{debug, info};

impl SyncManager {
    /// Tear down `node` and its subtree. Returns the number of servers
    /// removed; 0 if `node` was already gone.
    pub(super) fn netsplit(&mut self, node: NodeId, reason: &str) -> usize {
        let root = self.topology.root_id();
        let Some(lost) = self.topology.get(node) else {
            return 0;
        };
        let lost_name = lost.name().to_string();
        let parent = lost.parent();
        let direct = parent == Some(root);
        let parent_name = parent
            .and_then(|p| self.topology.get(p))
            .map(|p| p.name().to_string())
            .unwrap_or_default();
        let quit_reason = split_reason(&parent_name, &lost_name);

        let mut users_lost = 0;
        for id in self.topology.subtree(node) {
            users_lost +=
                self.topology
                    .quit_users(id, &quit_reason, &mut self.users, self.settings.policy);
        }

        let removed = self.topology.tidy(node);
        for server in &removed {
            debug!(
                uid = %server.server_user.uid,
                nick = %server.server_user.nick,
                users = server.user_count,
                "Released server user"
            );
            self.events.publish(TopologyEvent::ServerSplit {
                name: server.name.clone(),
                sid: server.sid.to_string(),
            });
        }

        info!(
            server = %lost_name,
            reason,
            servers = removed.len(),
            users = users_lost,
            "Netsplit"
        );
        let class = if direct {
            NoticeClass::LinkLocal
        } else {
            NoticeClass::LinkRemote
        };
        self.notices.notice(
            class,
            &format!(
                "Netsplit complete, lost \x02{}\x02 user(s) on \x02{}\x02 server(s).",
                users_lost,
                removed.len()
            ),
        );

        metrics::record_netsplit(removed.len());
        self.update_gauges();
        removed.len()
    }
}
