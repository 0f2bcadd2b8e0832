//! Netsplit teardown.
//!
//! Two independent primitives: [`Topology::tidy`] evicts topology state,
//! [`quit_server_users`] evicts session state. The link-loss handler
//! normally calls both; neither implies the other.

use crate::hooks::{QuitReason, UserRegistry};
use crate::id::NodeId;
use crate::topology::{RemovedServer, Topology};
use tracing::debug;

/// Quit reason shown to users when split details are hidden.
pub const HIDDEN_SPLIT_REASON: &str = "*.net *.split";

/// Network-wide knobs that shape netsplit quits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitPolicy {
    /// Suppress QUIT broadcasts for split users.
    pub quiet_bursts: bool,
    /// Replace the real reason with [`HIDDEN_SPLIT_REASON`] for non-opers.
    pub hide_splits: bool,
}

/// The conventional netsplit quit reason: the two servers either side of
/// the broken link.
pub fn split_reason(local_name: &str, remote_name: &str) -> String {
    format!("{local_name} {remote_name}")
}

/// Disconnect every remote user attached to `server_name`.
///
/// Matching is by server name over the whole registry, not by tree walk.
/// Local users are left alone; their socket owner notices the loss itself.
/// Returns the number of users actually disconnected.
pub fn quit_server_users(
    server_name: &str,
    reason: &str,
    users: &mut dyn UserRegistry,
    policy: SplitPolicy,
) -> usize {
    let doomed: Vec<_> = users
        .users()
        .into_iter()
        .filter(|u| u.server.eq_ignore_ascii_case(server_name) && !u.local)
        .collect();

    let mut removed = 0;
    for user in doomed {
        let quit = if policy.hide_splits {
            QuitReason::new(HIDDEN_SPLIT_REASON).with_oper(reason)
        } else {
            QuitReason::new(reason)
        };
        if users.quit_user(&user.uid, quit, policy.quiet_bursts) {
            removed += 1;
        }
    }
    removed
}

impl Topology {
    /// Destroy `id` and its whole subtree, children before parents.
    ///
    /// The root itself is never destroyed; tidying it removes everything
    /// else. Returns the removed servers in destruction order. Calling this
    /// again with the same id is a no-op.
    pub fn tidy(&mut self, id: NodeId) -> Vec<RemovedServer> {
        let mut removed = Vec::new();
        if !self.contains(id) {
            return removed;
        }

        let root = self.root_id();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if !expanded {
                stack.push((current, true));
                stack.extend(
                    self.children_of(current)
                        .iter()
                        .rev()
                        .map(|child| (*child, false)),
                );
                continue;
            }
            if current == root {
                continue;
            }
            if let Some(parent) = self.parent_of(current)
                && let Some(node) = self.get_mut(parent)
            {
                node.del_child(current);
            }
            if let Some(gone) = self.destroy(current) {
                debug!(sid = %gone.sid, name = %gone.name, "Server removed from tree");
                removed.push(gone);
            }
        }
        removed
    }

    /// [`quit_server_users`] for the server at `id`.
    pub fn quit_users(
        &self,
        id: NodeId,
        reason: &str,
        users: &mut dyn UserRegistry,
        policy: SplitPolicy,
    ) -> usize {
        match self.get(id) {
            Some(node) => quit_server_users(node.name(), reason, users, policy),
            None => 0,
        }
    }
}
