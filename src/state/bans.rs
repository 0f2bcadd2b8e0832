//! Network-wide G-lines.
//!
//! G-lines learned while a server is bursting are held back and only
//! activated when the burst ends, so a half-received ban list never
//! takes effect.

use slirc_tree::BanRules;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XLine {
    /// `user@host` glob.
    pub mask: String,
    pub reason: String,
    /// Name or SID of the server that set it.
    pub setter: String,
    /// Unix seconds.
    pub set_at: i64,
    /// Seconds; 0 is permanent.
    pub duration: i64,
}

impl XLine {
    pub fn expires_at(&self) -> Option<i64> {
        (self.duration > 0).then(|| self.set_at + self.duration)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// Seconds left, as sent in a burst. Permanent lines stay 0.
    pub fn remaining(&self, now: i64) -> i64 {
        match self.expires_at() {
            Some(at) => (at - now).max(1),
            None => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct XLineStore {
    active: Vec<XLine>,
    pending: Vec<XLine>,
}

impl XLineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a line until the next [`BanRules::apply_pending`].
    pub fn queue(&mut self, line: XLine) {
        self.pending.retain(|l| !l.mask.eq_ignore_ascii_case(&line.mask));
        self.pending.push(line);
    }

    pub fn active(&self) -> &[XLine] {
        &self.active
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop expired lines. Returns how many went.
    pub fn prune_expired(&mut self, now: i64) -> usize {
        let before = self.active.len();
        self.active.retain(|l| !l.is_expired(now));
        before - self.active.len()
    }
}

impl BanRules for XLineStore {
    fn apply_pending(&mut self) -> usize {
        let applied = self.pending.len();
        for line in self.pending.drain(..) {
            self.active.retain(|l| !l.mask.eq_ignore_ascii_case(&line.mask));
            self.active.push(line);
        }
        if applied > 0 {
            info!(count = applied, total = self.active.len(), "Applied pending G-lines");
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gline(mask: &str, set_at: i64, duration: i64) -> XLine {
        XLine {
            mask: mask.to_string(),
            reason: "test".to_string(),
            setter: "0LF".to_string(),
            set_at,
            duration,
        }
    }

    #[test]
    fn pending_lines_wait_for_apply() {
        let mut store = XLineStore::new();
        store.queue(gline("*@a.example", 0, 0));
        store.queue(gline("*@b.example", 0, 0));
        store.queue(gline("*@A.example", 0, 60));
        assert_eq!(store.pending_len(), 2);
        assert!(store.active().is_empty());

        assert_eq!(store.apply_pending(), 2);
        assert_eq!(store.active().len(), 2);
        assert_eq!(store.pending_len(), 0);
        assert_eq!(store.apply_pending(), 0);
    }

    #[test]
    fn reapplying_a_mask_replaces_it() {
        let mut store = XLineStore::new();
        store.queue(gline("*@a.example", 0, 0));
        store.apply_pending();
        store.queue(gline("*@a.example", 100, 60));
        store.apply_pending();

        assert_eq!(store.active().len(), 1);
        assert_eq!(store.active()[0].set_at, 100);
    }

    #[test]
    fn expiry() {
        let mut store = XLineStore::new();
        store.queue(gline("*@temp.example", 1000, 60));
        store.queue(gline("*@perm.example", 1000, 0));
        store.apply_pending();

        let temp = &store.active()[0];
        assert_eq!(temp.remaining(1030), 30);
        assert_eq!(store.active()[1].remaining(5000), 0);

        assert_eq!(store.prune_expired(1059), 0);
        assert_eq!(store.prune_expired(1060), 1);
        assert_eq!(store.active()[0].mask, "*@perm.example");
    }
}
