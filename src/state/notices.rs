//! Server notices for link events.
//!
//! Notices go to the log under the `snomask` target and into a short
//! in-memory history.

use slirc_tree::{NoticeClass, NoticeSink};
use std::collections::VecDeque;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Snomask letter: `l` for direct links, `L` for remote servers.
    pub mask: char,
    pub text: String,
}

#[derive(Debug)]
pub struct NoticeLog {
    recent: VecDeque<Notice>,
    capacity: usize,
}

impl NoticeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &Notice> {
        self.recent.iter()
    }

    pub fn last(&self) -> Option<&Notice> {
        self.recent.back()
    }
}

impl NoticeSink for NoticeLog {
    fn notice(&mut self, class: NoticeClass, text: &str) {
        let mask = class.mask();
        // Control codes are for IRC clients, not log files.
        info!(target: "snomask", mask = %mask, "{}", text.replace('\x02', ""));

        if self.capacity == 0 {
            return;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(Notice {
            mask,
            text: text.to_string(),
        });
    }
}
