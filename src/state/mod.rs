//! Daemon-side collaborators of the topology core.
//!
//! - [`UserManager`]: remote users, keyed by UID
//! - [`XLineStore`]: network bans, deferred while bursting
//! - [`NoticeLog`]: server notices
//! - [`EventBus`]: topology events for other tasks

mod bans;
mod events;
mod notices;
mod users;

pub use bans::{XLine, XLineStore};
pub use events::{EventBus, TopologyEvent};
pub use notices::{Notice, NoticeLog};
pub use users::{User, UserManager};
