//! Collaborator interfaces consumed by the tree.
//!
//! The tree never owns users, bans, or notice delivery. The daemon plugs
//! its own implementations in through these traits.

/// A connected user as seen by netsplit cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub uid: String,
    /// Name of the server the user is attached to.
    pub server: String,
    /// True when the user's socket is on this server.
    pub local: bool,
}

/// Quit reason with an optional operator-only variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuitReason {
    /// Shown to ordinary users.
    pub public: String,
    /// Shown to operators when it differs from `public`.
    pub oper: Option<String>,
}

impl QuitReason {
    pub fn new(public: impl Into<String>) -> Self {
        Self {
            public: public.into(),
            oper: None,
        }
    }

    pub fn with_oper(mut self, oper: impl Into<String>) -> Self {
        self.oper = Some(oper.into());
        self
    }
}

/// The global user registry.
pub trait UserRegistry {
    /// Snapshot of every known user.
    fn users(&self) -> Vec<UserEntry>;

    /// Disconnect a user. `quiet` suppresses the QUIT broadcast to local
    /// clients. Returns false if the user was already gone.
    fn quit_user(&mut self, uid: &str, reason: QuitReason, quiet: bool) -> bool;
}

/// Network ban store (G-lines and friends).
pub trait BanRules {
    /// Apply rules queued while a burst was in progress. Returns how many
    /// were applied.
    fn apply_pending(&mut self) -> usize;
}

/// Server notice classes used by the linking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeClass {
    /// Events on our own direct links.
    LinkLocal,
    /// Events further down the tree.
    LinkRemote,
}

impl NoticeClass {
    /// The snomask character for this class.
    pub fn mask(self) -> char {
        match self {
            Self::LinkLocal => 'l',
            Self::LinkRemote => 'L',
        }
    }
}

/// Operator notice delivery.
pub trait NoticeSink {
    fn notice(&mut self, class: NoticeClass, text: &str);
}

/// Consumers of topology changes.
pub trait TopologyEvents {
    /// A server finished bursting and is now part of the stable network.
    fn server_stable(&mut self, name: &str);
}

/// Everything `finish_burst` touches outside the tree.
pub struct BurstHooks<'a> {
    pub bans: &'a mut dyn BanRules,
    pub notices: &'a mut dyn NoticeSink,
    pub events: &'a mut dyn TopologyEvents,
}
