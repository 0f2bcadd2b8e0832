//! Remote user registry.
//!
//! Users are keyed by UID and carry the name of the server they are on,
//! which is all a netsplit needs to find them.

use super::events::{EventBus, TopologyEvent};
use slirc_proto::irc_to_lower;
use slirc_tree::{QuitReason, UserEntry, UserRegistry};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub realname: String,
    pub modes: String,
    pub ts: i64,
    /// Name of the server the user is attached to.
    pub server: String,
    /// Attached to this server.
    pub local: bool,
}

impl User {
    pub fn is_oper(&self) -> bool {
        self.modes.contains('o')
    }
}

#[derive(Debug)]
pub struct UserManager {
    users: HashMap<String, User>,
    nicks: HashMap<String, String>,
    events: EventBus,
}

impl UserManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            users: HashMap::new(),
            nicks: HashMap::new(),
            events,
        }
    }

    /// Add a user. Fails, returning the user, if the UID or nick is taken.
    pub fn add(&mut self, user: User) -> Result<(), User> {
        let folded = irc_to_lower(&user.nick);
        if self.users.contains_key(&user.uid) || self.nicks.contains_key(&folded) {
            return Err(user);
        }
        self.nicks.insert(folded, user.uid.clone());
        self.users.insert(user.uid.clone(), user);
        Ok(())
    }

    pub fn remove(&mut self, uid: &str) -> Option<User> {
        let user = self.users.remove(uid)?;
        self.nicks.remove(&irc_to_lower(&user.nick));
        Some(user)
    }

    pub fn get(&self, uid: &str) -> Option<&User> {
        self.users.get(uid)
    }

    pub fn find_nick(&self, nick: &str) -> Option<&User> {
        self.nicks
            .get(&irc_to_lower(nick))
            .and_then(|uid| self.users.get(uid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserRegistry for UserManager {
    fn users(&self) -> Vec<UserEntry> {
        self.users
            .values()
            .map(|u| UserEntry {
                uid: u.uid.clone(),
                server: u.server.clone(),
                local: u.local,
            })
            .collect()
    }

    fn quit_user(&mut self, uid: &str, reason: QuitReason, quiet: bool) -> bool {
        let Some(user) = self.remove(uid) else {
            return false;
        };
        debug!(uid = %user.uid, nick = %user.nick, reason = %reason.public, quiet, "User lost in netsplit");
        if !quiet {
            self.events.publish(TopologyEvent::UserQuit {
                uid: user.uid,
                nick: user.nick,
                reason: reason.public,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, nick: &str, server: &str) -> User {
        User {
            uid: uid.to_string(),
            nick: nick.to_string(),
            user: "u".to_string(),
            host: "host.example".to_string(),
            realname: "Real Name".to_string(),
            modes: "+i".to_string(),
            ts: 1_700_000_000,
            server: server.to_string(),
            local: false,
        }
    }

    #[test]
    fn nicks_fold_rfc1459() {
        let mut users = UserManager::new(EventBus::new(4));
        users.add(user("0LFAAAAAA", "Nick[Away]", "leaf.example")).unwrap();
        assert_eq!(users.find_nick("nick{away}").unwrap().uid, "0LFAAAAAA");
        assert!(users.add(user("0LFAAAAAB", "NICK{AWAY}", "leaf.example")).is_err());
        assert!(users.add(user("0LFAAAAAA", "other", "leaf.example")).is_err());
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn quit_user_removes_and_announces() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let mut users = UserManager::new(bus);
        users.add(user("0LFAAAAAA", "alice", "leaf.example")).unwrap();
        users.add(user("0LFAAAAAB", "bob", "leaf.example")).unwrap();

        assert!(users.quit_user("0LFAAAAAA", QuitReason::new("hub.example leaf.example"), false));
        assert!(users.quit_user("0LFAAAAAB", QuitReason::new("hub.example leaf.example"), true));
        assert!(!users.quit_user("0LFAAAAAA", QuitReason::new("again"), false));

        assert!(users.is_empty());
        assert!(users.find_nick("alice").is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            TopologyEvent::UserQuit {
                uid: "0LFAAAAAA".to_string(),
                nick: "alice".to_string(),
                reason: "hub.example leaf.example".to_string(),
            }
        );
        // bob's quit was quiet
        assert!(rx.try_recv().is_err());
    }
}
