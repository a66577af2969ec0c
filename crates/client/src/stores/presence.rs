//! Participant roster and typing peers for the live session.

use std::collections::BTreeSet;

/// Nicknames currently in the room, in server order.
///
/// Replaced wholesale by each `user_list` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantRoster {
    users: Vec<String>,
}

impl ParticipantRoster {
    /// Replace the roster. Returns `true` if it changed.
    ///
    /// Duplicate names keep their first position.
    pub fn replace(&mut self, users: Vec<String>) -> bool {
        let mut seen = BTreeSet::new();
        let users: Vec<String> = users
            .into_iter()
            .filter(|user| seen.insert(user.clone()))
            .collect();
        if users == self.users {
            return false;
        }
        self.users = users;
        true
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.users.iter().any(|u| u == nickname)
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Returns `true` if there was anything to clear.
    pub fn clear(&mut self) -> bool {
        let had_users = !self.users.is_empty();
        self.users.clear();
        had_users
    }
}

/// Peers currently composing. Never contains the local nickname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingSet {
    peers: BTreeSet<String>,
}

impl TypingSet {
    /// Returns `true` if the set changed.
    pub fn insert(&mut self, nickname: &str) -> bool {
        self.peers.insert(nickname.to_string())
    }

    /// Returns `true` if the set changed.
    pub fn remove(&mut self, nickname: &str) -> bool {
        self.peers.remove(nickname)
    }

    /// Drop peers no longer in `roster`. Returns `true` if any were removed.
    pub fn prune(&mut self, roster: &ParticipantRoster) -> bool {
        let before = self.peers.len();
        self.peers.retain(|peer| roster.contains(peer));
        self.peers.len() != before
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.peers.contains(nickname)
    }

    /// Typing peers in name order.
    pub fn to_vec(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns `true` if there was anything to clear.
    pub fn clear(&mut self) -> bool {
        let had_peers = !self.peers.is_empty();
        self.peers.clear();
        had_peers
    }
}
