//! User → session association for routing notifications that only carry a
//! user id.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Last-write-wins map from user id to session key.
#[derive(Debug, Default)]
pub struct UserSessions {
    map: RwLock<HashMap<String, String>>,
}

impl UserSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a user with a session. Empty ids are ignored.
    pub fn associate(&self, user_id: &str, session_key: &str) {
        if user_id.is_empty() || session_key.is_empty() {
            return;
        }
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), session_key.to_string());
    }

    pub fn session_for(&self, user_id: &str) -> Option<String> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn forget(&self, user_id: &str) -> Option<String> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let users = UserSessions::new();
        users.associate("alice", "s1");
        users.associate("alice", "s2");
        assert_eq!(users.session_for("alice").as_deref(), Some("s2"));
    }

    #[test]
    fn empty_ids_are_ignored() {
        let users = UserSessions::new();
        users.associate("", "s1");
        users.associate("bob", "");
        assert!(users.session_for("").is_none());
        assert!(users.session_for("bob").is_none());
    }
}
