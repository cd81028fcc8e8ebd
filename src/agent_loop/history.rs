//! Per (session, user) conversation history.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::types::ModelMessage;

/// Append-only histories keyed by session, then user.
///
/// Histories grow without eviction; drop a whole session with
/// [`ConversationStore::clear_session`].
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, HashMap<String, Vec<ModelMessage>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the history for one (session, user) pair.
    pub fn history(&self, session: &str, user: &str) -> Vec<ModelMessage> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .and_then(|users| users.get(user))
            .cloned()
            .unwrap_or_default()
    }

    pub fn append(&self, session: &str, user: &str, message: ModelMessage) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session.to_string())
            .or_default()
            .entry(user.to_string())
            .or_default()
            .push(message);
    }

    pub fn len(&self, session: &str, user: &str) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .and_then(|users| users.get(user))
            .map_or(0, Vec::len)
    }

    /// Forget every user's history for `session`. Returns whether any existed.
    pub fn clear_session(&self, session: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histories_are_keyed_by_session_and_user() {
        let store = ConversationStore::new();
        store.append("s1", "alice", ModelMessage::user("hi"));
        store.append("s1", "bob", ModelMessage::user("yo"));
        store.append("s2", "alice", ModelMessage::user("other tab"));

        assert_eq!(store.len("s1", "alice"), 1);
        assert_eq!(store.history("s1", "bob")[0].text(), "yo");
        assert_eq!(store.history("s2", "alice")[0].text(), "other tab");
        assert!(store.history("s3", "alice").is_empty());

        assert!(store.clear_session("s1"));
        assert_eq!(store.len("s1", "alice"), 0);
        assert_eq!(store.len("s2", "alice"), 1);
    }
}
