//! Session-scoped event bus.
//!
//! Every client session owns one ordered [`Session`] queue. Publishers
//! (run orchestrators, the stream relay, tool handlers) push [`Event`]s into
//! it; the delivery loop for the subscribed client drains it.

pub mod event;
pub mod session;
pub mod users;

pub use event::{Event, EventKind, JSONRPC_VERSION};
pub use session::Session;
pub use users::UserSessions;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Header carrying the session key on control and event requests.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Session key used when a request carries none.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// Normalize a raw session header value, falling back to [`DEFAULT_SESSION_KEY`].
pub fn normalize_session_key(raw: Option<&str>) -> String {
    normalize_session_key_or(raw, DEFAULT_SESSION_KEY)
}

/// Keep the first comma-delimited token, trimmed; use `default` when absent or empty.
pub fn normalize_session_key_or(raw: Option<&str>, default: &str) -> String {
    match raw {
        Some(raw) if !raw.is_empty() => raw.split(',').next().unwrap_or_default().trim().to_string(),
        _ => default.to_string(),
    }
}

/// Owner of all live sessions, keyed by normalized session key.
#[derive(Debug, Default)]
pub struct SessionBus {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live session for `key`, creating a fresh one if it is
    /// absent or was closed.
    pub fn get_or_create(&self, key: &str) -> Arc<Session> {
        let mut sessions = self.sessions();
        match sessions.get(key) {
            Some(session) if !session.is_closed() => session.clone(),
            _ => {
                tracing::debug!(session = key, "creating session");
                let session = Arc::new(Session::new(key));
                sessions.insert(key.to_string(), session.clone());
                session
            }
        }
    }

    /// Look up a live session without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions()
            .get(key)
            .filter(|session| !session.is_closed())
            .cloned()
    }

    /// Enqueue `event` for `key`, creating the session on first reference.
    pub fn publish(&self, key: &str, event: Event) -> bool {
        let session = self.get_or_create(key);
        let kind = event.kind();
        let accepted = session.publish(event);
        tracing::trace!(session = key, %kind, accepted, "publish");
        accepted
    }

    /// Remove and close the session, discarding buffered events.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.sessions().remove(key);
        match removed {
            Some(session) => {
                session.close();
                let dropped = session.drain();
                tracing::debug!(session = key, dropped, "deleted session");
                true
            }
            None => false,
        }
    }

    /// Whether a live session is tracked for `key`; agrees with [`SessionBus::get`].
    pub fn exists(&self, key: &str) -> bool {
        self.sessions()
            .get(key)
            .is_some_and(|session| !session.is_closed())
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_first_token() {
        assert_eq!(normalize_session_key(Some("abc123, extra")), "abc123");
        assert_eq!(normalize_session_key(Some("  spaced  ")), "spaced");
        assert_eq!(normalize_session_key(None), DEFAULT_SESSION_KEY);
        assert_eq!(normalize_session_key(Some("")), DEFAULT_SESSION_KEY);
        assert_eq!(normalize_session_key_or(None, "fallback"), "fallback");
    }

    #[test]
    fn get_or_create_reuses_live_session() {
        let bus = SessionBus::new();
        let a = bus.get_or_create("k");
        let b = bus.get_or_create("k");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn closed_session_is_superseded() {
        let bus = SessionBus::new();
        let first = bus.get_or_create("k");
        first.close();
        let second = bus.get_or_create("k");
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
        assert!(bus.get("k").is_some());
    }

    #[test]
    fn delete_reports_existence() {
        let bus = SessionBus::new();
        assert!(!bus.delete("missing"));
        bus.get_or_create("k");
        assert!(bus.exists("k"));
        assert!(bus.delete("k"));
        assert!(!bus.exists("k"));
        assert!(bus.is_empty());
    }

    #[test]
    fn publish_after_delete_targets_fresh_session() {
        let bus = SessionBus::new();
        let stale = bus.get_or_create("k");
        bus.publish("k", Event::assistant_text("old"));
        bus.delete("k");
        assert!(!stale.publish(Event::assistant_text("lost")));

        bus.publish("k", Event::assistant_text("new"));
        let fresh = bus.get_or_create("k");
        let event = fresh.try_next().expect("fresh event");
        assert_eq!(event.data()["text"], "new");
        assert!(fresh.try_next().is_none());
    }

    #[test]
    fn closed_session_does_not_exist() {
        let bus = SessionBus::new();
        bus.get_or_create("k").close();
        assert!(!bus.exists("k"));
        assert!(bus.get("k").is_none());
        assert!(bus.get_or_create("k").publish(Event::assistant_text("again")));
        assert!(bus.exists("k"));
    }

    #[test]
    fn racing_get_or_create_shares_one_session() {
        let bus = SessionBus::new();
        let barrier = std::sync::Barrier::new(16);
        let sessions: Vec<Arc<Session>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        bus.get_or_create("shared")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn concurrent_publishers_keep_per_publisher_order() {
        const PUBLISHERS: usize = 8;
        const PER_PUBLISHER: usize = 200;

        let bus = SessionBus::new();
        let barrier = std::sync::Barrier::new(PUBLISHERS);
        std::thread::scope(|scope| {
            for publisher in 0..PUBLISHERS {
                let (bus, barrier) = (&bus, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    for seq in 0..PER_PUBLISHER {
                        assert!(bus.publish("k", Event::assistant_text(format!("{publisher}:{seq}"))));
                    }
                });
            }
        });

        let session = bus.get_or_create("k");
        let mut next_seq = [0usize; PUBLISHERS];
        let mut total = 0;
        while let Some(event) = session.try_next() {
            let text = event.data()["text"].as_str().unwrap().to_string();
            let (publisher, seq) = text.split_once(':').unwrap();
            let publisher: usize = publisher.parse().unwrap();
            assert_eq!(seq.parse::<usize>().unwrap(), next_seq[publisher], "publisher {publisher}");
            next_seq[publisher] += 1;
            total += 1;
        }
        assert_eq!(total, PUBLISHERS * PER_PUBLISHER);
        assert!(next_seq.iter().all(|&n| n == PER_PUBLISHER));
    }
}
