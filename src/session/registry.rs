// ABOUTME: Process-wide registry of in-memory sessions keyed by the session cookie value
// ABOUTME: Handles idle expiry and re-keying after the session identifier is regenerated
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{MemorySession, SessionStore};
use crate::utils::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

struct SessionEntry {
    session: Arc<MemorySession>,
    last_seen: DateTime<Utc>,
}

/// Sessions for the bundled server
///
/// A session that has not been committed for longer than the configured
/// lifetime is dropped the next time it is looked up, or by [`Self::prune_expired`].
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Registry whose sessions expire after `lifetime_minutes` of inactivity
    #[must_use]
    pub fn new(lifetime_minutes: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime: Duration::try_minutes(lifetime_minutes).unwrap_or(Duration::MAX),
            clock,
        }
    }

    /// Live session stored under `id`
    ///
    /// An expired session is removed and reported as absent.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<MemorySession>> {
        let (session, last_seen) = self
            .sessions
            .get(id)
            .map(|entry| (Arc::clone(&entry.session), entry.last_seen))?;

        if self.clock.now() - last_seen < self.lifetime {
            return Some(session);
        }
        self.sessions.remove(id);
        debug!(session_id = %crate::logging::redact(id), "Expired session discarded");
        None
    }

    /// Store `session` under its current id and drop `previous_id` if the id changed
    ///
    /// Returns the id the session cookie should carry.
    pub async fn commit(&self, previous_id: Option<&str>, session: &Arc<MemorySession>) -> String {
        let id = session.id().await;
        if let Some(previous) = previous_id.filter(|previous| *previous != id) {
            self.sessions.remove(previous);
        }
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                session: Arc::clone(session),
                last_seen: self.clock.now(),
            },
        );
        id
    }

    /// Drop every session idle for longer than the lifetime
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| now - entry.last_seen < self.lifetime);
        before.saturating_sub(self.sessions.len())
    }

    /// Number of stored sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::TimeZone;

    fn registry() -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        (SessionRegistry::new(10, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_commit_then_get_returns_same_session() {
        let (registry, _) = registry();
        let session = Arc::new(MemorySession::new());
        let id = registry.commit(None, &session).await;

        let reopened = registry.get(&id).unwrap();
        assert!(Arc::ptr_eq(&session, &reopened));
    }

    #[tokio::test]
    async fn test_regenerated_session_is_rekeyed() {
        let (registry, _) = registry();
        let session = Arc::new(MemorySession::new());
        let old_id = registry.commit(None, &session).await;

        session.regenerate().await.unwrap();
        let new_id = registry.commit(Some(&old_id), &session).await;

        assert_ne!(old_id, new_id);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&old_id).is_none());
        assert!(registry.get(&new_id).is_some());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let (registry, clock) = registry();
        let session = Arc::new(MemorySession::new());
        let id = registry.commit(None, &session).await;

        clock.advance(Duration::minutes(11));
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let (registry, clock) = registry();
        let first = Arc::new(MemorySession::new());
        registry.commit(None, &first).await;
        clock.advance(Duration::minutes(11));
        let second = Arc::new(MemorySession::new());
        registry.commit(None, &second).await;

        assert_eq!(registry.prune_expired(), 1);
        assert_eq!(registry.len(), 1);
    }
}
