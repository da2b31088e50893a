// ABOUTME: Session-backed storage for pending authorization flows and processed-callback records
// ABOUTME: Keeps one pending flow per session and a TTL-bounded duplicate-suppression cache
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::{SessionStore, SessionStoreExt};
use crate::constants::session_keys;
use crate::errors::AppResult;
use crate::models::{PendingFlow, ProcessedFlow};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Flow records inside one session
pub struct FlowStore<'a> {
    session: &'a dyn SessionStore,
    processed_ttl_seconds: i64,
}

impl<'a> FlowStore<'a> {
    /// Flow records of `session`; processed entries live for `processed_ttl_seconds`
    #[must_use]
    pub fn new(session: &'a dyn SessionStore, processed_ttl_seconds: i64) -> Self {
        Self {
            session,
            processed_ttl_seconds,
        }
    }

    /// Replace the pending flow
    ///
    /// # Errors
    ///
    /// Returns an error if the session write fails
    pub async fn save_pending(&self, flow: &PendingFlow) -> AppResult<()> {
        self.session
            .put_json(session_keys::PENDING_FLOW, flow)
            .await
    }

    /// The pending flow, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record is corrupt
    pub async fn pending(&self) -> AppResult<Option<PendingFlow>> {
        self.session.get_json(session_keys::PENDING_FLOW).await
    }

    /// The pending flow if its state equals `state`
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record is corrupt
    pub async fn pending_for_state(&self, state: &str) -> AppResult<Option<PendingFlow>> {
        Ok(self.pending().await?.filter(|flow| flow.state == state))
    }

    /// Non-expired processed record for `state`
    ///
    /// Corrupt entries are treated as absent.
    pub async fn processed(&self, state: &str, now: DateTime<Utc>) -> Option<ProcessedFlow> {
        let key = processed_key(state);
        match self.session.get_json::<ProcessedFlow>(&key).await {
            Ok(Some(record)) if !record.is_expired(now, self.processed_ttl_seconds) => Some(record),
            Ok(_) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable processed-flow record");
                None
            }
        }
    }

    /// Remember a completed callback
    ///
    /// # Errors
    ///
    /// Returns an error if the session write fails
    pub async fn record_processed(&self, record: &ProcessedFlow) -> AppResult<()> {
        self.session
            .put_json(&processed_key(&record.state), record)
            .await
    }

    /// Remove the pending flow and prune expired processed records
    ///
    /// Returns how many processed records were pruned.
    pub async fn clear_pending(&self, now: DateTime<Utc>) -> usize {
        self.session.forget(session_keys::PENDING_FLOW).await;

        let mut pruned = 0;
        for key in self.session.keys().await {
            let Some(state) = key.strip_prefix(session_keys::PROCESSED_PREFIX) else {
                continue;
            };
            if self.processed(state, now).await.is_none() {
                self.session.forget(&key).await;
                pruned += 1;
            }
        }

        if pruned > 0 {
            debug!(pruned, "Pruned expired processed-flow records");
        }
        pruned
    }
}

fn processed_key(state: &str) -> String {
    format!("{}{state}", session_keys::PROCESSED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenSet;
    use crate::session::MemorySession;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn processed(state: &str, at: DateTime<Utc>) -> ProcessedFlow {
        ProcessedFlow {
            state: state.to_owned(),
            result: TokenSet::from_response("access".into(), None, None, None, at),
            processed_at: at,
        }
    }

    #[tokio::test]
    async fn test_pending_lookup_by_state() {
        let session = MemorySession::new();
        let flows = FlowStore::new(&session, 300);
        let flow = PendingFlow {
            state: "abc".into(),
            code_verifier: Some("v".repeat(43)),
            created_at: now(),
        };
        flows.save_pending(&flow).await.unwrap();

        assert_eq!(flows.pending_for_state("abc").await.unwrap(), Some(flow));
        assert!(flows.pending_for_state("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_processed_respects_ttl() {
        let session = MemorySession::new();
        let flows = FlowStore::new(&session, 300);
        flows.record_processed(&processed("s1", now())).await.unwrap();

        assert!(flows.processed("s1", now() + Duration::seconds(299)).await.is_some());
        assert!(flows.processed("s1", now() + Duration::seconds(300)).await.is_none());
        assert!(flows.processed("s2", now()).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_pending_prunes_only_expired_records() {
        let session = MemorySession::new();
        let flows = FlowStore::new(&session, 300);
        flows
            .save_pending(&PendingFlow {
                state: "p".into(),
                code_verifier: None,
                created_at: now(),
            })
            .await
            .unwrap();
        flows
            .record_processed(&processed("old", now() - Duration::seconds(600)))
            .await
            .unwrap();
        flows.record_processed(&processed("fresh", now())).await.unwrap();
        session
            .put_value("unrelated", serde_json::json!(1))
            .await
            .unwrap();

        assert_eq!(flows.clear_pending(now()).await, 1);
        assert!(flows.pending().await.unwrap().is_none());
        assert!(flows.processed("fresh", now()).await.is_some());
        assert!(session.get_value("oauth_processed_old").await.is_none());
        assert!(session.get_value("unrelated").await.is_some());
    }
}
