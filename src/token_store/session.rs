// ABOUTME: Token store that keeps the whole token set under a single session key
// ABOUTME: One key per set means a write is atomic with respect to the request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::TokenStore;
use crate::constants::session_keys;
use crate::errors::AppResult;
use crate::models::TokenSet;
use crate::session::{SessionStore, SessionStoreExt};
use async_trait::async_trait;
use std::sync::Arc;

/// Tokens kept server-side in the session
pub struct SessionTokenStore {
    session: Arc<dyn SessionStore>,
}

impl SessionTokenStore {
    /// Store backed by `session`
    #[must_use]
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl TokenStore for SessionTokenStore {
    async fn load(&self) -> AppResult<Option<TokenSet>> {
        self.session.get_json(session_keys::TOKEN_SET).await
    }

    async fn store(&self, tokens: &TokenSet) -> AppResult<()> {
        self.session.put_json(session_keys::TOKEN_SET, tokens).await
    }

    async fn clear(&self) -> AppResult<()> {
        self.session.forget(session_keys::TOKEN_SET).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use chrono::Utc;

    #[tokio::test]
    async fn test_session_store_round_trip() {
        let session = Arc::new(MemorySession::new());
        let store = SessionTokenStore::new(session.clone());
        let tokens =
            TokenSet::from_response("access".into(), None, Some(60), Some("refresh".into()), Utc::now());

        store.store(&tokens).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(tokens));
        assert_eq!(
            store.load_refresh_token().await.unwrap().as_deref(),
            Some("refresh")
        );
        assert!(session.get_value(session_keys::TOKEN_SET).await.is_some());

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
