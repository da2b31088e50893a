// ABOUTME: Single-slot in-memory token store
// ABOUTME: Used by tests and by non-HTTP callers that hold one user's tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::TokenStore;
use crate::errors::AppResult;
use crate::models::TokenSet;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Holds at most one [`TokenSet`]
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Option<TokenSet>>,
}

impl InMemoryTokenStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `tokens`
    #[must_use]
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> AppResult<Option<TokenSet>> {
        Ok(self.tokens.read().await.clone())
    }

    async fn store(&self, tokens: &TokenSet) -> AppResult<()> {
        *self.tokens.write().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.tokens.write().await = None;
        Ok(())
    }
}
