// ABOUTME: Pluggable persistence for issued tokens with transparent refresh on read
// ABOUTME: Defines the TokenStore trait and the session, cookie, and in-memory backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Token Storage
//!
//! A [`TokenStore`] keeps one [`TokenSet`] per user agent. Writes replace the
//! whole set so a reader never sees a half-updated token.
//!
//! ## Backends
//!
//! - [`SessionTokenStore`]: the whole set under one session key
//! - [`CookieTokenStore`]: four `HttpOnly` cookies, refresh token kept for 30 days
//! - [`InMemoryTokenStore`]: a single slot, for tests and CLIs

/// Secure cookie backend
pub mod cookie;
/// Single-slot in-memory backend
pub mod memory;
/// Session-key backend
pub mod session;

pub use cookie::{CookieJar, CookieOptions, CookieTokenStore, MemoryCookieJar};
pub use memory::InMemoryTokenStore;
pub use session::SessionTokenStore;

use crate::config::{AuthOptions, OAuthCredentials};
use crate::errors::AppResult;
use crate::models::TokenSet;
use crate::oauth2_client::OAuth2Client;
use crate::session::SessionStore;
use crate::utils::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of [`TokenStore::get_valid_token`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// Stored access token, outside the refresh threshold
    Valid(String),
    /// A refresh happened and the store now holds this set
    Refreshed(TokenSet),
    /// No usable token and no way to get one
    Unavailable,
}

impl TokenLookup {
    /// Consume into the usable access token, if any
    #[must_use]
    pub fn into_access_token(self) -> Option<String> {
        match self {
            Self::Valid(token) => Some(token),
            Self::Refreshed(tokens) => Some(tokens.access_token),
            Self::Unavailable => None,
        }
    }
}

/// Persistence for one user agent's tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stored tokens, if an access token is present
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read
    async fn load(&self) -> AppResult<Option<TokenSet>>;

    /// Replace the stored tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write
    async fn store(&self, tokens: &TokenSet) -> AppResult<()>;

    /// Remove every stored token
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write
    async fn clear(&self) -> AppResult<()>;

    /// Stored refresh token
    ///
    /// Backends that can lose the access token independently of the refresh
    /// token (cookies expire separately) override this.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read
    async fn load_refresh_token(&self) -> AppResult<Option<String>> {
        Ok(self.load().await?.and_then(|tokens| tokens.refresh_token))
    }

    /// An access token that will not expire within `threshold_seconds`
    ///
    /// Makes at most one refresh call. A failed refresh is logged and yields
    /// [`TokenLookup::Unavailable`]; the stored tokens are left untouched.
    async fn get_valid_token(
        &self,
        client: &OAuth2Client,
        credentials: &OAuthCredentials,
        threshold_seconds: i64,
        now: DateTime<Utc>,
    ) -> TokenLookup {
        let current = self.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored tokens");
            None
        });

        if let Some(tokens) = &current {
            if !tokens.is_expiring_soon(now, threshold_seconds) {
                return TokenLookup::Valid(tokens.access_token.clone());
            }
            debug!(
                seconds_left = tokens.seconds_until_expiry(now),
                "Access token expiring soon, refreshing"
            );
        }

        let refresh_token = match current {
            Some(tokens) => tokens.refresh_token,
            None => self.load_refresh_token().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read stored refresh token");
                None
            }),
        };
        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token available");
            return TokenLookup::Unavailable;
        };

        match client.refresh(credentials, &refresh_token, now).await {
            Ok(tokens) => {
                if let Err(e) = self.store(&tokens).await {
                    warn!(error = %e, "Refreshed tokens could not be stored");
                    return TokenLookup::Unavailable;
                }
                TokenLookup::Refreshed(tokens)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                TokenLookup::Unavailable
            }
        }
    }
}

/// Token store for one request, chosen by `use_external_token_store`
#[must_use]
pub fn select_token_store(
    options: &AuthOptions,
    session: Arc<dyn SessionStore>,
    jar: Arc<dyn CookieJar>,
    cookie_options: CookieOptions,
    clock: Arc<dyn Clock>,
) -> Arc<dyn TokenStore> {
    if options.use_external_token_store {
        Arc::new(CookieTokenStore::new(jar, cookie_options, clock))
    } else {
        Arc::new(SessionTokenStore::new(session))
    }
}
