// ABOUTME: Core data models for the authorization flow, issued tokens, and the authenticated user
// ABOUTME: Defines PendingFlow, ProcessedFlow, TokenSet, AuthenticatedUser and TokenStatus
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Data Models
//!
//! Everything here is serde-serializable so it can live in a session or cookie
//! store. Timestamps are `chrono::DateTime<Utc>` and always come from the
//! injected [`crate::utils::clock::Clock`], never from `Utc::now()` directly.

use crate::constants::{oauth, time};
use crate::errors::OAuthFlowError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An authorization request that has been sent to the identity server and
/// whose callback has not arrived yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFlow {
    /// Anti-CSRF value round-tripped through the identity server
    pub state: String,
    /// PKCE verifier, `None` for the traditional flow
    pub code_verifier: Option<String>,
    /// When the authorization URL was built
    pub created_at: DateTime<Utc>,
}

/// Result of a completed callback, remembered so a replayed callback with the
/// same state can be answered without reusing the single-use code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFlow {
    /// State of the completed flow
    pub state: String,
    /// Tokens obtained by the first callback
    pub result: TokenSet,
    /// When the first callback completed
    pub processed_at: DateTime<Utc>,
}

impl ProcessedFlow {
    /// Whether this entry is older than `ttl_seconds`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_seconds: i64) -> bool {
        offset(self.processed_at, ttl_seconds).is_some_and(|expires| now >= expires)
    }
}

/// Tokens issued by the identity server
///
/// `expires_at` is fixed when the token response is received and never
/// recomputed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer credential
    pub access_token: String,
    /// Token type, normally `Bearer`
    pub token_type: String,
    /// Absolute expiry of the access token
    pub expires_at: DateTime<Utc>,
    /// Refresh credential, if the server issued one
    pub refresh_token: Option<String>,
}

impl TokenSet {
    /// Build from a token response received at `received_at`
    ///
    /// Missing `token_type` falls back to `Bearer`, missing `expires_in` to one hour.
    /// `expires_in` is clamped to `0..=MAX_TOKEN_EXPIRY_SECONDS`.
    #[must_use]
    pub fn from_response(
        access_token: String,
        token_type: Option<String>,
        expires_in: Option<i64>,
        refresh_token: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let expires_in = expires_in
            .unwrap_or(time::DEFAULT_TOKEN_EXPIRY_SECONDS)
            .clamp(0, time::MAX_TOKEN_EXPIRY_SECONDS);
        Self {
            access_token,
            token_type: token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| oauth::DEFAULT_TOKEN_TYPE.to_owned()),
            expires_at: offset(received_at, expires_in).unwrap_or(DateTime::<Utc>::MAX_UTC),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }

    /// Keep `previous` as the refresh token when the server did not rotate it
    #[must_use]
    pub fn retain_refresh_token(mut self, previous: Option<&str>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.map(str::to_owned);
        }
        self
    }

    /// Whether the access token has expired
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the access token expires within `threshold_seconds`
    #[must_use]
    pub fn is_expiring_soon(&self, now: DateTime<Utc>, threshold_seconds: i64) -> bool {
        !offset(now, threshold_seconds).is_some_and(|horizon| horizon < self.expires_at)
    }

    /// Seconds left before expiry, zero once expired
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

fn offset(at: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds).and_then(|delta| at.checked_add_signed(delta))
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Snapshot of the identity server's user-info response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Identity server user id (numeric ids are kept as their decimal string)
    #[serde(deserialize_with = "deserialize_user_id")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Email address, lower-cased
    pub email: String,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Any other claims returned by the server
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const MAX_NAME_LENGTH: usize = 255;

impl AuthenticatedUser {
    /// Parse and validate a user-info JSON payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if required fields are missing or malformed
    pub fn from_user_info(payload: Value) -> Result<Self, OAuthFlowError> {
        let user: Self = serde_json::from_value(payload)
            .map_err(|e| OAuthFlowError::InvalidResponse(format!("user info: {e}")))?;
        user.normalized()
    }

    fn normalized(mut self) -> Result<Self, OAuthFlowError> {
        if self.id.trim().is_empty() {
            return Err(OAuthFlowError::InvalidResponse(
                "user id cannot be empty".to_owned(),
            ));
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err(OAuthFlowError::InvalidResponse(
                "user name cannot be empty".to_owned(),
            ));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(OAuthFlowError::InvalidResponse(format!(
                "user name exceeds {MAX_NAME_LENGTH} characters"
            )));
        }
        self.name = name.to_owned();

        let email = self.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(OAuthFlowError::InvalidResponse(format!(
                "invalid email address: {email}"
            )));
        }
        self.email = email;

        self.avatar = self.avatar.filter(|a| !a.trim().is_empty());
        Ok(self)
    }

    /// Extra claim by key
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Whether an extra claim is present
    #[must_use]
    pub fn has_attribute(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }

    /// Copy with an extra claim set
    #[must_use]
    pub fn with_attribute(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.extra.insert(key.into(), value);
        next
    }

    /// Copy with an extra claim removed
    #[must_use]
    pub fn without_attribute(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.extra.remove(key);
        next
    }

    /// Identity comparison by user id
    #[must_use]
    pub fn is_same_user(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn deserialize_user_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// Diagnostic view of the stored tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatus {
    /// An access token is stored
    pub has_access_token: bool,
    /// A refresh token is stored
    pub has_refresh_token: bool,
    /// Stored token type
    pub token_type: Option<String>,
    /// Stored expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Access token has expired
    pub is_expired: bool,
    /// Access token is inside the refresh threshold
    pub is_expiring_soon: bool,
    /// Seconds left before expiry
    pub seconds_until_expiry: Option<i64>,
}

impl TokenStatus {
    /// Build from whatever the token store holds
    #[must_use]
    pub fn from_tokens(tokens: Option<&TokenSet>, now: DateTime<Utc>, threshold_seconds: i64) -> Self {
        tokens.map_or(
            Self {
                has_access_token: false,
                has_refresh_token: false,
                token_type: None,
                expires_at: None,
                is_expired: true,
                is_expiring_soon: true,
                seconds_until_expiry: None,
            },
            |t| Self {
                has_access_token: !t.access_token.is_empty(),
                has_refresh_token: t.refresh_token.is_some(),
                token_type: Some(t.token_type.clone()),
                expires_at: Some(t.expires_at),
                is_expired: t.is_expired(now),
                is_expiring_soon: t.is_expiring_soon(now, threshold_seconds),
                seconds_until_expiry: Some(t.seconds_until_expiry(now)),
            },
        )
    }
}
