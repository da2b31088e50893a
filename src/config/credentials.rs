// ABOUTME: OAuth client credentials value type with construction-time validation
// ABOUTME: Holds client id, optional secret, redirect URI, and the requested scope set
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::errors::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// OAuth client credentials, immutable for the lifetime of the process
///
/// `client_secret` is optional: public PKCE clients have none. When present it
/// is sent on the traditional code grant and on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl OAuthCredentials {
    /// Build and validate credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is empty or the redirect URI is not an
    /// absolute `http`/`https` URL
    pub fn new<I, S>(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
        scopes: I,
    ) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client_id = client_id.into().trim().to_owned();
        if client_id.is_empty() {
            return Err(AppError::config("Client ID cannot be empty"));
        }

        let redirect_uri = redirect_uri.into().trim().to_owned();
        if redirect_uri.is_empty() {
            return Err(AppError::config("Redirect URI cannot be empty"));
        }
        let parsed = Url::parse(&redirect_uri)
            .map_err(|e| AppError::config(format!("Invalid redirect URI format: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AppError::config(format!(
                "Redirect URI must be an absolute http(s) URL: {redirect_uri}"
            )));
        }

        let client_secret = client_secret
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());

        let mut normalized: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into().trim().to_owned();
            if !scope.is_empty() && !normalized.contains(&scope) {
                normalized.push(scope);
            }
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes: normalized,
        })
    }

    /// Client identifier
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret, if this is a confidential client
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Whether a client secret is configured
    #[must_use]
    pub const fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Registered redirect URI
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Requested scopes, in configuration order
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes joined with a single space, as sent on the wire
    #[must_use]
    pub fn scopes_as_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Whether `scope` is requested
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Copy with `scope` added (no-op if already present)
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> Self {
        let mut next = self.clone();
        let scope = scope.trim();
        if !scope.is_empty() && !next.has_scope(scope) {
            next.scopes.push(scope.to_owned());
        }
        next
    }

    /// Copy with `scope` removed
    #[must_use]
    pub fn without_scope(&self, scope: &str) -> Self {
        let mut next = self.clone();
        next.scopes.retain(|s| s != scope);
        next
    }

    /// Short client id prefix for log lines
    #[must_use]
    pub fn redacted_client_id(&self) -> String {
        let prefix: String = self.client_id.chars().take(8).collect();
        format!("{prefix}...")
    }

    /// First 8 hex chars of the SHA-256 of the client secret, for comparing
    /// deployments without logging the secret
    #[must_use]
    pub fn secret_fingerprint(&self) -> Option<String> {
        self.client_secret.as_ref().map(|secret| {
            let digest = Sha256::digest(secret.as_bytes());
            format!("{digest:x}").chars().take(8).collect()
        })
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}
