// ABOUTME: HTTP client for the identity server's token, user-info, and revocation endpoints
// ABOUTME: Performs authorization-code exchange, refresh-token grants, and bearer user lookups
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::config::environment::join_endpoint;
use crate::config::{OAuthCredentials, VAuthConfig};
use crate::constants::endpoints;
use crate::errors::OAuthFlowError;
use crate::logging::AppLogger;
use crate::models::{AuthenticatedUser, TokenSet};
use crate::utils::http_client::oauth_client;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Client for the identity server
#[derive(Debug, Clone)]
pub struct OAuth2Client {
    base_url: Url,
    client: reqwest::Client,
}

impl OAuth2Client {
    /// Client for `base_url` with the given request timeout
    #[must_use]
    pub fn new(base_url: Url, timeout_secs: u64) -> Self {
        Self::with_http_client(base_url, oauth_client(timeout_secs))
    }

    /// Client built from the loaded configuration
    #[must_use]
    pub fn from_config(config: &VAuthConfig) -> Self {
        Self::new(config.server_url.clone(), config.options.http_timeout_seconds)
    }

    /// Client using a caller-supplied `reqwest::Client`
    #[must_use]
    pub const fn with_http_client(base_url: Url, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    /// Identity server base URL
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client for making OAuth requests
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> Result<Url, OAuthFlowError> {
        Ok(join_endpoint(&self.base_url, path)?)
    }

    /// Exchange an authorization code for tokens
    ///
    /// Sends `code_verifier` when given (PKCE), otherwise `client_secret` if the
    /// credentials have one. The secret never accompanies a verifier.
    ///
    /// # Errors
    ///
    /// Returns `TokenExchangeFailed` on a non-2xx response, `InvalidResponse`
    /// if the body has no access token, `Http` on transport failure
    pub async fn exchange_code(
        &self,
        credentials: &OAuthCredentials,
        code: &str,
        code_verifier: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenSet, OAuthFlowError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", credentials.client_id()),
            ("redirect_uri", credentials.redirect_uri()),
            ("code", code),
        ];
        match (code_verifier, credentials.client_secret()) {
            (Some(verifier), _) => params.push(("code_verifier", verifier)),
            (None, Some(secret)) => params.push(("client_secret", secret)),
            (None, None) => {}
        }

        let url = self.endpoint(endpoints::TOKEN_PATH)?;
        debug!(pkce = code_verifier.is_some(), "Exchanging authorization code");
        let response = self.client.post(url.clone()).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            AppLogger::log_identity_server_failure(url.as_str(), status.as_u16(), &body);
            return Err(OAuthFlowError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthFlowError::InvalidResponse(format!("token response: {e}")))?;
        let tokens = token_set(parsed, now).ok_or_else(|| {
            OAuthFlowError::InvalidResponse("token response has no access_token".to_owned())
        })?;

        info!(
            expires_at = %tokens.expires_at,
            has_refresh_token = tokens.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(tokens)
    }

    /// Obtain a new access token with a refresh token
    ///
    /// The returned set keeps `refresh_token` when the server does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns `RefreshFailed` on a non-2xx response or a body without an
    /// access token, `Http` on transport failure
    pub async fn refresh(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenSet, OAuthFlowError> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credentials.client_id()),
        ];
        if let Some(secret) = credentials.client_secret() {
            params.push(("client_secret", secret));
        }

        let url = self.endpoint(endpoints::TOKEN_PATH)?;
        let response = self.client.post(url.clone()).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            AppLogger::log_identity_server_failure(url.as_str(), status.as_u16(), &body);
            return Err(OAuthFlowError::RefreshFailed(format!(
                "token endpoint returned {status}"
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| OAuthFlowError::RefreshFailed(format!("unreadable response: {e}")))?;
        let tokens = token_set(parsed, now)
            .ok_or_else(|| OAuthFlowError::RefreshFailed("response has no access_token".to_owned()))?
            .retain_refresh_token(Some(refresh_token));

        info!(expires_at = %tokens.expires_at, "Access token refreshed");
        Ok(tokens)
    }

    /// Fetch the user behind `access_token`
    ///
    /// # Errors
    ///
    /// Returns `UserInfoFetchFailed` on a non-2xx response, `InvalidResponse`
    /// if the payload is not a valid user, `Http` on transport failure
    pub async fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> Result<AuthenticatedUser, OAuthFlowError> {
        let url = self.endpoint(endpoints::USER_INFO_PATH)?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            AppLogger::log_identity_server_failure(url.as_str(), status.as_u16(), &body);
            return Err(OAuthFlowError::UserInfoFetchFailed {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OAuthFlowError::InvalidResponse(format!("user info: {e}")))?;
        AuthenticatedUser::from_user_info(payload)
    }

    /// Ask the identity server to revoke `access_token`
    ///
    /// Returns whether the server accepted the request.
    ///
    /// # Errors
    ///
    /// Returns `Http` on transport failure
    pub async fn revoke_token(
        &self,
        credentials: &OAuthCredentials,
        access_token: &str,
    ) -> Result<bool, OAuthFlowError> {
        let mut params = vec![
            ("token", access_token),
            ("client_id", credentials.client_id()),
        ];
        if let Some(secret) = credentials.client_secret() {
            params.push(("client_secret", secret));
        }

        let url = self.endpoint(endpoints::REVOKE_PATH)?;
        let status = self.client.post(url).form(&params).send().await?.status();
        if status.is_success() {
            debug!("Access token revoked");
        } else if status == StatusCode::NOT_FOUND {
            debug!("Identity server has no revocation endpoint");
        } else {
            warn!(status = status.as_u16(), "Token revocation rejected");
        }
        Ok(status.is_success())
    }
}

fn token_set(response: TokenResponse, now: DateTime<Utc>) -> Option<TokenSet> {
    let access_token = response.access_token.filter(|t| !t.is_empty())?;
    Some(TokenSet::from_response(
        access_token,
        response.token_type,
        response.expires_in,
        response.refresh_token,
        now,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_token_set_from_minimal_response() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        let tokens = token_set(response, now).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_at, now + Duration::seconds(3_600));
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_token_set_requires_access_token() {
        let now = Utc::now();
        let missing: TokenResponse = serde_json::from_str(r#"{"token_type":"Bearer"}"#).unwrap();
        assert!(token_set(missing, now).is_none());

        let empty: TokenResponse = serde_json::from_str(r#"{"access_token":""}"#).unwrap();
        assert!(token_set(empty, now).is_none());
    }
}
