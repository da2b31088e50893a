// ABOUTME: Authorization request builder for the identity server with PKCE (RFC 7636) support
// ABOUTME: Generates state and code verifier values and the authorization URL for a new flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::config::environment::join_endpoint;
use crate::config::OAuthCredentials;
use crate::constants::{endpoints, oauth};
use crate::errors::OAuthFlowError;
use crate::models::PendingFlow;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use url::Url;

/// `PKCE` (Proof Key for Code Exchange) parameters
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Randomly generated code verifier (128 characters)
    pub code_verifier: String,
    /// SHA256 hash of code verifier, base64url encoded
    pub code_challenge: String,
    /// Challenge method (always "S256")
    pub code_challenge_method: &'static str,
}

impl PkceParams {
    /// Generate `PKCE` parameters with `S256` challenge method
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..oauth::CODE_VERIFIER_LENGTH)
            .map(|_| {
                char::from(oauth::VERIFIER_ALPHABET[rng.gen_range(0..oauth::VERIFIER_ALPHABET.len())])
            })
            .collect();
        Self::from_verifier(code_verifier)
    }

    /// Derive the challenge for an existing verifier
    #[must_use]
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: oauth::CODE_CHALLENGE_METHOD,
        }
    }
}

/// `base64url_nopad(sha256(verifier))`
#[must_use]
pub fn code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// 32 random bytes, base64url encoded without padding
#[must_use]
pub fn generate_state() -> String {
    let bytes: [u8; oauth::STATE_BYTES] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL for a new flow and the record to persist for it
///
/// No network calls; the caller must durably store the returned [`PendingFlow`]
/// before sending the user to the URL.
///
/// # Errors
///
/// Returns `Configuration` if the authorization endpoint URL cannot be built
pub fn build_authorization_url(
    base_url: &Url,
    credentials: &OAuthCredentials,
    use_pkce: bool,
    now: DateTime<Utc>,
) -> Result<(Url, PendingFlow), OAuthFlowError> {
    let mut url = join_endpoint(base_url, endpoints::AUTHORIZE_PATH)?;
    let state = generate_state();
    let pkce = use_pkce.then(PkceParams::generate);

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", credentials.client_id())
            .append_pair("redirect_uri", credentials.redirect_uri())
            .append_pair("response_type", "code")
            .append_pair("scope", &credentials.scopes_as_string())
            .append_pair("state", &state);

        if let Some(pkce) = &pkce {
            query
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", pkce.code_challenge_method);
        }
    }

    let flow = PendingFlow {
        state,
        code_verifier: pkce.map(|p| p.code_verifier),
        created_at: now,
    };
    Ok((url, flow))
}
