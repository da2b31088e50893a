// ABOUTME: HTTP client construction for identity server calls with bounded timeouts
// ABOUTME: Every outbound request from this crate goes through a client built here
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::time;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!("vauth-client/", env!("CARGO_PKG_VERSION"));

/// Create a new HTTP client with custom timeout settings
///
/// # Arguments
/// * `timeout_secs` - Request timeout in seconds
/// * `connect_timeout_secs` - Connection timeout in seconds
///
/// Falls back to a default client if the TLS backend cannot be initialised
/// with the custom settings.
#[must_use]
pub fn create_client_with_timeout(timeout_secs: u64, connect_timeout_secs: u64) -> Client {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for token, user-info and revoke calls against the identity server
///
/// `timeout_secs` comes from `AuthOptions::http_timeout_seconds`; the connect
/// timeout is fixed.
#[must_use]
pub fn oauth_client(timeout_secs: u64) -> Client {
    create_client_with_timeout(timeout_secs, time::HTTP_CONNECT_TIMEOUT_SECONDS)
}
