// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides a mock identity server, credentials, clock, and flow manager helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `vauth_client`

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use url::Url;
use vauth_client::{
    config::{OAuthCredentials, VAuthConfig},
    oauth2_client::{OAuth2Client, OAuthFlowManager},
    session::SessionStore,
    utils::clock::ManualClock,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT_LOGGER: Once = Once::new();

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";
pub const REDIRECT_URI: &str = "https://app.example.com/auth/oauth/callback";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Fixed start instant for clock-driven tests
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn public_credentials() -> OAuthCredentials {
    OAuthCredentials::new(CLIENT_ID, None, REDIRECT_URI, ["user:read"]).unwrap()
}

pub fn confidential_credentials() -> OAuthCredentials {
    OAuthCredentials::new(
        CLIENT_ID,
        Some(CLIENT_SECRET.to_owned()),
        REDIRECT_URI,
        ["user:read"],
    )
    .unwrap()
}

/// Configuration pointing at the mock identity server
pub fn config_for(server: &MockServer) -> VAuthConfig {
    VAuthConfig::new(&server.uri(), public_credentials()).unwrap()
}

/// Flow manager on a manual clock
pub fn manager_for(config: VAuthConfig, clock: &Arc<ManualClock>) -> OAuthFlowManager {
    let client = OAuth2Client::from_config(&config);
    OAuthFlowManager::with_parts(config, client, clock.clone())
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

pub fn user_body() -> Value {
    json!({
        "id": 42,
        "name": "Ada Lovelace",
        "email": "Ada@Example.com",
        "avatar": "https://cdn.example.com/ada.png",
        "department": "Analytics"
    })
}

/// Token endpoint answering the authorization-code grant
pub async fn mount_code_exchange(server: &MockServer, body: Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Token endpoint answering the refresh-token grant
pub async fn mount_refresh(server: &MockServer, body: Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Token endpoint failing with `status`
pub async fn mount_token_error(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The authorization code is invalid"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// User-info endpoint accepting `access_token`
pub async fn mount_user_info(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .and(header("authorization", format!("Bearer {access_token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// User-info endpoint failing with `status`
pub async fn mount_user_info_error(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "Unauthenticated."})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Query parameter of `url`
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Begin a login and return the authorization URL and its state
pub async fn start_login(manager: &OAuthFlowManager, session: &dyn SessionStore) -> (Url, String) {
    let url = manager.redirect_url(session).await.unwrap();
    let state = query_param(&url, "state").unwrap();
    (url, state)
}
