// ABOUTME: Tests loading identity server configuration from process environment variables
// ABOUTME: Runs serially because every test mutates the shared environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use serial_test::serial;
use std::env;
use vauth_client::config::{CookieSameSite, VAuthConfig};
use vauth_client::errors::ErrorCode;

const ALL_KEYS: &[&str] = &[
    "VAUTH_URL",
    "VAUTH_CLIENT_ID",
    "VAUTH_CLIENT_SECRET",
    "VAUTH_REDIRECT_URI",
    "VAUTH_SCOPES",
    "VAUTH_DOMAIN",
    "VAUTH_USE_COOKIE_STORE",
    "VAUTH_COOKIE_SECURE",
    "VAUTH_COOKIE_SAME_SITE",
    "VAUTH_SESSION_LIFETIME",
    "VAUTH_TOKEN_REFRESH_THRESHOLD",
    "VAUTH_USE_PKCE",
    "VAUTH_PROCESSED_FLOW_TTL",
    "VAUTH_API_TIMEOUT",
    "VAUTH_ROUTE_PREFIX",
    "VAUTH_LOGIN_URL",
    "VAUTH_DEFAULT_REDIRECT",
    "VAUTH_LOGOUT_REDIRECT",
];

fn reset_env() {
    for key in ALL_KEYS {
        env::remove_var(key);
    }
}

fn set_required() {
    env::set_var("VAUTH_URL", "https://id.example.com/");
    env::set_var("VAUTH_CLIENT_ID", "portal");
    env::set_var("VAUTH_REDIRECT_URI", "https://portal.example.com/auth/oauth/callback");
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    reset_env();
    set_required();

    let config = VAuthConfig::from_env().unwrap();
    assert_eq!(config.server_url.as_str(), "https://id.example.com/");
    assert_eq!(config.credentials.client_id(), "portal");
    assert!(config.credentials.client_secret().is_none());
    assert_eq!(config.credentials.scopes_as_string(), "user:read");
    assert!(config.options.use_pkce);
    assert!(config.options.use_external_token_store);
    assert_eq!(config.options.refresh_threshold_seconds, 300);
    assert_eq!(config.options.processed_flow_ttl_seconds, 300);
    assert_eq!(config.options.cookie_same_site, CookieSameSite::Lax);
    assert_eq!(config.routes.prefix, "/auth/oauth");
    assert_eq!(config.routes.default_redirect, "/dashboard");
    assert!(config.cookie_domain.is_none());

    reset_env();
}

#[test]
#[serial]
fn test_from_env_with_overrides() {
    reset_env();
    set_required();
    env::set_var("VAUTH_CLIENT_SECRET", "s3cret");
    env::set_var("VAUTH_SCOPES", "user:read, user:email");
    env::set_var("VAUTH_USE_PKCE", "false");
    env::set_var("VAUTH_USE_COOKIE_STORE", "false");
    env::set_var("VAUTH_COOKIE_SAME_SITE", "strict");
    env::set_var("VAUTH_TOKEN_REFRESH_THRESHOLD", "120");
    env::set_var("VAUTH_DOMAIN", "example.com");
    env::set_var("VAUTH_ROUTE_PREFIX", "sso/");

    let config = VAuthConfig::from_env().unwrap();
    assert_eq!(config.credentials.client_secret(), Some("s3cret"));
    assert!(config.credentials.has_scope("user:email"));
    assert!(!config.options.use_pkce);
    assert!(!config.options.use_external_token_store);
    assert_eq!(config.options.cookie_same_site, CookieSameSite::Strict);
    assert_eq!(config.options.refresh_threshold_seconds, 120);
    assert_eq!(config.cookie_domain.as_deref(), Some("example.com"));
    assert_eq!(config.routes.prefix, "/sso");

    reset_env();
}

#[test]
#[serial]
fn test_from_env_missing_client_id() {
    reset_env();
    env::set_var("VAUTH_URL", "https://id.example.com");
    env::set_var("VAUTH_REDIRECT_URI", "https://portal.example.com/callback");

    let err = VAuthConfig::from_env().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigMissing);
    assert!(err.message.contains("VAUTH_CLIENT_ID"));

    reset_env();
}

#[test]
#[serial]
fn test_from_env_rejects_malformed_numbers() {
    reset_env();
    set_required();
    env::set_var("VAUTH_TOKEN_REFRESH_THRESHOLD", "soon");

    assert!(VAuthConfig::from_env().is_err());

    reset_env();
}
