// ABOUTME: Main library entry point for the vauth identity server client
// ABOUTME: Provides PKCE login, callback validation, token storage, and axum integration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # vauth client
//!
//! Signs users of a web application in against a central `OAuth2` identity
//! server using the authorization-code grant with PKCE.
//!
//! ## Features
//!
//! - **PKCE**: S256 challenges with a per-flow verifier and CSRF state
//! - **Callback hardening**: constant-time state checks and replay detection
//!   through a short-lived processed-flow cache
//! - **Token storage**: server-side session or `HttpOnly` cookies
//! - **Transparent refresh**: expiring access tokens are renewed on read
//! - **axum integration**: login routes and a `require_auth` middleware
//!
//! ## Architecture
//!
//! - **config**: credentials and `VAUTH_*` environment configuration
//! - **`oauth2_client`**: PKCE helpers, callback validation, the identity
//!   server client and the flow manager
//! - **session**: session abstraction and pending/processed flow records
//! - **`token_store`**: session and cookie token stores
//! - **routes**: HTTP endpoints and middleware

/// Credentials, options, and environment loading
pub mod config;

/// Application constants
pub mod constants;

/// Error types
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Flow records, tokens, and user types
pub mod models;

/// Authorization-code flow against the identity server
pub mod oauth2_client;

/// HTTP routes and middleware
pub mod routes;

/// Session storage and flow bookkeeping
pub mod session;

/// Token persistence
pub mod token_store;

/// Clock and HTTP client helpers
pub mod utils;
