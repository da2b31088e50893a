// ABOUTME: Configuration management for the identity server client and its HTTP integration
// ABOUTME: Exposes validated OAuth credentials, auth options, and environment loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration module
//!
//! - **Credentials**: validated client id/secret, redirect URI and scopes
//! - **Environment**: [`VAuthConfig`] and [`AuthOptions`] loaded from `VAUTH_*` variables

/// Validated OAuth client credentials
pub mod credentials;
/// Environment-driven configuration
pub mod environment;
/// Shared configuration enums
pub mod types;

pub use credentials::OAuthCredentials;
pub use environment::{AuthOptions, RouteConfig, VAuthConfig};
pub use types::CookieSameSite;
