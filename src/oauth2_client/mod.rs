// ABOUTME: OAuth 2.0 client for a central identity server using the authorization-code grant
// ABOUTME: Provides PKCE request building, callback validation, token calls, and flow coordination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # OAuth 2.0 Client Module
//!
//! This crate acts as an OAuth 2.0 client of a single identity server. This module handles:
//! - authorization requests with PKCE (RFC 7636)
//! - callback validation, including duplicate-callback suppression
//! - code exchange, refresh, user-info and revocation calls
//! - per-session flow coordination through [`OAuthFlowManager`]

/// Callback query validation
pub mod callback;
/// Core OAuth 2.0 client implementation
pub mod client;
/// OAuth authorization flow management
pub mod flow_manager;
/// PKCE parameters and authorization URL building
pub mod pkce;

pub use callback::{validate_callback, CallbackOutcome, CallbackQuery, ValidatedCallback};
pub use client::OAuth2Client;
pub use flow_manager::{AuthEvent, Authentication, CallbackResult, OAuthFlowManager};
pub use pkce::{build_authorization_url, code_challenge, generate_state, PkceParams};
