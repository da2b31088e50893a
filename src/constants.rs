// ABOUTME: Crate-wide constants for the OAuth client, session keys, and cookie names
// ABOUTME: Defaults mirror the identity server contract and the package's historical behaviour
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Constants Module
//!
//! Hardcoded defaults. Anything tunable is also exposed through
//! [`crate::config::AuthOptions`] and read from the environment.

/// Identity server endpoint paths, appended to the configured base URL
pub mod endpoints {
    /// Authorization endpoint (browser redirect target)
    pub const AUTHORIZE_PATH: &str = "/oauth/authorize";
    /// Token endpoint (authorization code and refresh grants)
    pub const TOKEN_PATH: &str = "/oauth/token";
    /// User-info endpoint (bearer-authenticated)
    pub const USER_INFO_PATH: &str = "/api/user";
    /// Token revocation endpoint
    pub const REVOKE_PATH: &str = "/oauth/tokens/revoke";
}

/// OAuth protocol values
pub mod oauth {
    /// Length of the generated PKCE code verifier (RFC 7636 allows 43-128)
    pub const CODE_VERIFIER_LENGTH: usize = 128;
    /// Random bytes behind the state parameter (base64url encoded to 43 chars)
    pub const STATE_BYTES: usize = 32;
    /// The only supported PKCE challenge method
    pub const CODE_CHALLENGE_METHOD: &str = "S256";
    /// Scopes requested when none are configured
    pub const DEFAULT_SCOPES: &str = "user:read";
    /// Token type assumed when the server omits one
    pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
    /// RFC 7636 unreserved characters used for the code verifier
    pub const VERIFIER_ALPHABET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
}

/// Time-related defaults
pub mod time {
    /// Access token lifetime assumed when the server omits `expires_in`
    pub const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 3600;
    /// Upper bound applied to a server-supplied `expires_in` (one year)
    pub const MAX_TOKEN_EXPIRY_SECONDS: i64 = 365 * 24 * 60 * 60;
    /// Upper bound for the refresh threshold (one day)
    pub const MAX_REFRESH_THRESHOLD_SECONDS: i64 = 24 * 60 * 60;
    /// Upper bound for the processed-flow TTL (one day)
    pub const MAX_PROCESSED_FLOW_TTL_SECONDS: i64 = 24 * 60 * 60;
    /// Upper bound for the session lifetime (30 days)
    pub const MAX_SESSION_LIFETIME_MINUTES: i64 = 30 * 24 * 60;
    /// How often the bundled server drops idle sessions
    pub const SESSION_PRUNE_INTERVAL_SECONDS: u64 = 60;
    /// Refresh this many seconds before the access token expires
    pub const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 300;
    /// Lifetime of duplicate-suppression entries
    pub const PROCESSED_FLOW_TTL_SECONDS: i64 = 300;
    /// Lifetime of the refresh token cookie
    pub const REFRESH_COOKIE_TTL_DAYS: i64 = 30;
    /// Session lifetime (12 hours)
    pub const DEFAULT_SESSION_LIFETIME_MINUTES: i64 = 720;
    /// Request timeout for identity server calls
    pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;
    /// Connect timeout for identity server calls
    pub const HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 5;
}

/// Keys used inside the session store
pub mod session_keys {
    /// The single pending authorization flow
    pub const PENDING_FLOW: &str = "oauth_pending_flow";
    /// Prefix for duplicate-suppression entries, followed by the state value
    pub const PROCESSED_PREFIX: &str = "oauth_processed_";
    /// Token set when the session-backed token store is used
    pub const TOKEN_SET: &str = "vauth_tokens";
    /// Cached user-info snapshot
    pub const USER: &str = "vauth_user";
    /// Where to send the user after a successful login
    pub const INTENDED_URL: &str = "url.intended";
}

/// Cookie names
pub mod cookies {
    /// Access token cookie
    pub const ACCESS_TOKEN: &str = "vauth_access_token";
    /// Token type cookie
    pub const TOKEN_TYPE: &str = "vauth_token_type";
    /// Absolute expiry of the access token, in unix seconds
    pub const TOKEN_EXPIRES: &str = "vauth_token_expires";
    /// Refresh token cookie
    pub const REFRESH_TOKEN: &str = "vauth_refresh_token";
    /// Session identifier cookie
    pub const SESSION: &str = "vauth_session";
}

/// Default route layout for the axum integration
pub mod routes {
    /// Prefix under which the auth routes are mounted
    pub const DEFAULT_PREFIX: &str = "/auth/oauth";
    /// Login entry point
    pub const DEFAULT_LOGIN_URL: &str = "/auth/oauth/redirect";
    /// Destination after a successful login
    pub const DEFAULT_REDIRECT_AFTER_LOGIN: &str = "/dashboard";
    /// Destination after logout
    pub const DEFAULT_LOGOUT_REDIRECT: &str = "/";
}

/// Authentication event broadcasting
pub mod events {
    /// Buffered events per subscriber before the oldest are dropped
    pub const CHANNEL_CAPACITY: usize = 64;
}

/// Service names for structured logging
pub mod service_names {
    /// Name of the bundled server binary
    pub const VAUTH_SERVER: &str = "vauth-server";
}
