// ABOUTME: Environment-based configuration for the identity server client
// ABOUTME: Loads VAUTH_* variables into VAuthConfig, AuthOptions and RouteConfig with validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::credentials::OAuthCredentials;
use super::types::CookieSameSite;
use crate::constants::{oauth, routes, time};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

/// Behavioural switches for the flow and the token stores
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthOptions {
    /// Persist tokens in secure cookies instead of the server-side session
    pub use_external_token_store: bool,
    /// Mark token cookies `Secure`
    pub cookie_secure: bool,
    /// `SameSite` policy for token cookies
    pub cookie_same_site: CookieSameSite,
    /// Idle lifetime of a server-side session
    pub session_lifetime_minutes: i64,
    /// Refresh when the access token expires within this many seconds
    pub refresh_threshold_seconds: i64,
    /// Use the PKCE flow; this flag alone decides PKCE vs. traditional
    pub use_pkce: bool,
    /// How long a completed callback is remembered for duplicate suppression
    pub processed_flow_ttl_seconds: i64,
    /// Request timeout for identity server calls
    pub http_timeout_seconds: u64,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            use_external_token_store: true,
            cookie_secure: true,
            cookie_same_site: CookieSameSite::Lax,
            session_lifetime_minutes: time::DEFAULT_SESSION_LIFETIME_MINUTES,
            refresh_threshold_seconds: time::DEFAULT_REFRESH_THRESHOLD_SECONDS,
            use_pkce: true,
            processed_flow_ttl_seconds: time::PROCESSED_FLOW_TTL_SECONDS,
            http_timeout_seconds: time::DEFAULT_HTTP_TIMEOUT_SECONDS,
        }
    }
}

/// Where the HTTP integration mounts itself and where it sends users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Prefix for the redirect/callback/logout/user routes
    pub prefix: String,
    /// Login entry point used by the auth middleware
    pub login_url: String,
    /// Destination after login when no intended URL was recorded
    pub default_redirect: String,
    /// Destination after logout
    pub logout_redirect: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            prefix: routes::DEFAULT_PREFIX.to_owned(),
            login_url: routes::DEFAULT_LOGIN_URL.to_owned(),
            default_redirect: routes::DEFAULT_REDIRECT_AFTER_LOGIN.to_owned(),
            logout_redirect: routes::DEFAULT_LOGOUT_REDIRECT.to_owned(),
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct VAuthConfig {
    /// Identity server base URL
    pub server_url: Url,
    /// Cookie domain; `None` produces host-only cookies
    pub cookie_domain: Option<String>,
    /// OAuth client credentials
    pub credentials: OAuthCredentials,
    /// Behavioural switches
    pub options: AuthOptions,
    /// HTTP integration layout
    pub routes: RouteConfig,
}

impl VAuthConfig {
    /// Build a configuration with default options
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is not an absolute http(s) URL
    pub fn new(server_url: &str, credentials: OAuthCredentials) -> AppResult<Self> {
        Ok(Self {
            server_url: parse_server_url(server_url)?,
            cookie_domain: None,
            credentials,
            options: AuthOptions::default(),
            routes: RouteConfig::default(),
        })
    }

    /// Replace the options
    #[must_use]
    pub fn with_options(mut self, options: AuthOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the route layout
    #[must_use]
    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    /// Set the cookie domain
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Load configuration from `VAUTH_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any value is invalid
    pub fn from_env() -> AppResult<Self> {
        info!("Loading identity server configuration from environment variables");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or any value is invalid
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvSource(lookup);

        let server_url = parse_server_url(&vars.required("VAUTH_URL")?)?;
        let credentials = OAuthCredentials::new(
            vars.required("VAUTH_CLIENT_ID")?,
            vars.get("VAUTH_CLIENT_SECRET"),
            vars.required("VAUTH_REDIRECT_URI")?,
            parse_scopes(&vars.or("VAUTH_SCOPES", oauth::DEFAULT_SCOPES)),
        )?;

        let defaults = AuthOptions::default();
        let options = AuthOptions {
            use_external_token_store: vars
                .bool_or("VAUTH_USE_COOKIE_STORE", defaults.use_external_token_store)?,
            cookie_secure: vars.bool_or("VAUTH_COOKIE_SECURE", defaults.cookie_secure)?,
            cookie_same_site: CookieSameSite::from_str_or_default(
                &vars.or("VAUTH_COOKIE_SAME_SITE", "lax"),
            ),
            session_lifetime_minutes: vars
                .parse_or("VAUTH_SESSION_LIFETIME", defaults.session_lifetime_minutes)?,
            refresh_threshold_seconds: vars.parse_or(
                "VAUTH_TOKEN_REFRESH_THRESHOLD",
                defaults.refresh_threshold_seconds,
            )?,
            use_pkce: vars.bool_or("VAUTH_USE_PKCE", defaults.use_pkce)?,
            processed_flow_ttl_seconds: vars
                .parse_or("VAUTH_PROCESSED_FLOW_TTL", defaults.processed_flow_ttl_seconds)?,
            http_timeout_seconds: vars
                .parse_or("VAUTH_API_TIMEOUT", defaults.http_timeout_seconds)?,
        };
        options.validate()?;

        let route_defaults = RouteConfig::default();
        let routes = RouteConfig {
            prefix: normalize_prefix(&vars.or("VAUTH_ROUTE_PREFIX", &route_defaults.prefix)),
            login_url: vars.or("VAUTH_LOGIN_URL", &route_defaults.login_url),
            default_redirect: vars.or("VAUTH_DEFAULT_REDIRECT", &route_defaults.default_redirect),
            logout_redirect: vars.or("VAUTH_LOGOUT_REDIRECT", &route_defaults.logout_redirect),
        };

        let cookie_domain = vars.get("VAUTH_DOMAIN");

        debug!(
            server_url = %server_url,
            client_id = %credentials.redacted_client_id(),
            use_pkce = options.use_pkce,
            cookie_store = options.use_external_token_store,
            "Identity server configuration loaded"
        );

        Ok(Self {
            server_url,
            cookie_domain,
            credentials,
            options,
            routes,
        })
    }

    /// Absolute URL of an identity server endpoint
    ///
    /// The path is appended to the base URL, so a base with a path prefix
    /// (`https://id.example.com/sso`) keeps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL does not parse
    pub fn endpoint(&self, path: &str) -> AppResult<Url> {
        join_endpoint(&self.server_url, path)
    }
}

/// Append `path` to `base`, keeping any path prefix `base` already has
///
/// # Errors
///
/// Returns an error if the joined URL does not parse
pub fn join_endpoint(base: &Url, path: &str) -> AppResult<Url> {
    let base = base.as_str().trim_end_matches('/');
    let joined = format!("{base}/{}", path.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| AppError::config(format!("Invalid endpoint URL {joined}: {e}")))
}

impl AuthOptions {
    /// Reject values that would make the flow misbehave
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid option
    pub fn validate(&self) -> AppResult<()> {
        if !(0..=time::MAX_REFRESH_THRESHOLD_SECONDS).contains(&self.refresh_threshold_seconds) {
            return Err(AppError::config(format!(
                "VAUTH_TOKEN_REFRESH_THRESHOLD must be between 0 and {}",
                time::MAX_REFRESH_THRESHOLD_SECONDS
            )));
        }
        if !(1..=time::MAX_SESSION_LIFETIME_MINUTES).contains(&self.session_lifetime_minutes) {
            return Err(AppError::config(format!(
                "VAUTH_SESSION_LIFETIME must be between 1 and {}",
                time::MAX_SESSION_LIFETIME_MINUTES
            )));
        }
        if !(1..=time::MAX_PROCESSED_FLOW_TTL_SECONDS).contains(&self.processed_flow_ttl_seconds) {
            return Err(AppError::config(format!(
                "VAUTH_PROCESSED_FLOW_TTL must be between 1 and {}",
                time::MAX_PROCESSED_FLOW_TTL_SECONDS
            )));
        }
        if self.http_timeout_seconds == 0 {
            return Err(AppError::config("VAUTH_API_TIMEOUT must be positive"));
        }
        Ok(())
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> AppResult<String> {
        self.get(key).ok_or_else(|| AppError::config_missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn bool_or(&self, key: &str, default: bool) -> AppResult<bool> {
        self.get(key).map_or(Ok(default), |value| {
            parse_bool(&value).ok_or_else(|| {
                AppError::config(format!("Invalid {key} value: {value} (expected true/false)"))
            })
        })
    }

    fn parse_or<T>(&self, key: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |value| {
            value
                .parse()
                .map_err(|e| AppError::config(format!("Invalid {key} value: {e}")))
        })
    }
}

fn parse_server_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::config(format!("Invalid identity server URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::config(format!(
            "Identity server URL must be an absolute http(s) URL: {raw}"
        )));
    }
    Ok(url)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse space or comma separated scopes
fn parse_scopes(scopes_str: &str) -> Vec<String> {
    scopes_str
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
