// ABOUTME: Token store that persists tokens in HttpOnly secure cookies
// ABOUTME: Defines the CookieJar seam, an in-memory jar, and cookie attribute options
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::TokenStore;
use crate::config::VAuthConfig;
use crate::constants::{cookies, oauth, time as time_defaults};
use crate::errors::AppResult;
use crate::models::TokenSet;
use crate::utils::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Access to the request's cookies and the response's pending `Set-Cookie`s
pub trait CookieJar: Send + Sync {
    /// Cookie value as seen by this request, including anything queued so far
    fn get(&self, name: &str) -> Option<String>;

    /// Queue a cookie for the response
    fn queue(&self, cookie: Cookie<'static>);

    /// Queue removal of a cookie; `cookie` carries the path and domain to match
    fn forget(&self, cookie: Cookie<'static>);
}

/// Attributes shared by every token cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// `Secure` flag
    pub secure: bool,
    /// `SameSite` policy
    pub same_site: SameSite,
    /// `Domain` attribute; `None` for host-only cookies
    pub domain: Option<String>,
    /// `Path` attribute
    pub path: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            domain: None,
            path: "/".to_owned(),
        }
    }
}

impl CookieOptions {
    /// Options derived from the loaded configuration
    #[must_use]
    pub fn from_config(config: &VAuthConfig) -> Self {
        Self {
            secure: config.options.cookie_secure,
            same_site: config.options.cookie_same_site.to_cookie(),
            domain: config.cookie_domain.clone(),
            path: "/".to_owned(),
        }
    }

    /// `HttpOnly` cookie carrying these attributes
    #[must_use]
    pub fn build(&self, name: &str, value: String, max_age: CookieDuration) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_owned(), value))
            .path(self.path.clone())
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(max_age);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

/// Tokens kept client-side in four cookies
///
/// The access token, its type and its expiry (unix seconds) live until the
/// access token expires; the refresh token lives for 30 days.
pub struct CookieTokenStore {
    jar: Arc<dyn CookieJar>,
    options: CookieOptions,
    clock: Arc<dyn Clock>,
}

impl CookieTokenStore {
    /// Store writing through `jar`
    #[must_use]
    pub fn new(jar: Arc<dyn CookieJar>, options: CookieOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            jar,
            options,
            clock,
        }
    }

    fn forget(&self, name: &str) {
        self.jar
            .forget(self.options.build(name, String::new(), CookieDuration::ZERO));
    }
}

#[async_trait]
impl TokenStore for CookieTokenStore {
    async fn load(&self) -> AppResult<Option<TokenSet>> {
        let Some(access_token) = self.jar.get(cookies::ACCESS_TOKEN).filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };

        // A missing or unreadable expiry is treated as already expired.
        let expires_at: DateTime<Utc> = self
            .jar
            .get(cookies::TOKEN_EXPIRES)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| self.clock.now());

        Ok(Some(TokenSet {
            access_token,
            token_type: self
                .jar
                .get(cookies::TOKEN_TYPE)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| oauth::DEFAULT_TOKEN_TYPE.to_owned()),
            expires_at,
            refresh_token: self.jar.get(cookies::REFRESH_TOKEN).filter(|t| !t.is_empty()),
        }))
    }

    async fn load_refresh_token(&self) -> AppResult<Option<String>> {
        Ok(self
            .jar
            .get(cookies::REFRESH_TOKEN)
            .filter(|t| !t.is_empty()))
    }

    async fn store(&self, tokens: &TokenSet) -> AppResult<()> {
        let access_ttl = CookieDuration::seconds(tokens.seconds_until_expiry(self.clock.now()));

        self.jar.queue(self.options.build(
            cookies::ACCESS_TOKEN,
            tokens.access_token.clone(),
            access_ttl,
        ));
        self.jar.queue(self.options.build(
            cookies::TOKEN_TYPE,
            tokens.token_type.clone(),
            access_ttl,
        ));
        self.jar.queue(self.options.build(
            cookies::TOKEN_EXPIRES,
            tokens.expires_at.timestamp().to_string(),
            access_ttl,
        ));

        match &tokens.refresh_token {
            Some(refresh) => self.jar.queue(self.options.build(
                cookies::REFRESH_TOKEN,
                refresh.clone(),
                CookieDuration::days(time_defaults::REFRESH_COOKIE_TTL_DAYS),
            )),
            None => self.forget(cookies::REFRESH_TOKEN),
        }

        debug!(expires_at = %tokens.expires_at, "Tokens written to cookies");
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        for name in [
            cookies::ACCESS_TOKEN,
            cookies::TOKEN_TYPE,
            cookies::TOKEN_EXPIRES,
            cookies::REFRESH_TOKEN,
        ] {
            self.forget(name);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct JarState {
    incoming: HashMap<String, String>,
    queued: Vec<Cookie<'static>>,
}

/// Cookie jar held in memory for one request
///
/// Seeded with the request's cookies; queued cookies shadow them for later
/// reads in the same request and are rendered as `Set-Cookie` values.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    state: Mutex<JarState>,
}

impl MemoryCookieJar {
    /// Empty jar
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar seeded with incoming `(name, value)` pairs
    #[must_use]
    pub fn with_cookies<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            state: Mutex::new(JarState {
                incoming: pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
                queued: Vec::new(),
            }),
        }
    }

    /// Cookies queued for the response, in order
    #[must_use]
    pub fn queued(&self) -> Vec<Cookie<'static>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued
            .clone()
    }

    /// The last cookie queued under `name`
    #[must_use]
    pub fn queued_cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued
            .iter()
            .rev()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Queued cookies rendered as `Set-Cookie` header values
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.queued().iter().map(ToString::to_string).collect()
    }
}

fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age().is_some_and(|age| age <= CookieDuration::ZERO)
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latest) = state.queued.iter().rev().find(|c| c.name() == name) {
            return (!is_removal(latest)).then(|| latest.value().to_owned());
        }
        state.incoming.get(name).cloned()
    }

    fn queue(&self, cookie: Cookie<'static>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued
            .push(cookie);
    }

    fn forget(&self, mut cookie: Cookie<'static>) {
        cookie.make_removal();
        self.queue(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::Duration;

    fn store_with(
        jar: Arc<MemoryCookieJar>,
        options: CookieOptions,
    ) -> (CookieTokenStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        (CookieTokenStore::new(jar, options, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_cookie_flags_and_lifetimes() {
        let jar = Arc::new(MemoryCookieJar::new());
        let options = CookieOptions {
            domain: Some("example.com".into()),
            ..CookieOptions::default()
        };
        let (store, clock) = store_with(jar.clone(), options);
        let tokens = TokenSet::from_response(
            "access".into(),
            None,
            Some(900),
            Some("refresh".into()),
            clock.now(),
        );

        store.store(&tokens).await.unwrap();

        let access = jar.queued_cookie(cookies::ACCESS_TOKEN).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.domain(), Some("example.com"));
        assert_eq!(access.max_age(), Some(CookieDuration::seconds(900)));

        let expires = jar.queued_cookie(cookies::TOKEN_EXPIRES).unwrap();
        assert_eq!(expires.value(), tokens.expires_at.timestamp().to_string());

        let refresh = jar.queued_cookie(cookies::REFRESH_TOKEN).unwrap();
        assert_eq!(refresh.max_age(), Some(CookieDuration::days(30)));
        assert_eq!(refresh.http_only(), Some(true));
    }

    #[tokio::test]
    async fn test_load_reads_back_queued_values() {
        let jar = Arc::new(MemoryCookieJar::new());
        let (store, clock) = store_with(jar, CookieOptions::default());
        let tokens = TokenSet::from_response(
            "access".into(),
            Some("Bearer".into()),
            Some(600),
            Some("refresh".into()),
            clock.now(),
        );

        store.store(&tokens).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(tokens));
    }

    #[tokio::test]
    async fn test_refresh_token_survives_expired_access_cookie() {
        let jar = Arc::new(MemoryCookieJar::with_cookies([(
            cookies::REFRESH_TOKEN,
            "refresh-only",
        )]));
        let (store, _) = store_with(jar, CookieOptions::default());

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(
            store.load_refresh_token().await.unwrap().as_deref(),
            Some("refresh-only")
        );
    }

    #[tokio::test]
    async fn test_missing_expiry_cookie_counts_as_expired() {
        let jar = Arc::new(MemoryCookieJar::with_cookies([(cookies::ACCESS_TOKEN, "a")]));
        let (store, clock) = store_with(jar, CookieOptions::default());

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.is_expired(clock.now()));
        assert_eq!(loaded.token_type, "Bearer");

        clock.advance(Duration::seconds(1));
        assert!(loaded.is_expired(clock.now()));
    }

    #[tokio::test]
    async fn test_clear_queues_removals() {
        let jar = Arc::new(MemoryCookieJar::with_cookies([
            (cookies::ACCESS_TOKEN, "a"),
            (cookies::REFRESH_TOKEN, "r"),
        ]));
        let (store, _) = store_with(jar.clone(), CookieOptions::default());

        store.clear().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(jar.get(cookies::REFRESH_TOKEN).is_none());
        assert_eq!(jar.queued().len(), 4);
        assert!(jar
            .set_cookie_headers()
            .iter()
            .all(|h| h.contains("Max-Age=0")));
    }

    #[test]
    fn test_same_site_none_and_insecure_options() {
        let options = CookieOptions {
            secure: false,
            same_site: SameSite::Strict,
            ..CookieOptions::default()
        };
        let cookie = options.build("n", "v".into(), CookieDuration::minutes(1));
        let rendered = cookie.to_string();
        assert!(rendered.contains("SameSite=Strict"));
        assert!(rendered.contains("HttpOnly"));
        assert!(!rendered.contains("Secure"));
    }
}
