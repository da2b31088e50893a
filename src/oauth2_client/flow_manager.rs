// ABOUTME: Coordinates the authorization-code flow against the identity server for one session
// ABOUTME: Handles redirects, callbacks, token refresh, the cached user, logout, and auth events
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::callback::{validate_callback, CallbackOutcome, CallbackQuery};
use super::client::OAuth2Client;
use super::pkce::build_authorization_url;
use crate::config::VAuthConfig;
use crate::constants::{events, session_keys};
use crate::errors::OAuthFlowError;
use crate::logging::AppLogger;
use crate::models::{AuthenticatedUser, ProcessedFlow, TokenSet, TokenStatus};
use crate::session::{FlowStore, SessionStore, SessionStoreExt};
use crate::token_store::{TokenLookup, TokenStore};
use crate::utils::clock::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Notifications emitted by the flow manager
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A callback completed and the user is known
    LoggedIn {
        /// The user who logged in
        user: AuthenticatedUser,
    },
    /// Tokens were refreshed on read
    TokenRefreshed {
        /// Cached user id, if any
        user_id: Option<String>,
    },
    /// The session logged out
    LoggedOut {
        /// Cached user id at logout, if any
        user_id: Option<String>,
    },
}

/// What a successful callback produced
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    /// Tokens now held by the token store
    pub tokens: TokenSet,
    /// User info, absent if the lookup failed after tokens were stored
    pub user: Option<AuthenticatedUser>,
    /// Whether this callback was a replay answered from the processed cache
    pub duplicate: bool,
}

/// Tokens and user from [`OAuthFlowManager::authenticate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Authentication {
    /// Issued tokens
    pub tokens: TokenSet,
    /// The authenticated user
    pub user: AuthenticatedUser,
}

/// Manages the authorization flow for the configured identity server
///
/// Holds no per-user state: every operation receives the caller's session and
/// token store.
pub struct OAuthFlowManager {
    config: Arc<VAuthConfig>,
    client: OAuth2Client,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<AuthEvent>,
}

impl OAuthFlowManager {
    /// Manager using the system clock and a client built from `config`
    #[must_use]
    pub fn new(config: VAuthConfig) -> Self {
        let client = OAuth2Client::from_config(&config);
        Self::with_parts(config, client, Arc::new(SystemClock))
    }

    /// Manager with an explicit client and clock
    #[must_use]
    pub fn with_parts(config: VAuthConfig, client: OAuth2Client, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(events::CHANNEL_CAPACITY);
        Self {
            config: Arc::new(config),
            client,
            clock,
            events,
        }
    }

    /// Loaded configuration
    #[must_use]
    pub fn config(&self) -> &VAuthConfig {
        &self.config
    }

    /// Identity server client
    #[must_use]
    pub const fn client(&self) -> &OAuth2Client {
        &self.client
    }

    /// Time source
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Subscribe to [`AuthEvent`]s
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn flows<'a>(&self, session: &'a dyn SessionStore) -> FlowStore<'a> {
        FlowStore::new(session, self.config.options.processed_flow_ttl_seconds)
    }

    /// Start a login: persist a new pending flow and return the authorization URL
    ///
    /// The session id is regenerated first. The pending flow is saved and read
    /// back before the URL is returned, so the callback can never arrive
    /// before the flow is visible.
    ///
    /// # Errors
    ///
    /// Returns `SessionStorage` if the flow cannot be saved or verified
    pub async fn redirect_url(&self, session: &dyn SessionStore) -> Result<Url, OAuthFlowError> {
        session.regenerate().await?;

        let (url, flow) = build_authorization_url(
            &self.config.server_url,
            &self.config.credentials,
            self.config.options.use_pkce,
            self.clock.now(),
        )?;

        let flows = self.flows(session);
        flows.save_pending(&flow).await?;
        session.save().await?;

        let stored = flows.pending_for_state(&flow.state).await?;
        if stored.as_ref() != Some(&flow) {
            AppLogger::log_oauth_event(&flow.state, "pending_flow_verification", false);
            return Err(OAuthFlowError::SessionStorage(
                "pending flow was not readable after save".to_owned(),
            ));
        }

        AppLogger::log_oauth_event(&flow.state, "authorization_redirect", true);
        Ok(url)
    }

    /// Complete a login from the identity server's callback
    ///
    /// A replayed callback whose state already completed returns the cached
    /// tokens without a network call. Otherwise the code is exchanged, the
    /// processed record is written before the pending flow is cleared, and
    /// tokens are stored. A user-info failure after that point is logged and
    /// leaves `user` empty.
    ///
    /// # Errors
    ///
    /// Returns the validation, exchange, or storage failure
    pub async fn handle_callback(
        &self,
        session: &dyn SessionStore,
        tokens: &dyn TokenStore,
        query: &CallbackQuery,
    ) -> Result<CallbackResult, OAuthFlowError> {
        let now = self.clock.now();
        let flows = self.flows(session);

        let pending = flows.pending().await?;
        let processed = match query.state.as_deref() {
            Some(state) if !state.is_empty() => flows.processed(state, now).await,
            _ => None,
        };

        let callback = match validate_callback(
            query,
            pending.as_ref(),
            processed.as_ref(),
            self.config.options.use_pkce,
        )? {
            CallbackOutcome::Duplicate(cached) => {
                let user = session
                    .get_json::<AuthenticatedUser>(session_keys::USER)
                    .await
                    .unwrap_or_default();
                return Ok(CallbackResult {
                    tokens: cached,
                    user,
                    duplicate: true,
                });
            }
            CallbackOutcome::Valid(callback) => callback,
        };

        let issued = match self
            .client
            .exchange_code(
                &self.config.credentials,
                &callback.code,
                callback.code_verifier.as_deref(),
                now,
            )
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                AppLogger::log_oauth_event(&callback.state, "code_exchange", false);
                flows.clear_pending(now).await;
                session.save().await?;
                return Err(e);
            }
        };

        flows
            .record_processed(&ProcessedFlow {
                state: callback.state.clone(),
                result: issued.clone(),
                processed_at: now,
            })
            .await?;
        flows.clear_pending(now).await;
        session.save().await?;

        tokens.store(&issued).await?;
        AppLogger::log_oauth_event(&callback.state, "code_exchange", true);

        let user = match self.client.fetch_user_info(&issued.access_token).await {
            Ok(user) => {
                session.put_json(session_keys::USER, &user).await?;
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "User info unavailable after login; tokens kept");
                None
            }
        };
        session.save().await?;

        if let Some(user) = &user {
            AppLogger::log_auth_event(&user.id, "login", true, None);
            self.emit(AuthEvent::LoggedIn { user: user.clone() });
        }

        Ok(CallbackResult {
            tokens: issued,
            user,
            duplicate: false,
        })
    }

    /// Access token for outbound calls, refreshing once if it is about to expire
    ///
    /// After a refresh the cached user is re-fetched.
    pub async fn get_valid_token(
        &self,
        session: &dyn SessionStore,
        tokens: &dyn TokenStore,
    ) -> Option<String> {
        let lookup = tokens
            .get_valid_token(
                &self.client,
                &self.config.credentials,
                self.config.options.refresh_threshold_seconds,
                self.clock.now(),
            )
            .await;

        if let TokenLookup::Refreshed(refreshed) = &lookup {
            let user_id = match self.client.fetch_user_info(&refreshed.access_token).await {
                Ok(user) => {
                    let id = user.id.clone();
                    if let Err(e) = session.put_json(session_keys::USER, &user).await {
                        warn!(error = %e, "Failed to cache refreshed user info");
                    }
                    Some(id)
                }
                Err(e) => {
                    warn!(error = %e, "User info re-fetch after refresh failed");
                    None
                }
            };
            if let Err(e) = session.save().await {
                warn!(error = %e, "Failed to save session after token refresh");
            }
            self.emit(AuthEvent::TokenRefreshed { user_id });
        }

        lookup.into_access_token()
    }

    /// The logged-in user, fetched and cached if not cached yet
    ///
    /// `Ok(None)` means nobody is logged in (no usable token).
    ///
    /// # Errors
    ///
    /// Returns the user-info failure when a token exists but the lookup fails
    pub async fn get_current_user(
        &self,
        session: &dyn SessionStore,
        tokens: &dyn TokenStore,
    ) -> Result<Option<AuthenticatedUser>, OAuthFlowError> {
        let Some(access_token) = self.get_valid_token(session, tokens).await else {
            session.forget(session_keys::USER).await;
            return Ok(None);
        };

        match session
            .get_json::<AuthenticatedUser>(session_keys::USER)
            .await
        {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Discarding unreadable cached user"),
        }

        let user = self.client.fetch_user_info(&access_token).await?;
        session.put_json(session_keys::USER, &user).await?;
        session.save().await?;
        Ok(Some(user))
    }

    /// Log out: revoke best-effort, then clear tokens, cached user and flow markers
    ///
    /// # Errors
    ///
    /// Returns `SessionStorage` if the session cannot be saved
    pub async fn logout(
        &self,
        session: &dyn SessionStore,
        tokens: &dyn TokenStore,
    ) -> Result<(), OAuthFlowError> {
        let user_id = session
            .get_json::<AuthenticatedUser>(session_keys::USER)
            .await
            .ok()
            .flatten()
            .map(|user| user.id);

        if let Ok(Some(stored)) = tokens.load().await {
            if let Err(e) = self
                .client
                .revoke_token(&self.config.credentials, &stored.access_token)
                .await
            {
                warn!(error = %e, "Token revocation failed during logout");
            }
        }

        if let Err(e) = tokens.clear().await {
            warn!(error = %e, "Failed to clear stored tokens during logout");
        }
        session.forget(session_keys::USER).await;
        session.forget(session_keys::INTENDED_URL).await;
        self.flows(session).clear_pending(self.clock.now()).await;
        session.save().await?;

        AppLogger::log_auth_event(user_id.as_deref().unwrap_or("unknown"), "logout", true, None);
        info!("User logged out");
        self.emit(AuthEvent::LoggedOut { user_id });
        Ok(())
    }

    /// Exchange a code and look up the user, failing if either step fails
    ///
    /// Stateless: nothing is written to a session or token store.
    ///
    /// # Errors
    ///
    /// Returns the exchange failure or the user-info failure
    pub async fn authenticate(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Authentication, OAuthFlowError> {
        if code.is_empty() {
            return Err(OAuthFlowError::MissingCode);
        }
        let tokens = self
            .client
            .exchange_code(&self.config.credentials, code, code_verifier, self.clock.now())
            .await?;
        let user = self.client.fetch_user_info(&tokens.access_token).await?;
        AppLogger::log_auth_event(&user.id, "authenticate", true, None);
        Ok(Authentication { tokens, user })
    }

    /// Refresh unconditionally with the stored refresh token
    ///
    /// # Errors
    ///
    /// Returns `RefreshFailed` if there is no refresh token or the grant fails
    pub async fn refresh(&self, tokens: &dyn TokenStore) -> Result<TokenSet, OAuthFlowError> {
        let refresh_token = tokens
            .load_refresh_token()
            .await?
            .ok_or_else(|| OAuthFlowError::RefreshFailed("no refresh token stored".to_owned()))?;
        let refreshed = self
            .client
            .refresh(&self.config.credentials, &refresh_token, self.clock.now())
            .await?;
        tokens.store(&refreshed).await?;
        Ok(refreshed)
    }

    /// Diagnostic snapshot of the stored tokens
    ///
    /// # Errors
    ///
    /// Returns `SessionStorage` if the token store cannot be read
    pub async fn token_status(&self, tokens: &dyn TokenStore) -> Result<TokenStatus, OAuthFlowError> {
        let stored = tokens.load().await?;
        Ok(TokenStatus::from_tokens(
            stored.as_ref(),
            self.clock.now(),
            self.config.options.refresh_threshold_seconds,
        ))
    }
}
