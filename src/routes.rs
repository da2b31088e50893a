// ABOUTME: Axum routes and middleware that expose the identity server login flow over HTTP
// ABOUTME: Provides redirect, callback, logout, user and status endpoints plus a require_auth layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # HTTP Integration
//!
//! Each request opens its session from the `vauth_session` cookie, builds a
//! per-request cookie jar and token store, runs the handler, then commits the
//! session and appends every queued `Set-Cookie` header to the response.
//! A fresh session that nothing was written to is dropped without a cookie.

use crate::config::VAuthConfig;
use crate::constants::{cookies, session_keys};
use crate::errors::AppError;
use crate::models::AuthenticatedUser;
use crate::oauth2_client::{CallbackQuery, OAuthFlowManager};
use crate::session::{MemorySession, SessionRegistry, SessionStore, SessionStoreExt};
use crate::token_store::{select_token_store, CookieOptions, MemoryCookieJar, TokenStore};
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use cookie::time::Duration as CookieDuration;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state of the auth routes
#[derive(Clone)]
pub struct AuthState {
    /// Flow coordinator
    pub manager: Arc<OAuthFlowManager>,
    /// Server-side sessions
    pub sessions: Arc<SessionRegistry>,
    /// Attributes for the session and token cookies
    pub cookie_options: CookieOptions,
}

impl AuthState {
    /// State for `config` with the system clock
    #[must_use]
    pub fn new(config: VAuthConfig) -> Self {
        Self::from_manager(Arc::new(OAuthFlowManager::new(config)))
    }

    /// State around an existing manager
    #[must_use]
    pub fn from_manager(manager: Arc<OAuthFlowManager>) -> Self {
        let config = manager.config();
        let sessions = Arc::new(SessionRegistry::new(
            config.options.session_lifetime_minutes,
            manager.clock(),
        ));
        let cookie_options = CookieOptions::from_config(config);
        Self {
            manager,
            sessions,
            cookie_options,
        }
    }
}

/// The authenticated user, inserted by [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedUser);

struct RequestContext {
    session_id: Option<String>,
    session: Arc<MemorySession>,
    is_new: bool,
    jar: Arc<MemoryCookieJar>,
    tokens: Arc<dyn TokenStore>,
}

impl RequestContext {
    fn open(state: &AuthState, incoming: &CookieJar) -> Self {
        let session_id = incoming
            .get(cookies::SESSION)
            .map(|c| c.value().to_owned());
        let existing = session_id.as_deref().and_then(|id| state.sessions.get(id));
        let is_new = existing.is_none();
        let session = existing.unwrap_or_else(|| Arc::new(MemorySession::new()));
        let jar = Arc::new(MemoryCookieJar::with_cookies(
            incoming
                .iter()
                .map(|c| (c.name().to_owned(), c.value().to_owned())),
        ));
        let tokens = select_token_store(
            &state.manager.config().options,
            session.clone(),
            jar.clone(),
            state.cookie_options.clone(),
            state.manager.clock(),
        );
        Self {
            session_id,
            session,
            is_new,
            jar,
            tokens,
        }
    }

    fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    /// Post-login destination recorded by [`require_auth`], consumed once
    async fn take_intended_url(&self, fallback: &str) -> String {
        let intended = self
            .session()
            .get_json::<String>(session_keys::INTENDED_URL)
            .await
            .ok()
            .flatten();
        self.session().forget(session_keys::INTENDED_URL).await;
        intended.unwrap_or_else(|| fallback.to_owned())
    }

    async fn finish(self, state: &AuthState, mut response: Response) -> Response {
        let session_cookie = if self.is_new && self.session.keys().await.is_empty() {
            None
        } else {
            let id = state
                .sessions
                .commit(self.session_id.as_deref(), &self.session)
                .await;
            let lifetime = state.manager.config().options.session_lifetime_minutes;
            Some(
                state
                    .cookie_options
                    .build(cookies::SESSION, id, CookieDuration::minutes(lifetime))
                    .to_string(),
            )
        };

        let headers = response.headers_mut();
        for value in session_cookie.into_iter().chain(self.jar.set_cookie_headers()) {
            match HeaderValue::from_str(&value) {
                Ok(header_value) => {
                    headers.append(header::SET_COOKIE, header_value);
                }
                Err(e) => warn!(error = %e, "Dropping unrepresentable Set-Cookie header"),
            }
        }
        response
    }
}

fn with_query(base: &str, key: &str, value: &str) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{encoded}")
}

/// Auth routes implementation
pub struct AuthRoutes;

impl AuthRoutes {
    /// Router with the auth routes mounted under the configured prefix
    pub fn routes(state: AuthState) -> Router {
        let prefix = state.manager.config().routes.prefix.clone();
        let auth = Router::new()
            .route("/redirect", get(Self::handle_redirect))
            .route("/callback", get(Self::handle_callback))
            .route("/logout", get(Self::handle_logout).post(Self::handle_logout))
            .route("/user", get(Self::handle_user))
            .route("/status", get(Self::handle_status));

        let router = if prefix.is_empty() || prefix == "/" {
            auth
        } else {
            Router::new().nest(&prefix, auth)
        };
        router.with_state(state)
    }

    async fn handle_redirect(
        State(state): State<AuthState>,
        incoming: CookieJar,
    ) -> Result<Response, AppError> {
        let ctx = RequestContext::open(&state, &incoming);
        let url = state.manager.redirect_url(ctx.session()).await?;
        let response = Redirect::to(url.as_str()).into_response();
        Ok(ctx.finish(&state, response).await)
    }

    async fn handle_callback(
        State(state): State<AuthState>,
        incoming: CookieJar,
        Query(query): Query<CallbackQuery>,
    ) -> Response {
        let ctx = RequestContext::open(&state, &incoming);
        let routes = &state.manager.config().routes;

        let target = match state
            .manager
            .handle_callback(ctx.session(), ctx.tokens.as_ref(), &query)
            .await
        {
            Ok(result) => {
                info!(duplicate = result.duplicate, "Login callback completed");
                ctx.take_intended_url(&routes.default_redirect).await
            }
            Err(e) if e.is_informational() => {
                info!(reason = %e, "Ignoring stale login callback");
                ctx.take_intended_url(&routes.default_redirect).await
            }
            Err(e) => {
                warn!(error = %e, "Login callback failed");
                with_query(&routes.login_url, "error", &e.user_message())
            }
        };

        let response = Redirect::to(&target).into_response();
        ctx.finish(&state, response).await
    }

    async fn handle_logout(
        State(state): State<AuthState>,
        incoming: CookieJar,
    ) -> Result<Response, AppError> {
        let ctx = RequestContext::open(&state, &incoming);
        state
            .manager
            .logout(ctx.session(), ctx.tokens.as_ref())
            .await?;
        ctx.session.regenerate().await?;

        let target = state.manager.config().routes.logout_redirect.clone();
        let response = Redirect::to(&target).into_response();
        Ok(ctx.finish(&state, response).await)
    }

    async fn handle_user(
        State(state): State<AuthState>,
        incoming: CookieJar,
    ) -> Result<Response, AppError> {
        let ctx = RequestContext::open(&state, &incoming);
        let user = state
            .manager
            .get_current_user(ctx.session(), ctx.tokens.as_ref())
            .await?
            .ok_or_else(AppError::auth_required)?;
        let response = Json(user).into_response();
        Ok(ctx.finish(&state, response).await)
    }

    async fn handle_status(
        State(state): State<AuthState>,
        incoming: CookieJar,
    ) -> Result<Response, AppError> {
        let ctx = RequestContext::open(&state, &incoming);
        let status = state.manager.token_status(ctx.tokens.as_ref()).await?;
        let response = Json(status).into_response();
        Ok(ctx.finish(&state, response).await)
    }
}

/// Require a logged-in user
///
/// Inserts [`CurrentUser`] into the request extensions. Anonymous requests
/// remember their URL as the post-login destination and are redirected to the
/// login URL. If a token exists but the user lookup fails, tokens are cleared
/// first.
///
/// ```rust,no_run
/// use axum::{middleware, routing::get, Router};
/// use vauth_client::routes::{require_auth, AuthState};
///
/// # async fn dashboard() -> &'static str { "" }
/// # fn example(state: AuthState) -> Router {
/// Router::new()
///     .route("/dashboard", get(dashboard))
///     .layer(middleware::from_fn_with_state(state, require_auth))
/// # }
/// ```
pub async fn require_auth(
    State(state): State<AuthState>,
    incoming: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::open(&state, &incoming);
    let login_url = state.manager.config().routes.login_url.clone();

    let response = match state
        .manager
        .get_current_user(ctx.session(), ctx.tokens.as_ref())
        .await
    {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => {
            let intended = req.uri().to_string();
            if let Err(e) = ctx
                .session()
                .put_json(session_keys::INTENDED_URL, &intended)
                .await
            {
                warn!(error = %e, "Failed to remember intended URL");
            }
            Redirect::to(&login_url).into_response()
        }
        Err(e) => {
            warn!(error = %e, "User lookup failed, clearing tokens");
            if let Err(clear_error) = ctx.tokens.clear().await {
                warn!(error = %clear_error, "Failed to clear tokens");
            }
            ctx.session().forget(session_keys::USER).await;
            Redirect::to(&with_query(&login_url, "error", &e.user_message())).into_response()
        }
    };

    ctx.finish(&state, response).await
}
