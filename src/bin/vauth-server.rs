// ABOUTME: Demo web server wiring the identity server login routes into an axum application
// ABOUTME: Serves the auth routes, a protected dashboard, and health endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # vauth demo server
//!
//! Loads `VAUTH_*` configuration from the environment, mounts the auth routes
//! and protects `/dashboard` with `require_auth`.

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Extension, Json, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use vauth_client::{
    config::VAuthConfig,
    constants::time,
    logging,
    oauth2_client::AuthEvent,
    routes::{require_auth, AuthRoutes, AuthState, CurrentUser},
};

#[derive(Parser)]
#[command(name = "vauth-server")]
#[command(about = "Demo application that signs users in against a vauth identity server")]
pub struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

async fn dashboard(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": format!("Welcome, {}", user.name),
        "user": user,
    }))
}

fn health_routes() -> Router {
    async fn health_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    Router::new().route("/health", get(health_handler))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_from_env()?;

    let config = VAuthConfig::from_env().context("loading VAUTH_* configuration")?;
    info!(
        server = %config.server_url,
        client_id = %config.credentials.redacted_client_id(),
        pkce = config.options.use_pkce,
        external_token_store = config.options.use_external_token_store,
        "Configuration loaded"
    );

    let state = AuthState::new(config);
    let mut events = state.manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::LoggedIn { user }) => info!(user_id = %user.id, "User logged in"),
                Ok(AuthEvent::TokenRefreshed { user_id }) => {
                    info!(user_id = ?user_id, "Access token refreshed");
                }
                Ok(AuthEvent::LoggedOut { user_id }) => {
                    info!(user_id = ?user_id, "User logged out");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Auth event logger fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(time::SESSION_PRUNE_INTERVAL_SECONDS));
        loop {
            ticker.tick().await;
            let removed = sessions.prune_expired();
            if removed > 0 {
                debug!(removed, remaining = sessions.len(), "Pruned idle sessions");
            }
        }
    });

    let protected = Router::new()
        .route("/dashboard", get(dashboard))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .merge(AuthRoutes::routes(state))
        .merge(protected)
        .merge(health_routes())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "vauth demo server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
