//! Web server adapter.
//!
//! Axum router with an HTMX-driven frontend for logging trades against the
//! trader's risk rules.

mod auth;
mod error;
mod handlers;
mod templates;

pub use auth::{hash_password, Backend, Credentials, User};
pub use error::WebError;

use axum::{
    routing::{get, post},
    Router,
};
use axum_login::{login_required, AuthManagerLayerBuilder};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::Key;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::warn;

use crate::domain::error::SentinelError;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::trade_store::TradeStore;

const DEFAULT_SESSION_LIFETIME_SECS: i64 = 86_400;

pub struct AppState {
    pub store: Arc<dyn TradeStore + Send + Sync>,
    pub market_data: Arc<dyn MarketDataPort>,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
}

/// Signing key from `[auth] session_secret` (at least 64 bytes, hex encoded).
/// Without one a random key is used and sessions do not survive a restart.
fn session_key(config: &dyn ConfigPort) -> Result<Key, SentinelError> {
    let Some(secret) = config
        .get_string("auth", "session_secret")
        .filter(|s| !s.trim().is_empty())
    else {
        warn!("[auth] session_secret not set; using an ephemeral session key");
        return Ok(Key::generate());
    };

    let invalid = |reason: String| SentinelError::ConfigInvalid {
        section: "auth".into(),
        key: "session_secret".into(),
        reason,
    };
    let bytes = hex::decode(secret.trim()).map_err(|e| invalid(e.to_string()))?;
    Key::try_from(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
}

pub fn build_router(state: AppState) -> Result<Router, SentinelError> {
    let key = session_key(state.config.as_ref())?;
    let lifetime = state
        .config
        .get_int("auth", "session_lifetime", DEFAULT_SESSION_LIFETIME_SECS);
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.get_bool("auth", "secure_cookies", false))
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(lifetime)))
        .with_signed(key);
    let auth_layer =
        AuthManagerLayerBuilder::new(Backend::new(state.store.clone()), session_layer).build();

    let protected = Router::new()
        .route("/", get(handlers::dashboard))
        .route(
            "/settings",
            get(handlers::settings_form).post(handlers::save_settings),
        )
        .route("/trades", post(handlers::submit_trade))
        .route("/trades/new", get(handlers::new_trade))
        .route("/trades/gate", post(handlers::submit_gate))
        .route(
            "/trades/{id}/edit",
            get(handlers::edit_trade).post(handlers::update_trade),
        )
        .route("/trades/{id}/close", post(handlers::close_trade))
        .route("/trades/{id}/delete", post(handlers::delete_trade))
        .route("/history", get(handlers::history))
        .route("/violations", get(handlers::violations))
        .route("/lock", post(handlers::lock))
        .route("/market/search", get(handlers::market_search))
        .route("/market/quote", get(handlers::market_quote))
        .route_layer(login_required!(Backend, login_url = "/login"));

    Ok(Router::new()
        .merge(protected)
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/signup", get(handlers::signup_form).post(handlers::signup))
        .route("/logout", post(handlers::logout))
        .nest_service("/static", ServeDir::new("static"))
        .fallback(handlers::not_found)
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state)))
}

fn is_htmx_request(headers: &axum::http::HeaderMap) -> bool {
    headers.get("HX-Request").is_some()
}
