//! HTTP endpoints.
//!
//! Plain-text API over the shared [`AppState`]:
//! - `GET /{customer_id}/session` - Session key for a customer
//! - `POST /{market_id}/stake?sessionkey=K` - Submit the stake in the body
//! - `GET /{market_id}/highstakes` - Top stakes as `c=s,c=s,...`
//! - `GET /health` - JSON counters

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use stake_common::{CustomerId, MarketId, ParseError, SessionKey, format_stakes, parse_stake};

use crate::state::AppState;

// ============================================================================
// Errors
// ============================================================================

/// Request failures, rendered as plain-text bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(#[from] ParseError),

    #[error("Session key required")]
    MissingSessionKey,

    #[error("Invalid session key")]
    InvalidSessionKey,

    #[error("Not Found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingSessionKey | Self::InvalidSessionKey => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Query parameters of a stake submission.
#[derive(Debug, Default, Deserialize)]
pub struct StakeParams {
    pub sessionkey: Option<String>,
    /// Older clients send the key under this name.
    pub session: Option<String>,
}

impl StakeParams {
    fn session_key(&self) -> Result<SessionKey, ApiError> {
        let raw = self
            .sessionkey
            .as_deref()
            .or(self.session.as_deref())
            .ok_or(ApiError::MissingSessionKey)?;
        SessionKey::parse(raw).map_err(|_| ApiError::MissingSessionKey)
    }
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(customer): Path<String>,
) -> Result<String, ApiError> {
    let customer: CustomerId = customer.parse()?;
    let record = state.session_for(customer);
    Ok(record.key.to_string())
}

async fn post_stake(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
    Query(params): Query<StakeParams>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let market: MarketId = market.parse()?;
    let key = params.session_key()?;
    let Some(customer) = state.authenticate(&key) else {
        warn!(market = %market, "Stake rejected: unknown or expired session key");
        return Err(ApiError::InvalidSessionKey);
    };
    let stake = parse_stake(&body)?;

    state.submit_stake(market, customer, stake);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_high_stakes(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
) -> Result<String, ApiError> {
    let market: MarketId = market.parse()?;
    let body = match state.high_stakes(market) {
        Some(entries) => format_stakes(&entries),
        None => {
            debug!(market = %market, "High stakes requested for unknown market");
            String::new()
        }
    };
    Ok(body)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "markets": state.registry.market_count(),
        "sessions": state.sessions.len(),
        "locking": state.registry.locking().to_string(),
        "metrics": state.metrics.snapshot(),
        "session_stats": state.sessions.stats(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

// ============================================================================
// Router
// ============================================================================

/// Create the router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/{id}/session", get(get_session))
        .route("/{id}/stake", post(post_stake))
        .route("/{id}/highstakes", get(get_high_stakes))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server started");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
