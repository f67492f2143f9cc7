//! Integration tests for the HTTP API.
//!
//! These tests drive the router in-process and verify:
//! - Session issue, stake submission and high-stakes queries end to end
//! - Status codes and plain-text bodies for bad input and bad sessions
//! - Expired sessions are refused and replaced
//! - Health endpoint counters

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use tower::ServiceExt;

use stake_book::{LockingStrategy, build_registry};
use stake_server::api::create_router;
use stake_server::session::{SessionStore, SimulatedClock};
use stake_server::state::{AppState, StakeLimits};

fn clocked_state(
    capacity: usize,
    top_limit: usize,
    locking: LockingStrategy,
) -> (Arc<AppState>, SimulatedClock) {
    let (sessions, clock) = SessionStore::simulated(
        Duration::seconds(60),
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    );
    let limits = StakeLimits {
        capacity: NonZeroUsize::new(capacity).unwrap(),
        top_limit,
    };
    let state = AppState::new(build_registry(locking), Arc::new(sessions), limits);
    (Arc::new(state), clock)
}

fn test_state(capacity: usize, top_limit: usize, locking: LockingStrategy) -> Arc<AppState> {
    clocked_state(capacity, top_limit, locking).0
}

async fn send(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn session(router: &Router, customer: u32) -> String {
    let (status, key) = send(router, Method::GET, &format!("/{customer}/session"), "").await;
    assert_eq!(status, StatusCode::OK);
    key
}

async fn stake(router: &Router, market: u32, key: &str, amount: &str) -> StatusCode {
    let uri = format!("/{market}/stake?sessionkey={key}");
    send(router, Method::POST, &uri, amount).await.0
}

async fn high_stakes(router: &Router, market: u32) -> String {
    let (status, body) = send(router, Method::GET, &format!("/{market}/highstakes"), "").await;
    assert_eq!(status, StatusCode::OK);
    body
}

// =============================================================================
// SESSIONS
// =============================================================================

#[tokio::test]
async fn test_session_key_shape() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let key = session(&router, 1234).await;

    assert_eq!(key.len(), 20);
    assert!(key.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
}

#[tokio::test]
async fn test_session_key_stable_while_live() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let first = session(&router, 7).await;
    let second = session(&router, 7).await;
    let other = session(&router, 8).await;

    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[tokio::test]
async fn test_session_bad_customer_id() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));

    for uri in ["/abc/session", "/-1/session", "/99999999999/session"] {
        let (status, _) = send(&router, Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

// =============================================================================
// STAKES AND QUERIES
// =============================================================================

#[tokio::test]
async fn test_full_flow() {
    let router = create_router(test_state(5, 20, LockingStrategy::Sharded));

    for (customer, amount) in [(1, 10), (2, 5), (3, 15), (4, 2), (5, 8)] {
        let key = session(&router, customer).await;
        assert_eq!(
            stake(&router, 888, &key, &amount.to_string()).await,
            StatusCode::NO_CONTENT
        );
    }
    assert_eq!(high_stakes(&router, 888).await, "3=15,1=10,5=8,2=5,4=2");

    let key = session(&router, 6).await;
    stake(&router, 888, &key, "20").await;
    assert_eq!(high_stakes(&router, 888).await, "6=20,3=15,1=10,5=8,2=5");

    // Below the minimum of a full board: accepted, but nothing changes.
    let key = session(&router, 7).await;
    assert_eq!(stake(&router, 888, &key, "1").await, StatusCode::NO_CONTENT);
    assert_eq!(high_stakes(&router, 888).await, "6=20,3=15,1=10,5=8,2=5");

    let key = session(&router, 9).await;
    stake(&router, 888, &key, "18").await;
    assert_eq!(high_stakes(&router, 888).await, "6=20,9=18,3=15,1=10,5=8");
    stake(&router, 888, &key, "35").await;
    assert_eq!(high_stakes(&router, 888).await, "9=35,6=20,3=15,1=10,5=8");
}

#[tokio::test]
async fn test_lower_stake_keeps_best() {
    let router = create_router(test_state(20, 20, LockingStrategy::Coarse));
    let key = session(&router, 1).await;

    stake(&router, 10, &key, "500").await;
    stake(&router, 10, &key, "100").await;
    stake(&router, 10, &key, "500").await;

    assert_eq!(high_stakes(&router, 10).await, "1=500");
}

#[tokio::test]
async fn test_equal_stake_newest_first() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let a = session(&router, 1).await;
    let b = session(&router, 2).await;

    stake(&router, 3, &a, "100").await;
    stake(&router, 3, &b, "100").await;

    assert_eq!(high_stakes(&router, 3).await, "2=100,1=100");
}

#[tokio::test]
async fn test_query_limit() {
    let router = create_router(test_state(10, 3, LockingStrategy::Sharded));

    for customer in 1..=6u32 {
        let key = session(&router, customer).await;
        stake(&router, 1, &key, &(customer * 100).to_string()).await;
    }

    assert_eq!(high_stakes(&router, 1).await, "6=600,5=500,4=400");
}

#[tokio::test]
async fn test_markets_are_independent() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let key = session(&router, 1).await;

    stake(&router, 100, &key, "10").await;
    stake(&router, 200, &key, "20").await;

    assert_eq!(high_stakes(&router, 100).await, "1=10");
    assert_eq!(high_stakes(&router, 200).await, "1=20");
}

#[tokio::test]
async fn test_unknown_market_empty_body() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    assert_eq!(high_stakes(&router, 404).await, "");
}

#[tokio::test]
async fn test_legacy_session_param() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let key = session(&router, 5).await;

    let (status, _) = send(&router, Method::POST, &format!("/1/stake?session={key}"), "42").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(high_stakes(&router, 1).await, "5=42");
}

// =============================================================================
// ERRORS
// =============================================================================

#[tokio::test]
async fn test_stake_without_session_key() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));

    let (status, body) = send(&router, Method::POST, "/1/stake", "100").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Session key required");

    for uri in ["/1/stake?sessionkey=", "/1/stake?session="] {
        let (status, body) = send(&router, Method::POST, uri, "100").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body, "Session key required");
    }
}

#[tokio::test]
async fn test_stake_with_unknown_session_key() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));

    let (status, body) = send(
        &router,
        Method::POST,
        "/1/stake?sessionkey=aaaaaaaaaaaaaaaaaaaa",
        "100",
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Invalid session key");
    assert_eq!(high_stakes(&router, 1).await, "");
}

#[tokio::test]
async fn test_stake_bad_input() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let key = session(&router, 1).await;

    for amount in ["", "abc", "-5", "1.5", "+7"] {
        assert_eq!(
            stake(&router, 1, &key, amount).await,
            StatusCode::BAD_REQUEST,
            "{amount:?}"
        );
    }

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/xyz/stake?sessionkey={key}"),
        "100",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, Method::GET, "/xyz/highstakes", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(high_stakes(&router, 1).await, "");
}

#[tokio::test]
async fn test_stake_body_whitespace_trimmed() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));
    let key = session(&router, 1).await;

    assert_eq!(stake(&router, 1, &key, "250\n").await, StatusCode::NO_CONTENT);
    assert_eq!(high_stakes(&router, 1).await, "1=250");
}

#[tokio::test]
async fn test_unknown_route() {
    let router = create_router(test_state(20, 20, LockingStrategy::Sharded));

    for uri in ["/", "/1/unknown", "/1/session/extra"] {
        let (status, body) = send(&router, Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, "Not Found");
    }
}

// =============================================================================
// EXPIRY
// =============================================================================

#[tokio::test]
async fn test_expired_session_refused_then_replaced() {
    let (state, clock) = clocked_state(20, 20, LockingStrategy::Sharded);
    let router = create_router(Arc::clone(&state));

    let old = session(&router, 42).await;
    assert_eq!(stake(&router, 1, &old, "10").await, StatusCode::NO_CONTENT);

    clock.advance(Duration::seconds(61));
    assert_eq!(stake(&router, 1, &old, "20").await, StatusCode::UNAUTHORIZED);

    let new = session(&router, 42).await;
    assert_ne!(new, old);
    assert_eq!(stake(&router, 1, &new, "20").await, StatusCode::NO_CONTENT);
    assert_eq!(stake(&router, 1, &old, "30").await, StatusCode::UNAUTHORIZED);

    assert_eq!(high_stakes(&router, 1).await, "42=20");
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_health_counters() {
    let router = create_router(test_state(20, 20, LockingStrategy::Coarse));
    let key = session(&router, 1).await;
    stake(&router, 1, &key, "10").await;
    stake(&router, 2, &key, "10").await;
    high_stakes(&router, 1).await;

    let (status, body) = send(&router, Method::GET, "/health", "").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["markets"], 2);
    assert_eq!(json["sessions"], 1);
    assert_eq!(json["locking"], "coarse");
    assert_eq!(json["metrics"]["stakes_submitted"], 2);
    assert_eq!(json["metrics"]["queries_served"], 1);
    assert_eq!(json["session_stats"]["issued"], 1);
}
