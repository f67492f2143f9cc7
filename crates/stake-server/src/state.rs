//! Shared application state.
//!
//! One `AppState` is built at startup and shared by every request handler and
//! the session sweeper. It exposes the three operations the HTTP layer needs:
//! issue a session, submit a stake, and query the top stakes of a market.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use stake_book::{InsertOutcome, MarketRegistry, build_registry};
use stake_common::{CustomerId, MarketId, SessionKey, StakeEntry};

use crate::config::ServerConfig;
use crate::session::{SessionRecord, SessionStore};

/// Per-market ranking limits.
#[derive(Debug, Clone, Copy)]
pub struct StakeLimits {
    /// Entries kept per market.
    pub capacity: NonZeroUsize,
    /// Entries returned by a query.
    pub top_limit: usize,
}

/// Global shared state for the server.
pub struct AppState {
    /// Leaderboards by market.
    pub registry: Arc<dyn MarketRegistry>,

    /// Customer sessions.
    pub sessions: Arc<SessionStore>,

    /// Ranking limits.
    pub limits: StakeLimits,

    /// Request counters.
    pub metrics: MetricsCounters,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn MarketRegistry>,
        sessions: Arc<SessionStore>,
        limits: StakeLimits,
    ) -> Self {
        Self {
            registry,
            sessions,
            limits,
            metrics: MetricsCounters::new(),
        }
    }

    /// Build state from validated configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let limits = StakeLimits {
            capacity: config.leaderboard.capacity()?,
            top_limit: config.leaderboard.top_limit,
        };
        let registry = build_registry(config.leaderboard.locking);
        let sessions = Arc::new(SessionStore::new(config.session.store_config()?));
        Ok(Self::new(registry, sessions, limits))
    }

    /// Live session for `customer`, issuing one if needed.
    pub fn session_for(&self, customer: CustomerId) -> SessionRecord {
        self.metrics.sessions_requested.fetch_add(1, Ordering::Relaxed);
        self.sessions.get_or_create(customer)
    }

    /// Customer behind a session key, if the session is live.
    pub fn authenticate(&self, key: &SessionKey) -> Option<CustomerId> {
        let customer = self.sessions.resolve(key);
        if customer.is_none() {
            self.metrics.auth_failures.fetch_add(1, Ordering::Relaxed);
        }
        customer
    }

    /// Record a stake from an authenticated customer.
    pub fn submit_stake(&self, market: MarketId, customer: CustomerId, stake: u64) -> InsertOutcome {
        let outcome = self
            .registry
            .record_stake(market, customer, stake, self.limits.capacity);

        self.metrics.stakes_submitted.fetch_add(1, Ordering::Relaxed);
        if outcome.is_change() {
            self.metrics.stakes_ranked.fetch_add(1, Ordering::Relaxed);
        }
        debug!(market = %market, customer = %customer, stake, ?outcome, "Stake submitted");
        outcome
    }

    /// Top stakes of `market`; `None` if it has never seen a stake.
    pub fn high_stakes(&self, market: MarketId) -> Option<Vec<StakeEntry>> {
        self.metrics.queries_served.fetch_add(1, Ordering::Relaxed);
        self.registry.top_stakes(market, self.limits.top_limit)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("locking", &self.registry.locking())
            .field("markets", &self.registry.market_count())
            .field("sessions", &self.sessions.len())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Request counters.
#[derive(Debug, Default)]
pub struct MetricsCounters {
    /// Session requests served.
    pub sessions_requested: AtomicU64,
    /// Session keys that failed to resolve.
    pub auth_failures: AtomicU64,
    /// Stakes accepted from authenticated customers.
    pub stakes_submitted: AtomicU64,
    /// Submitted stakes that changed a ranking.
    pub stakes_ranked: AtomicU64,
    /// High-stakes queries served.
    pub queries_served: AtomicU64,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_requested: self.sessions_requested.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            stakes_submitted: self.stakes_submitted.load(Ordering::Relaxed),
            stakes_ranked: self.stakes_ranked.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_requested: u64,
    pub auth_failures: u64,
    pub stakes_submitted: u64,
    pub stakes_ranked: u64,
    pub queries_served: u64,
}
