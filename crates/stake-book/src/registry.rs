//! Per-market leaderboard registry.
//!
//! A market's leaderboard is created by the first stake submitted for it and
//! is never removed. Two implementations are provided with different locking:
//!
//! | Strategy  | Map lock                  | Board lock                 |
//! |-----------|---------------------------|----------------------------|
//! | `Sharded` | DashMap shard (per key)   | `RwLock` per leaderboard   |
//! | `Coarse`  | one `RwLock` for all      | covered by the map lock    |
//!
//! Both guarantee that concurrent first writes for the same market end up on
//! a single leaderboard.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use stake_common::{CustomerId, MarketId, StakeEntry};

use crate::leaderboard::{InsertOutcome, Leaderboard};

/// How the registry serializes access to its leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingStrategy {
    /// Sharded map plus one lock per leaderboard.
    #[default]
    Sharded,
    /// Single lock over every market.
    Coarse,
}

impl FromStr for LockingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sharded" => Ok(Self::Sharded),
            "coarse" => Ok(Self::Coarse),
            other => Err(format!("unknown locking strategy: {other}")),
        }
    }
}

impl fmt::Display for LockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sharded => write!(f, "sharded"),
            Self::Coarse => write!(f, "coarse"),
        }
    }
}

/// Get-or-create access to one leaderboard per market.
///
/// All implementations must be thread-safe (Send + Sync).
pub trait MarketRegistry: Send + Sync {
    /// Locking strategy this registry implements.
    fn locking(&self) -> LockingStrategy;

    /// Record a stake, creating the market's leaderboard with `capacity`
    /// if this is the first stake seen for it.
    ///
    /// `capacity` only applies on creation; an existing board keeps its own.
    fn record_stake(
        &self,
        market: MarketId,
        customer: CustomerId,
        stake: u64,
        capacity: NonZeroUsize,
    ) -> InsertOutcome;

    /// Up to `n` entries for `market`, highest first.
    ///
    /// `None` means no stake has ever been recorded for the market.
    fn top_stakes(&self, market: MarketId, n: usize) -> Option<Vec<StakeEntry>>;

    /// Number of markets with a leaderboard.
    fn market_count(&self) -> usize;
}

/// Build the registry for a locking strategy.
pub fn build_registry(strategy: LockingStrategy) -> Arc<dyn MarketRegistry> {
    match strategy {
        LockingStrategy::Sharded => Arc::new(ShardedRegistry::new()),
        LockingStrategy::Coarse => Arc::new(CoarseRegistry::new()),
    }
}

// ============================================================================
// Sharded
// ============================================================================

/// DashMap of independently locked leaderboards.
///
/// The shard lock is held only long enough to fetch or create the board;
/// inserts and reads then contend on that board's `RwLock` alone.
#[derive(Debug, Default)]
pub struct ShardedRegistry {
    markets: DashMap<MarketId, Arc<RwLock<Leaderboard>>>,
}

impl ShardedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn board(&self, market: MarketId) -> Option<Arc<RwLock<Leaderboard>>> {
        self.markets.get(&market).map(|r| Arc::clone(r.value()))
    }

    fn board_or_create(
        &self,
        market: MarketId,
        capacity: NonZeroUsize,
    ) -> Arc<RwLock<Leaderboard>> {
        if let Some(board) = self.board(market) {
            return board;
        }
        // The entry API holds the shard write lock, so a racing writer either
        // creates the board here or finds the winner's.
        let entry = self.markets.entry(market).or_insert_with(|| {
            debug!(market = %market, capacity = capacity.get(), "Creating leaderboard");
            Arc::new(RwLock::new(Leaderboard::new(capacity)))
        });
        Arc::clone(entry.value())
    }
}

impl MarketRegistry for ShardedRegistry {
    fn locking(&self) -> LockingStrategy {
        LockingStrategy::Sharded
    }

    fn record_stake(
        &self,
        market: MarketId,
        customer: CustomerId,
        stake: u64,
        capacity: NonZeroUsize,
    ) -> InsertOutcome {
        let board = self.board_or_create(market, capacity);
        board.write().insert(customer, stake)
    }

    fn top_stakes(&self, market: MarketId, n: usize) -> Option<Vec<StakeEntry>> {
        let board = self.board(market)?;
        Some(board.read().snapshot(n))
    }

    fn market_count(&self) -> usize {
        self.markets.len()
    }
}

// ============================================================================
// Coarse
// ============================================================================

/// Every leaderboard behind one lock.
#[derive(Debug, Default)]
pub struct CoarseRegistry {
    markets: RwLock<HashMap<MarketId, Leaderboard>>,
}

impl CoarseRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarketRegistry for CoarseRegistry {
    fn locking(&self) -> LockingStrategy {
        LockingStrategy::Coarse
    }

    fn record_stake(
        &self,
        market: MarketId,
        customer: CustomerId,
        stake: u64,
        capacity: NonZeroUsize,
    ) -> InsertOutcome {
        let mut markets = self.markets.write();
        markets
            .entry(market)
            .or_insert_with(|| {
                debug!(market = %market, capacity = capacity.get(), "Creating leaderboard");
                Leaderboard::new(capacity)
            })
            .insert(customer, stake)
    }

    fn top_stakes(&self, market: MarketId, n: usize) -> Option<Vec<StakeEntry>> {
        self.markets.read().get(&market).map(|board| board.snapshot(n))
    }

    fn market_count(&self) -> usize {
        self.markets.read().len()
    }
}
