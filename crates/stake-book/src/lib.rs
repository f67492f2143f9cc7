//! In-memory stake ranking.
//!
//! Provides the two structures behind the high-stakes endpoints:
//! - `Leaderboard`: bounded, descending list of one best stake per customer
//! - `MarketRegistry`: lazily created leaderboard per market
//!
//! Used by `stake-server` for both the submit and query paths.

pub mod leaderboard;
pub mod registry;

pub use leaderboard::{BookError, InsertOutcome, Iter, Leaderboard, MAX_CAPACITY};
pub use registry::{
    CoarseRegistry, LockingStrategy, MarketRegistry, ShardedRegistry, build_registry,
};
