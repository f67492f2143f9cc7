//! High-stakes ranking service.
//!
//! Customers obtain a short-lived session key, submit stakes against bet
//! offers (markets), and anyone can read the top stakes of a market.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `session`: Session keys with passive expiry and a background sweeper
//! - `state`: Shared state tying the registry and sessions together
//! - `api`: Plain-text HTTP endpoints

pub mod api;
pub mod config;
pub mod session;
pub mod state;

pub use api::{ApiError, create_router, serve};
pub use config::ServerConfig;
pub use session::{
    SessionRecord, SessionStore, SessionStoreConfig, SessionSweeper, SimulatedClock, TimeSource,
};
pub use state::{AppState, MetricsCounters, MetricsSnapshot, StakeLimits};
