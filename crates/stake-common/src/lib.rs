//! Shared types for the high-stakes service.
//!
//! This crate contains:
//! - Identifiers (CustomerId, MarketId)
//! - Ranked stake rows (StakeEntry) and their wire formatting
//! - Session keys and their generator

pub mod types;

pub use types::*;
