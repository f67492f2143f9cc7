//! Customer sessions.
//!
//! Sessions are short-lived bearer keys proving a customer's identity:
//!
//! ```text
//! SessionStore
//! ├── by_customer: CustomerId -> SessionRecord
//! └── by_key:      SessionKey -> CustomerId
//! SessionSweeper
//! └── ticker task removing expired records
//! ```
//!
//! Both indexes sit behind one lock, so a reader never sees one updated
//! without the other. Expiry is checked on every lookup; the sweeper only
//! bounds memory.

pub mod store;
pub mod sweeper;

pub use store::{
    SessionRecord, SessionStats, SessionStatsSnapshot, SessionStore, SessionStoreConfig,
    SimulatedClock, TimeSource,
};
pub use sweeper::SessionSweeper;
