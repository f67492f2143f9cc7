//! Dual-index session store with passive expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use stake_common::{CustomerId, SessionKey};

/// Time source for expiry checks.
#[derive(Debug, Clone)]
pub enum TimeSource {
    /// Use real wall-clock time (Utc::now()).
    WallClock,
    /// Use time driven through a shared `SimulatedClock`.
    Simulated(SimulatedClock),
}

impl TimeSource {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::WallClock => Utc::now(),
            Self::Simulated(clock) => clock.now(),
        }
    }
}

/// Externally driven clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }

    /// Set the simulated time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.now.write() = time;
    }

    /// Move simulated time forward.
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.write() += by;
    }
}

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Validity window of a newly issued key.
    pub timeout: chrono::Duration,
    /// Time source mode.
    pub time_source: TimeSource,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            timeout: chrono::Duration::minutes(10),
            time_source: TimeSource::WallClock,
        }
    }
}

/// One live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub customer: CustomerId,
    pub key: SessionKey,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A session is valid up to and including its expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Counters for session activity.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Keys issued (first issue and replacements).
    pub issued: AtomicU64,
    /// Expired records replaced on request.
    pub renewed: AtomicU64,
    /// Expired records removed by the sweeper.
    pub swept: AtomicU64,
}

impl SessionStats {
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            renewed: self.renewed.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `SessionStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    pub issued: u64,
    pub renewed: u64,
    pub swept: u64,
}

#[derive(Debug, Default)]
struct SessionIndex {
    by_customer: HashMap<CustomerId, SessionRecord>,
    by_key: HashMap<SessionKey, CustomerId>,
}

impl SessionIndex {
    fn insert(&mut self, record: SessionRecord) {
        self.by_key.insert(record.key.clone(), record.customer);
        self.by_customer.insert(record.customer, record);
    }

    fn remove(&mut self, customer: CustomerId) -> Option<SessionRecord> {
        let record = self.by_customer.remove(&customer)?;
        self.by_key.remove(&record.key);
        Some(record)
    }

    fn fresh_key(&self) -> SessionKey {
        let mut rng = rand::thread_rng();
        loop {
            let key = SessionKey::generate(&mut rng);
            if !self.by_key.contains_key(&key) {
                return key;
            }
        }
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.by_customer.len(),
            self.by_key.len(),
            "session indexes out of step"
        );
    }
}

/// Issues, validates and expires customer sessions.
#[derive(Debug)]
pub struct SessionStore {
    config: SessionStoreConfig,
    index: RwLock<SessionIndex>,
    stats: SessionStats,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            config,
            index: RwLock::new(SessionIndex::default()),
            stats: SessionStats::default(),
        }
    }

    /// Store on simulated time starting at `start`, with the clock driving it.
    pub fn simulated(timeout: chrono::Duration, start: DateTime<Utc>) -> (Self, SimulatedClock) {
        let clock = SimulatedClock::new(start);
        let store = Self::new(SessionStoreConfig {
            timeout,
            time_source: TimeSource::Simulated(clock.clone()),
        });
        (store, clock)
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get current time based on configuration.
    pub fn now(&self) -> DateTime<Utc> {
        self.config.time_source.now()
    }

    /// Records held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.index.read().by_customer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the customer's live session, issuing a new one if there is none
    /// or the current one has expired.
    pub fn get_or_create(&self, customer: CustomerId) -> SessionRecord {
        let now = self.now();

        {
            let index = self.index.read();
            if let Some(record) = index.by_customer.get(&customer)
                && !record.is_expired_at(now)
            {
                return record.clone();
            }
        }

        let mut index = self.index.write();

        // Another caller may have issued while we waited for the write lock.
        if let Some(record) = index.by_customer.get(&customer) {
            if !record.is_expired_at(now) {
                return record.clone();
            }
            index.remove(customer);
            self.stats.renewed.fetch_add(1, Ordering::Relaxed);
            debug!(customer = %customer, "Session expired, issuing replacement");
        }

        let record = SessionRecord {
            customer,
            key: index.fresh_key(),
            expires_at: now + self.config.timeout,
        };
        index.insert(record.clone());
        index.debug_check();
        self.stats.issued.fetch_add(1, Ordering::Relaxed);

        debug!(customer = %customer, expires_at = %record.expires_at, "Session issued");
        record
    }

    /// Customer owning `key`, if the session is live.
    pub fn resolve(&self, key: &SessionKey) -> Option<CustomerId> {
        let now = self.now();
        let index = self.index.read();

        let customer = *index.by_key.get(key)?;
        let record = index.by_customer.get(&customer)?;
        if record.is_expired_at(now) {
            debug!(customer = %customer, "Session key expired");
            return None;
        }
        Some(customer)
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.now();
        let mut index = self.index.write();

        let expired: Vec<CustomerId> = index
            .by_customer
            .values()
            .filter(|record| record.is_expired_at(now))
            .map(|record| record.customer)
            .collect();

        for customer in &expired {
            index.remove(*customer);
        }
        index.debug_check();

        let removed = expired.len();
        if removed > 0 {
            self.stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, remaining = index.by_customer.len(), "Swept expired sessions");
        }
        removed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn store() -> (SessionStore, SimulatedClock) {
        SessionStore::simulated(chrono::Duration::seconds(60), start())
    }

    #[test]
    fn test_issue_and_resolve() {
        let (store, _clock) = store();
        let record = store.get_or_create(CustomerId(42));

        assert_eq!(record.customer, CustomerId(42));
        assert_eq!(record.expires_at, start() + chrono::Duration::seconds(60));
        assert_eq!(store.resolve(&record.key), Some(CustomerId(42)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_key_while_live() {
        let (store, clock) = store();
        let first = store.get_or_create(CustomerId(1));
        clock.advance(chrono::Duration::seconds(59));
        let second = store.get_or_create(CustomerId(1));

        assert_eq!(first, second);
        assert_eq!(store.stats().issued, 1);
    }

    #[test]
    fn test_valid_at_exact_expiry() {
        let (store, clock) = store();
        let record = store.get_or_create(CustomerId(1));
        clock.set_time(record.expires_at);

        assert_eq!(store.resolve(&record.key), Some(CustomerId(1)));
    }

    #[test]
    fn test_expired_session_replaced() {
        let (store, clock) = store();
        let old = store.get_or_create(CustomerId(42));
        assert_eq!(store.resolve(&old.key), Some(CustomerId(42)));

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(store.resolve(&old.key), None);

        let new = store.get_or_create(CustomerId(42));
        assert_ne!(new.key, old.key);
        assert_eq!(store.resolve(&old.key), None);
        assert_eq!(store.resolve(&new.key), Some(CustomerId(42)));
        assert_eq!(store.len(), 1);

        let stats = store.stats();
        assert_eq!(stats.issued, 2);
        assert_eq!(stats.renewed, 1);
    }

    #[test]
    fn test_unknown_key() {
        let (store, _clock) = store();
        store.get_or_create(CustomerId(1));
        let never_issued = SessionKey::parse("aaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(store.resolve(&never_issued), None);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store();
        let early = store.get_or_create(CustomerId(1));
        clock.advance(chrono::Duration::seconds(30));
        let late = store.get_or_create(CustomerId(2));

        clock.advance(chrono::Duration::seconds(31));
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&early.key), None);
        assert_eq!(store.resolve(&late.key), Some(CustomerId(2)));
        assert_eq!(store.stats().swept, 1);

        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_simulated_clock_drives_store() {
        let (store, clock) = store();
        assert_eq!(store.now(), start());

        let shared = clock.clone();
        shared.advance(chrono::Duration::seconds(5));
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(5));
        assert_eq!(store.now(), clock.now());
    }

    #[test]
    fn test_wall_clock_store() {
        let store = SessionStore::default();
        assert!(matches!(store.config().time_source, TimeSource::WallClock));
        let record = store.get_or_create(CustomerId(5));
        assert!(record.expires_at > Utc::now());
        assert_eq!(store.resolve(&record.key), Some(CustomerId(5)));
    }

    #[test]
    fn test_concurrent_get_or_create_single_session() {
        let store = Arc::new(store().0);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create(CustomerId(7)).key)
            })
            .collect();

        let keys: HashSet<SessionKey> = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(keys.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().issued, 1);
    }

    #[test]
    fn test_concurrent_customers_get_distinct_keys() {
        let store = Arc::new(store().0);

        let handles: Vec<_> = (0..100u32)
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create(CustomerId(id)))
            })
            .collect();

        let records: Vec<SessionRecord> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let keys: HashSet<&SessionKey> = records.iter().map(|r| &r.key).collect();

        assert_eq!(keys.len(), 100);
        for record in &records {
            assert_eq!(store.resolve(&record.key), Some(record.customer));
        }
    }
}
