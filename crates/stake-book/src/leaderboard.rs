//! Bounded stake leaderboard for a single market.
//!
//! Entries live in a slot arena and are chained into a doubly linked list
//! ordered by descending stake. A side index maps each customer to its slot,
//! so existence checks are O(1) and an insert costs one scan to find the
//! splice point.
//!
//! ## Rules
//!
//! - At most one entry per customer; a customer's stake only ever goes up.
//! - Equal stakes: the most recent insert ranks ahead of existing entries.
//! - When full, a stake must beat the current minimum to get in, and the
//!   lowest entry is evicted to make room.

use std::collections::HashMap;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

use stake_common::{CustomerId, StakeEntry};
use thiserror::Error;

/// Handle value meaning "no slot".
pub(crate) const NULL_SLOT: u32 = u32::MAX;

/// Largest capacity whose slots (plus the one used mid-insert) fit in a handle.
pub const MAX_CAPACITY: usize = NULL_SLOT as usize - 1;

/// Slots reserved up front. Larger boards grow as entries arrive.
const INITIAL_RESERVE: usize = 32;

/// Errors raised when constructing a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("leaderboard capacity must be at least 1")]
    ZeroCapacity,

    #[error("leaderboard capacity {0} exceeds the slot handle range")]
    CapacityTooLarge(usize),
}

/// What an insert did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New customer entered the board, possibly pushing out the lowest entry.
    Inserted { evicted: Option<StakeEntry> },
    /// Existing customer raised their stake.
    Raised { previous: u64 },
    /// Existing customer already holds an equal or higher stake.
    Unchanged,
    /// Board is full and the stake does not beat the current minimum.
    Rejected,
}

impl InsertOutcome {
    /// True if the ranking changed.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Raised { .. })
    }
}

#[derive(Debug, Clone)]
struct Slot {
    customer: CustomerId,
    stake: u64,
    prev: u32,
    next: u32,
}

/// Top `capacity` stakes of one market, highest first.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
    capacity: NonZeroUsize,
    index: HashMap<CustomerId, u32>,
}

impl Leaderboard {
    /// Create an empty leaderboard holding at most `capacity` entries.
    ///
    /// Capacities above `MAX_CAPACITY` are clamped to it.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = NonZeroUsize::new(capacity.get().min(MAX_CAPACITY)).unwrap_or(capacity);
        // One extra slot: an insert links before it evicts.
        let reserve = capacity.get().saturating_add(1).min(INITIAL_RESERVE);
        Self {
            slots: Vec::with_capacity(reserve),
            free: Vec::new(),
            head: NULL_SLOT,
            tail: NULL_SLOT,
            len: 0,
            capacity,
            index: HashMap::with_capacity(reserve),
        }
    }

    /// Create a leaderboard from an unchecked capacity.
    pub fn try_new(capacity: usize) -> Result<Self, BookError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(BookError::ZeroCapacity)?;
        if capacity.get() > MAX_CAPACITY {
            return Err(BookError::CapacityTooLarge(capacity.get()));
        }
        Ok(Self::new(capacity))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity.get()
    }

    /// Stake held by the lowest-ranked entry.
    pub fn min_stake(&self) -> Option<u64> {
        self.slot(self.tail).map(|s| s.stake)
    }

    /// Stake currently recorded for `customer`.
    pub fn get(&self, customer: CustomerId) -> Option<u64> {
        self.index
            .get(&customer)
            .map(|&handle| self.slots[handle as usize].stake)
    }

    pub fn contains(&self, customer: CustomerId) -> bool {
        self.index.contains_key(&customer)
    }

    /// 1-based rank of `customer`, if on the board.
    pub fn rank_of(&self, customer: CustomerId) -> Option<usize> {
        self.index.get(&customer)?;
        self.iter()
            .position(|entry| entry.customer == customer)
            .map(|pos| pos + 1)
    }

    /// Record a stake for `customer`.
    pub fn insert(&mut self, customer: CustomerId, stake: u64) -> InsertOutcome {
        let outcome = match self.index.get(&customer).copied() {
            Some(handle) => {
                let previous = self.slots[handle as usize].stake;
                if stake <= previous {
                    return InsertOutcome::Unchanged;
                }
                // Unlinking frees a place, so the re-insert always fits.
                self.unlink(handle);
                self.link_new(customer, stake);
                InsertOutcome::Raised { previous }
            }
            None => {
                if self.is_full() && self.min_stake().is_some_and(|min| stake <= min) {
                    return InsertOutcome::Rejected;
                }
                self.link_new(customer, stake);
                let evicted = if self.len > self.capacity.get() {
                    Some(self.unlink(self.tail))
                } else {
                    None
                };
                InsertOutcome::Inserted { evicted }
            }
        };

        self.debug_check();
        outcome
    }

    /// Drop `customer` from the board, returning the stake they held.
    pub fn remove(&mut self, customer: CustomerId) -> Option<u64> {
        let handle = self.index.get(&customer).copied()?;
        let removed = self.unlink(handle);
        self.debug_check();
        Some(removed.stake)
    }

    /// All entries, highest first.
    pub fn iter(&self) -> Iter<'_> {
        self.top_n(self.len)
    }

    /// Up to `n` entries, highest first. Lazy; clone it to restart.
    pub fn top_n(&self, n: usize) -> Iter<'_> {
        Iter {
            board: self,
            cursor: self.head,
            remaining: n.min(self.len),
        }
    }

    /// Owned copy of the first `n` entries.
    pub fn snapshot(&self, n: usize) -> Vec<StakeEntry> {
        self.top_n(n).collect()
    }

    // ------------------------------------------------------------------
    // Arena plumbing
    // ------------------------------------------------------------------

    #[inline]
    fn slot(&self, handle: u32) -> Option<&Slot> {
        if handle == NULL_SLOT {
            None
        } else {
            self.slots.get(handle as usize)
        }
    }

    fn alloc(&mut self, customer: CustomerId, stake: u64) -> u32 {
        let slot = Slot {
            customer,
            stake,
            prev: NULL_SLOT,
            next: NULL_SLOT,
        };
        match self.free.pop() {
            Some(handle) => {
                self.slots[handle as usize] = slot;
                handle
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Allocate a slot and splice it before the first entry whose stake is
    /// not greater than `stake`.
    fn link_new(&mut self, customer: CustomerId, stake: u64) {
        let handle = self.alloc(customer, stake);

        let mut cursor = self.head;
        while let Some(slot) = self.slot(cursor) {
            if slot.stake <= stake {
                break;
            }
            cursor = slot.next;
        }

        let prev = if cursor == NULL_SLOT {
            self.tail
        } else {
            self.slots[cursor as usize].prev
        };

        {
            let node = &mut self.slots[handle as usize];
            node.prev = prev;
            node.next = cursor;
        }
        match prev {
            NULL_SLOT => self.head = handle,
            p => self.slots[p as usize].next = handle,
        }
        match cursor {
            NULL_SLOT => self.tail = handle,
            c => self.slots[c as usize].prev = handle,
        }

        self.index.insert(customer, handle);
        self.len += 1;
    }

    /// Detach `handle` from the list and the index, returning what it held.
    fn unlink(&mut self, handle: u32) -> StakeEntry {
        let (customer, stake, prev, next) = {
            let s = &self.slots[handle as usize];
            (s.customer, s.stake, s.prev, s.next)
        };

        match prev {
            NULL_SLOT => self.head = next,
            p => self.slots[p as usize].next = next,
        }
        match next {
            NULL_SLOT => self.tail = prev,
            n => self.slots[n as usize].prev = prev,
        }

        self.index.remove(&customer);
        self.free.push(handle);
        self.len -= 1;

        StakeEntry::new(customer, stake)
    }

    #[inline]
    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            self.check_invariants();
        }
    }

    /// Panics if list order, links or index disagree.
    fn check_invariants(&self) {
        assert!(self.len <= self.capacity.get(), "board over capacity");
        assert_eq!(self.len, self.index.len(), "index size drift");

        let mut count = 0;
        let mut prev = NULL_SLOT;
        let mut cursor = self.head;
        while let Some(slot) = self.slot(cursor) {
            assert_eq!(slot.prev, prev, "broken back link");
            assert_eq!(self.index.get(&slot.customer), Some(&cursor), "stale index");
            if let Some(p) = self.slot(prev) {
                assert!(p.stake >= slot.stake, "order violated");
            }
            count += 1;
            prev = cursor;
            cursor = slot.next;
        }
        assert_eq!(prev, self.tail, "tail mismatch");
        assert_eq!(count, self.len, "list length drift");
    }
}

/// Ranked walk over a leaderboard.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    board: &'a Leaderboard,
    cursor: u32,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = StakeEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.board.slot(self.cursor)?;
        self.cursor = slot.next;
        self.remaining -= 1;
        Some(StakeEntry::new(slot.customer, slot.stake))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a Leaderboard {
    type Item = StakeEntry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
