//! Bounded memoizing cache with singleflight construction

use crate::error::{BoxError, Error, Result};
use crate::flight::Flight;
use crate::stats::{CacheStats, Counters};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct State<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    in_flight: HashMap<K, Arc<Flight<V>>>,
}

enum Claim<V> {
    Hit(V),
    Lead(Arc<Flight<V>>),
    Wait(Arc<Flight<V>>),
}

/// Thread-safe, fixed-capacity LRU cache that runs at most one constructor
/// per key at a time.
///
/// The structural lock guards the entry store and the in-flight table only.
/// It is never held while a constructor runs, so slow constructions for one
/// key do not hold up lookups or constructions for other keys. Concurrent
/// callers for a key that is being constructed block on that construction
/// and receive its outcome, value or error.
///
/// Failed constructions are not cached. Once capacity is reached, storing a
/// new entry evicts the least recently used one.
pub struct MemoCache<K: Hash + Eq, V> {
    capacity: NonZeroUsize,
    state: Mutex<State<K, V>>,
    stats: Counters,
}

impl<K: Hash + Eq + Clone, V: Clone> MemoCache<K, V> {
    /// Creates a new cache holding at most `capacity` entries
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonPositiveCapacity`] if capacity is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::NonPositiveCapacity)?;

        Ok(Self {
            capacity,
            state: Mutex::new(State {
                entries: LruCache::unbounded(),
                in_flight: HashMap::new(),
            }),
            stats: Counters::default(),
        })
    }

    /// Returns the stored value for `key`, constructing it if absent.
    ///
    /// A stored entry always wins: `construct` is not called on a hit, even if
    /// it would have failed. On a miss the first caller runs `construct`; any
    /// caller arriving for the same key while it runs waits for that outcome
    /// instead of running its own constructor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Construction`] when the constructor (this caller's or
    /// the one it waited on) failed. Nothing is stored in that case.
    pub fn get_or_add<F, E>(&self, key: K, construct: F) -> Result<V>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: Into<BoxError>,
    {
        self.stats.lookup();

        let flight = loop {
            match self.claim(&key) {
                Claim::Hit(value) => return Ok(value),
                Claim::Lead(flight) => break flight,
                Claim::Wait(flight) => {
                    if let Some(outcome) = flight.wait() {
                        return outcome;
                    }
                    debug!("In-flight construction was abandoned, retrying lookup");
                }
            }
        };

        let mut leader = Leader {
            cache: self,
            key: &key,
            flight,
            finished: false,
        };

        let outcome = construct().map_err(Error::construction);
        self.store(&key, &outcome);
        leader.flight.complete(outcome.clone());
        leader.finished = true;

        outcome
    }

    /// Removes every stored entry.
    ///
    /// Constructions already in flight are not cancelled; they store their
    /// value when they finish.
    pub fn purge(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        self.stats.purged(count);
        debug!(purged = count, "Purged memo cache");
    }

    /// Returns the number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if no entries are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Returns the maximum number of stored entries
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns true if `key` has a stored entry. Does not affect recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Returns a snapshot of the lookup counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn claim(&self, key: &K) -> Claim<V> {
        let mut state = self.state.lock();

        if let Some(value) = state.entries.get(key) {
            self.stats.hit();
            trace!("Memo cache hit");
            return Claim::Hit(value.clone());
        }

        if let Some(flight) = state.in_flight.get(key) {
            self.stats.coalesced();
            trace!("Waiting on in-flight construction");
            return Claim::Wait(Arc::clone(flight));
        }

        let flight = Arc::new(Flight::new());
        state.in_flight.insert(key.clone(), Arc::clone(&flight));
        self.stats.miss();
        debug!(in_flight = state.in_flight.len(), "Memo cache miss, constructing value");
        Claim::Lead(flight)
    }

    fn store(&self, key: &K, outcome: &Result<V>) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);

        match outcome {
            Ok(value) => {
                state.entries.push(key.clone(), value.clone());
                while state.entries.len() > self.capacity.get() {
                    if state.entries.pop_lru().is_none() {
                        break;
                    }
                    self.stats.eviction();
                    debug!(capacity = self.capacity.get(), "Evicted least recently used entry");
                }
                debug!(len = state.entries.len(), "Stored constructed value");
            }
            Err(err) => {
                self.stats.failure();
                debug!(error = %err, "Construction failed, nothing cached");
            }
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoCache")
            .field("capacity", &self.capacity)
            .field("len", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Owns an in-flight slot while its constructor runs.
///
/// If the constructor unwinds, the slot is removed and its waiters are
/// released so that one of them can take over.
struct Leader<'a, K: Hash + Eq, V> {
    cache: &'a MemoCache<K, V>,
    key: &'a K,
    flight: Arc<Flight<V>>,
    finished: bool,
}

impl<K: Hash + Eq, V> Drop for Leader<'_, K, V> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!("Value constructor panicked, abandoning in-flight construction");
        {
            let mut state = self.cache.state.lock();
            if state
                .in_flight
                .get(self.key)
                .is_some_and(|flight| Arc::ptr_eq(flight, &self.flight))
            {
                state.in_flight.remove(self.key);
            }
        }
        self.flight.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ok(value: u32) -> impl FnOnce() -> std::result::Result<u32, BoxError> {
        move || Ok(value)
    }

    fn fail() -> std::result::Result<u32, BoxError> {
        Err("unable to construct value".into())
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = MemoCache::<String, u32>::new(0);
        assert!(matches!(result, Err(Error::NonPositiveCapacity)));
    }

    #[test]
    fn test_accepts_positive_capacity() {
        for capacity in [1, 5, 1000] {
            let cache = MemoCache::<String, u32>::new(capacity).unwrap();
            assert_eq!(cache.capacity(), capacity);
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        for capacity in [usize::MAX, 1 << 40] {
            let cache = MemoCache::new(capacity).unwrap();
            assert_eq!(cache.capacity(), capacity);

            for i in 0..16u32 {
                cache.get_or_add(i, ok(i)).unwrap();
            }
            assert_eq!(cache.len(), 16);
            assert_eq!(cache.stats().evictions, 0);
        }
    }

    #[test]
    fn test_debug_shows_size() {
        let cache = MemoCache::new(3).unwrap();
        cache.get_or_add("a", ok(1)).unwrap();

        let rendered = format!("{cache:?}");
        assert!(rendered.starts_with("MemoCache {"));
        assert!(rendered.contains("capacity: 3"));
        assert!(rendered.contains("len: 1"));
    }

    #[test]
    fn test_original_value_wins() {
        let cache = MemoCache::new(1).unwrap();

        assert_eq!(cache.get_or_add("A", ok(10)).unwrap(), 10);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.get_or_add("A", ok(20)).unwrap(), 10);
        assert_eq!(cache.len(), 1);

        cache.purge();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_hit_skips_failing_constructor() {
        let cache = MemoCache::new(4).unwrap();
        cache.get_or_add("A", ok(1)).unwrap();

        let called = Cell::new(false);
        let value = cache
            .get_or_add("A", || {
                called.set(true);
                fail()
            })
            .unwrap();

        assert_eq!(value, 1);
        assert!(!called.get());
    }

    #[test]
    fn test_failure_is_not_cached() {
        let cache = MemoCache::new(4).unwrap();

        let err = cache.get_or_add("A", fail).unwrap_err();
        assert_eq!(err.to_string(), "unable to construct value");
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(&"A"));

        assert_eq!(cache.get_or_add("A", ok(3)).unwrap(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = MemoCache::new(2).unwrap();
        cache.get_or_add("a", ok(1)).unwrap();
        cache.get_or_add("b", ok(2)).unwrap();

        // Touch "a" so that "b" becomes the eviction candidate
        cache.get_or_add("a", fail).unwrap();
        cache.get_or_add("c", ok(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_contains_does_not_touch_recency() {
        let cache = MemoCache::new(2).unwrap();
        cache.get_or_add("a", ok(1)).unwrap();
        cache.get_or_add("b", ok(2)).unwrap();

        assert!(cache.contains(&"a"));
        cache.get_or_add("c", ok(3)).unwrap();

        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let cache = MemoCache::new(3).unwrap();
        for i in 0..10u32 {
            cache.get_or_add(i, ok(i)).unwrap();
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.stats().evictions, 7);
    }

    #[test]
    fn test_stats_track_lookups() {
        let cache = MemoCache::new(2).unwrap();
        cache.get_or_add("a", ok(1)).unwrap();
        cache.get_or_add("a", ok(1)).unwrap();
        let _ = cache.get_or_add("b", fail);
        cache.purge();

        let stats = cache.stats();
        assert_eq!(stats.lookups, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.purged, 1);
    }
}
