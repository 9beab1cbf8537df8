//! Bounded LRU cache with byte accounting and two-phase eviction.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::item::Item;
use crate::list::{Handle, List};

const DEFAULT_MAX_BYTES: i64 = 256 * 1024 * 1024;
const DEFAULT_ENTRY_OVERHEAD: i64 = 200;
const DEFAULT_MAX_EVICT_PER_OP: usize = 64;

/// Builder for [`LruCache`].
///
/// Out-of-range inputs are normalized rather than rejected:
/// non-positive `max_bytes` falls back to 256 MiB, an unset or
/// out-of-range `target_bytes` snaps to 95% of `max_bytes`, negative
/// overhead and TTL values are clamped to zero, and a zero eviction
/// budget falls back to the default.
pub struct Builder {
    max_bytes: i64,
    target_bytes: i64,
    entry_overhead: i64,
    max_evict_per_op: usize,
    incr_sliding_ttl_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl Builder {
    fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            target_bytes: 0,
            entry_overhead: DEFAULT_ENTRY_OVERHEAD,
            max_evict_per_op: DEFAULT_MAX_EVICT_PER_OP,
            incr_sliding_ttl_seconds: 0,
            clock: Arc::new(SystemClock),
        }
    }

    /// Hard byte ceiling. Writes never leave the cache above it.
    pub fn max_bytes(mut self, max_bytes: i64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Post-eviction watermark. 0 selects 95% of `max_bytes`.
    pub fn target_bytes(mut self, target_bytes: i64) -> Self {
        self.target_bytes = target_bytes;
        self
    }

    /// Per-item bookkeeping charge added to key and value bytes.
    pub fn entry_overhead(mut self, entry_overhead: i64) -> Self {
        self.entry_overhead = entry_overhead;
        self
    }

    /// Victim budget per write operation.
    pub fn max_evict_per_op(mut self, max_evict_per_op: usize) -> Self {
        self.max_evict_per_op = max_evict_per_op;
        self
    }

    /// Sliding TTL applied on successful incr/decr. 0 disables.
    pub fn incr_sliding_ttl_seconds(mut self, seconds: i64) -> Self {
        self.incr_sliding_ttl_seconds = seconds;
        self
    }

    /// Substitute the time source. Used by tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> LruCache {
        let max_bytes = if self.max_bytes <= 0 {
            DEFAULT_MAX_BYTES
        } else {
            self.max_bytes
        };
        let target_bytes = if self.target_bytes <= 0 || self.target_bytes > max_bytes {
            max_bytes * 95 / 100
        } else {
            self.target_bytes
        };
        let max_evict_per_op = if self.max_evict_per_op == 0 {
            DEFAULT_MAX_EVICT_PER_OP
        } else {
            self.max_evict_per_op
        };

        LruCache {
            max_bytes,
            target_bytes,
            entry_overhead: self.entry_overhead.max(0),
            max_evict_per_op,
            incr_sliding_ttl_seconds: self.incr_sliding_ttl_seconds.max(0),
            clock: self.clock,
            inner: Mutex::new(Inner {
                map: HashMap::with_hasher(RandomState::new()),
                lru: List::new(),
                used_bytes: 0,
                next_cas: 1,
            }),
        }
    }
}

struct Inner {
    map: HashMap<Box<[u8]>, Handle, RandomState>,
    lru: List<Item>,
    used_bytes: i64,
    next_cas: u64,
}

/// Byte-bounded LRU cache.
///
/// The key index and the recency list are kept in lockstep: every
/// mapped key has exactly one linked node holding its item, and
/// `used_bytes` equals the sum of live item sizes whenever the lock is
/// released.
pub struct LruCache {
    max_bytes: i64,
    target_bytes: i64,
    entry_overhead: i64,
    max_evict_per_op: usize,
    incr_sliding_ttl_seconds: i64,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl LruCache {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Looks up a key and refreshes its recency.
    ///
    /// An expired entry is removed and reported as a miss. The
    /// returned item is a deep copy of the cached bytes.
    pub fn get(&self, key: &[u8]) -> Option<Item> {
        let now = self.clock.now_unix();
        let mut inner = self.inner.lock();

        let handle = *inner.map.get(key)?;
        let expired = inner
            .lru
            .get(handle)
            .map(|item| item.is_expired(now))
            .unwrap_or(true);
        if expired {
            Self::remove_node(&mut inner, handle);
            return None;
        }
        inner.lru.move_to_front(handle);
        inner.lru.get(handle).cloned()
    }

    /// Inserts or replaces a key. Always refreshes recency, assigns a
    /// fresh CAS token, and clears any expiration.
    pub fn set(&self, key: &[u8], flags: u32, value: &[u8]) -> Result<(), CacheError> {
        let now = self.clock.now_unix();
        let mut inner = self.inner.lock();
        self.set_locked(&mut inner, key, flags, value, 0, now)
    }

    /// Removes a key. Expired entries are dropped but reported as not
    /// having existed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = self.clock.now_unix();
        let mut inner = self.inner.lock();

        let Some(&handle) = inner.map.get(key) else {
            return false;
        };
        let expired = inner
            .lru
            .get(handle)
            .map(|item| item.is_expired(now))
            .unwrap_or(true);
        Self::remove_node(&mut inner, handle);
        !expired
    }

    /// Increments a counter, creating the key (holding the textual
    /// delta) when it is missing or expired.
    pub fn incr(&self, key: &[u8], delta: u64) -> Result<u64, CacheError> {
        let now = self.clock.now_unix();
        let exp_unix = self.counter_expiration(now);
        let mut inner = self.inner.lock();

        let Some((flags, value)) = Self::live_counter_state(&mut inner, key, now) else {
            let text = delta.to_string();
            self.set_locked(&mut inner, key, 0, text.as_bytes(), exp_unix, now)?;
            return Ok(delta);
        };

        let cur = parse_decimal(&value).ok_or(CacheError::NonNumeric)?;
        let next = cur.checked_add(delta).ok_or(CacheError::Overflow)?;
        let text = next.to_string();
        self.set_locked(&mut inner, key, flags, text.as_bytes(), exp_unix, now)?;
        Ok(next)
    }

    /// Decrements a counter, clamping at zero. A missing or expired
    /// key is created holding `"0"`.
    pub fn decr(&self, key: &[u8], delta: u64) -> Result<u64, CacheError> {
        let now = self.clock.now_unix();
        let exp_unix = self.counter_expiration(now);
        let mut inner = self.inner.lock();

        let Some((flags, value)) = Self::live_counter_state(&mut inner, key, now) else {
            self.set_locked(&mut inner, key, 0, b"0", exp_unix, now)?;
            return Ok(0);
        };

        let cur = parse_decimal(&value).ok_or(CacheError::NonNumeric)?;
        let next = cur.saturating_sub(delta);
        let text = next.to_string();
        self.set_locked(&mut inner, key, flags, text.as_bytes(), exp_unix, now)?;
        Ok(next)
    }

    /// Current logical byte usage.
    pub fn used_bytes(&self) -> i64 {
        self.inner.lock().used_bytes
    }

    /// Number of entries, including any not-yet-reclaimed expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flags and value of a live entry; removes the entry and returns
    /// `None` when it is missing or expired.
    fn live_counter_state(inner: &mut Inner, key: &[u8], now: i64) -> Option<(u32, Vec<u8>)> {
        let &handle = inner.map.get(key)?;
        let state = inner
            .lru
            .get(handle)
            .filter(|item| !item.is_expired(now))
            .map(|item| (item.flags, item.value.clone()));
        if state.is_none() {
            Self::remove_node(inner, handle);
        }
        state
    }

    fn set_locked(
        &self,
        inner: &mut Inner,
        key: &[u8],
        flags: u32,
        value: &[u8],
        exp_unix: i64,
        now: i64,
    ) -> Result<(), CacheError> {
        let need = self.entry_size(key, value);
        if need > self.max_bytes {
            return Err(CacheError::TooLarge);
        }

        if let Some(&handle) = inner.map.get(key) {
            let live = inner
                .lru
                .get(handle)
                .filter(|item| !item.is_expired(now))
                .map(|item| item.size);
            match live {
                None => Self::remove_node(inner, handle),
                Some(old_size) => {
                    // Replacement works against the size delta; the key
                    // under mutation is protected from victim selection.
                    let delta = need - old_size;
                    if delta > 0 {
                        self.evict(inner, delta, Some(key), now);
                    }
                    if inner.used_bytes + delta > self.max_bytes {
                        return Err(CacheError::NoSpace);
                    }
                    let cas = Self::next_cas(inner);
                    if let Some(item) = inner.lru.get_mut(handle) {
                        item.value = value.to_vec();
                        item.flags = flags;
                        item.size = need;
                        item.cas = cas;
                        item.exp_unix = exp_unix;
                    }
                    inner.used_bytes += delta;
                    inner.lru.move_to_front(handle);
                    self.evict_best_effort(inner, now);
                    return Ok(());
                }
            }
        }

        self.evict(inner, need, None, now);
        if inner.used_bytes + need > self.max_bytes {
            return Err(CacheError::NoSpace);
        }
        let cas = Self::next_cas(inner);
        let item = Item {
            key: key.into(),
            value: value.to_vec(),
            flags,
            size: need,
            cas,
            exp_unix,
        };
        let handle = inner.lru.push_front(item);
        inner.map.insert(key.into(), handle);
        inner.used_bytes += need;
        self.evict_best_effort(inner, now);
        Ok(())
    }

    /// Two-phase eviction: reclaim below the hard limit first, then
    /// below the target watermark, against one shared victim budget.
    fn evict(&self, inner: &mut Inner, incoming_delta: i64, protect: Option<&[u8]>, now: i64) {
        let mut evicted = 0;
        while inner.used_bytes + incoming_delta > self.max_bytes && evicted < self.max_evict_per_op
        {
            let Some(victim) = Self::select_victim(inner, protect, now) else {
                return;
            };
            Self::remove_node(inner, victim);
            evicted += 1;
        }
        while inner.used_bytes + incoming_delta > self.target_bytes
            && evicted < self.max_evict_per_op
        {
            let Some(victim) = Self::select_victim(inner, protect, now) else {
                return;
            };
            Self::remove_node(inner, victim);
            evicted += 1;
        }
    }

    /// Post-write pass draining slack down to the target watermark.
    /// Runs with a fresh budget and no protected key.
    fn evict_best_effort(&self, inner: &mut Inner, now: i64) {
        let mut evicted = 0;
        while inner.used_bytes > self.target_bytes && evicted < self.max_evict_per_op {
            let Some(victim) = Self::select_victim(inner, None, now) else {
                return;
            };
            Self::remove_node(inner, victim);
            evicted += 1;
        }
    }

    /// Scans from the LRU tail toward the front, preferring expired
    /// items over live ones and skipping the protected key.
    fn select_victim(inner: &Inner, protect: Option<&[u8]>, now: i64) -> Option<Handle> {
        let mut fallback = None;
        let mut cursor = inner.lru.back();
        while let Some(handle) = cursor {
            cursor = inner.lru.prev(handle);
            let Some(item) = inner.lru.get(handle) else {
                continue;
            };
            if protect.is_some_and(|protected| protected == item.key.as_ref()) {
                continue;
            }
            if item.is_expired(now) {
                return Some(handle);
            }
            if fallback.is_none() {
                fallback = Some(handle);
            }
        }
        fallback
    }

    fn remove_node(inner: &mut Inner, handle: Handle) {
        if let Some(item) = inner.lru.remove(handle) {
            inner.map.remove(item.key.as_ref());
            inner.used_bytes -= item.size;
            if inner.used_bytes < 0 {
                inner.used_bytes = 0;
            }
        }
    }

    fn entry_size(&self, key: &[u8], value: &[u8]) -> i64 {
        key.len() as i64 + value.len() as i64 + self.entry_overhead
    }

    fn counter_expiration(&self, now: i64) -> i64 {
        if self.incr_sliding_ttl_seconds <= 0 {
            0
        } else {
            now + self.incr_sliding_ttl_seconds
        }
    }

    /// Hands out the next CAS token. Tokens start at 1 and skip 0 on
    /// wrap, so 0 is never assigned.
    fn next_cas(inner: &mut Inner) -> u64 {
        let cas = inner.next_cas;
        inner.next_cas = inner.next_cas.wrapping_add(1);
        if inner.next_cas == 0 {
            inner.next_cas = 1;
        }
        cas
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let inner = self.inner.lock();
        assert_eq!(inner.map.len(), inner.lru.len());
        inner.lru.debug_validate_invariants();

        let mut total = 0i64;
        let mut count = 0usize;
        let mut cursor = inner.lru.back();
        while let Some(handle) = cursor {
            cursor = inner.lru.prev(handle);
            let item = inner.lru.get(handle).expect("linked node must be live");
            assert_eq!(inner.map.get(item.key.as_ref()), Some(&handle));
            total += item.size;
            count += 1;
        }
        assert_eq!(count, inner.lru.len());
        assert_eq!(total, inner.used_bytes);
        assert!(inner.used_bytes >= 0);
    }
}

/// Parse an unsigned decimal counter value: ASCII digits only, at
/// least one, no sign, must fit in a u64. Anything else (including
/// values past `u64::MAX`) reads as non-numeric.
fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}
