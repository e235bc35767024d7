//! Thread-Safe Entry Store with Lazy Expiry and CAS Tokens
//!
//! This module implements the core storage engine for memkv.
//! It maps keys to [`Entry`] values behind a single mutex and exposes every
//! mutation as an atomic "check, then act" primitive.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: All reads and writes go through a single `parking_lot::Mutex`.
//!    CAS correctness relies on one serialization point, so the map is not sharded.
//! 2. **Lazy Expiry**: Entries are checked on access and dropped there. Nothing
//!    sweeps the map in the background.
//! 3. **Whole-Value Replacement**: An [`Entry`] is never edited in place. Every
//!    mutation builds a new entry (new payload, new CAS token) and swaps it in.
//! 4. **No I/O Under the Lock**: callers hand over the complete payload, so the
//!    lock is only ever held for in-memory work.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                                                             │
//! │   Mutex<HashMap<Bytes, Entry>>                              │
//! │                                                             │
//! │   lock ──> drop expired entry for key ──> check ──> write   │
//! │                                                             │
//! │   stats: relaxed atomics, updated outside the map           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::cas;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One stored version of a cache value.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored payload
    pub data: Bytes,
    /// Opaque client metadata, echoed back verbatim
    pub flags: u32,
    /// Time-to-live in seconds (0 = never expires, negative = already expired)
    pub ttl: i64,
    /// When this version was written
    pub stored_at: Instant,
    /// Token identifying this exact version
    pub cas: u64,
}

impl Entry {
    /// Creates a new version, stamped now, with a token distinct from `previous_cas`.
    pub fn new(data: Bytes, flags: u32, ttl: i64, previous_cas: Option<u64>) -> Self {
        Self {
            data,
            flags,
            ttl,
            stored_at: Instant::now(),
            cas: cas::next_token(previous_cas),
        }
    }

    /// Returns the instant this entry stops being visible, or `None` if it never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        match self.ttl {
            0 => None,
            ttl if ttl < 0 => Some(self.stored_at),
            ttl => self
                .stored_at
                .checked_add(Duration::from_secs(ttl.unsigned_abs())),
        }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// A value returned by a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Bytes,
    pub flags: u32,
    pub data: Bytes,
    /// Present only for `gets`-style lookups
    pub cas: Option<u64>,
}

/// Where `append`/`prepend` put the new bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutateMode {
    Append,
    Prepend,
}

/// Result of a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Token matched, new version written
    Stored,
    /// Token was stale, nothing written
    Exists,
    /// No live entry under the key
    NotFound,
}

/// The shared entry store.
///
/// Wrap it in an `Arc` and hand a clone to every connection. All operations
/// take `&self` and are safe to call from any thread or task.
///
/// # Example
///
/// ```
/// use memkv::storage::{CasOutcome, StorageEngine};
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.store(Bytes::from("name"), 0, 0, Bytes::from("memkv"));
///
/// let items = engine.get_with_cas(&[Bytes::from("name")]);
/// let token = items[0].cas.unwrap();
///
/// let outcome = engine.compare_and_swap(Bytes::from("name"), 0, 0, Bytes::from("v2"), token);
/// assert_eq!(outcome, CasOutcome::Stored);
/// ```
pub struct StorageEngine {
    entries: Mutex<HashMap<Bytes, Entry>>,

    /// Statistics: keys found by get/gets
    get_hits: AtomicU64,

    /// Statistics: keys missing or expired on get/gets
    get_misses: AtomicU64,

    /// Statistics: successful writes of any kind
    stores: AtomicU64,

    /// Statistics: conditional writes whose precondition failed
    not_stored: AtomicU64,

    /// Statistics: cas calls rejected because of a stale token
    cas_mismatches: AtomicU64,

    /// Statistics: entries dropped by lazy expiry
    expired: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_hits", &self.get_hits.load(Ordering::Relaxed))
            .field("stores", &self.stores.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            get_hits: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            not_stored: AtomicU64::new(0),
            cas_mismatches: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Returns the live entry for `key`, removing it first if it has expired.
    ///
    /// Every public operation goes through here before it inspects an entry.
    fn live<'a>(
        &self,
        entries: &'a mut HashMap<Bytes, Entry>,
        key: &[u8],
        now: Instant,
    ) -> Option<&'a Entry> {
        let expired = entries.get(key)?.is_expired_at(now);
        if expired {
            entries.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        entries.get(key)
    }

    /// Checks if a live entry exists, reclaiming it if it has expired.
    pub fn exists(&self, key: &[u8]) -> bool {
        let mut entries = self.entries.lock();
        self.live(&mut entries, key, Instant::now()).is_some()
    }

    /// Returns `(key, flags, data)` for every live key, in request order.
    ///
    /// Missing and expired keys are skipped. A key listed twice is returned twice.
    pub fn get(&self, keys: &[Bytes]) -> Vec<Item> {
        self.lookup(keys, false)
    }

    /// Same as [`get`](Self::get) but each item also carries its CAS token.
    pub fn get_with_cas(&self, keys: &[Bytes]) -> Vec<Item> {
        self.lookup(keys, true)
    }

    fn lookup(&self, keys: &[Bytes], with_cas: bool) -> Vec<Item> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut items = Vec::with_capacity(keys.len());

        for key in keys {
            match self.live(&mut entries, key, now) {
                Some(entry) => {
                    self.get_hits.fetch_add(1, Ordering::Relaxed);
                    items.push(Item {
                        key: key.clone(),
                        flags: entry.flags,
                        data: entry.data.clone(),
                        cas: with_cas.then_some(entry.cas),
                    });
                }
                None => {
                    self.get_misses.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        items
    }

    /// Inserts or fully replaces the entry for `key`.
    pub fn store(&self, key: Bytes, flags: u32, ttl: i64, data: Bytes) {
        let mut entries = self.entries.lock();
        let previous = self.live(&mut entries, &key, Instant::now()).map(|e| e.cas);
        entries.insert(key, Entry::new(data, flags, ttl, previous));
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores only if no live entry exists (`add`).
    ///
    /// # Returns
    ///
    /// Returns `true` if the value was written.
    pub fn store_if_absent(&self, key: Bytes, flags: u32, ttl: i64, data: Bytes) -> bool {
        let mut entries = self.entries.lock();
        if self.live(&mut entries, &key, Instant::now()).is_some() {
            self.not_stored.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        entries.insert(key, Entry::new(data, flags, ttl, None));
        self.stores.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stores only if a live entry already exists (`replace`).
    ///
    /// # Returns
    ///
    /// Returns `true` if the value was written.
    pub fn store_if_present(&self, key: Bytes, flags: u32, ttl: i64, data: Bytes) -> bool {
        let mut entries = self.entries.lock();
        let Some(previous) = self.live(&mut entries, &key, Instant::now()).map(|e| e.cas) else {
            self.not_stored.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        entries.insert(key, Entry::new(data, flags, ttl, Some(previous)));
        self.stores.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Concatenates `data` onto a live entry (`append` / `prepend`).
    ///
    /// `flags` and `ttl` are refreshed along with the payload, and the entry
    /// gets a new timestamp and CAS token.
    ///
    /// # Returns
    ///
    /// Returns `true` if the entry existed and was updated.
    pub fn mutate_if_present(
        &self,
        key: Bytes,
        flags: u32,
        ttl: i64,
        data: Bytes,
        mode: MutateMode,
    ) -> bool {
        let mut entries = self.entries.lock();
        let Some(current) = self.live(&mut entries, &key, Instant::now()) else {
            self.not_stored.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let mut joined = BytesMut::with_capacity(current.data.len() + data.len());
        match mode {
            MutateMode::Append => {
                joined.extend_from_slice(&current.data);
                joined.extend_from_slice(&data);
            }
            MutateMode::Prepend => {
                joined.extend_from_slice(&data);
                joined.extend_from_slice(&current.data);
            }
        }

        let replacement = Entry::new(joined.freeze(), flags, ttl, Some(current.cas));
        entries.insert(key, replacement);
        self.stores.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Replaces a live entry only if its CAS token equals `expected`.
    pub fn compare_and_swap(
        &self,
        key: Bytes,
        flags: u32,
        ttl: i64,
        data: Bytes,
        expected: u64,
    ) -> CasOutcome {
        let mut entries = self.entries.lock();
        let Some(current) = self.live(&mut entries, &key, Instant::now()) else {
            return CasOutcome::NotFound;
        };

        if current.cas != expected {
            self.cas_mismatches.fetch_add(1, Ordering::Relaxed);
            return CasOutcome::Exists;
        }

        let replacement = Entry::new(data, flags, ttl, Some(current.cas));
        entries.insert(key, replacement);
        self.stores.fetch_add(1, Ordering::Relaxed);
        CasOutcome::Stored
    }

    /// Returns the number of entries in the map.
    ///
    /// Expired entries that have not been touched since they expired are
    /// still counted; they are only reclaimed on access.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            not_stored: self.not_stored.load(Ordering::Relaxed),
            cas_mismatches: self.cas_mismatches.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries currently in the map (including expired, not yet reclaimed)
    pub keys: u64,
    /// Keys found by get/gets
    pub get_hits: u64,
    /// Keys not found by get/gets
    pub get_misses: u64,
    /// Successful writes
    pub stores: u64,
    /// Conditional writes rejected by their precondition
    pub not_stored: u64,
    /// cas calls rejected because of a stale token
    pub cas_mismatches: u64,
    /// Entries reclaimed by lazy expiry
    pub expired: u64,
}
