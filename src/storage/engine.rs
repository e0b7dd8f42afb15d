//! Thread-Safe Storage Engine with Expiry Support
//!
//! A concurrent map from key to [`Entry`] with per-key expiry.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over independent shards, each behind
//!    its own `RwLock`, so operations on different keys rarely contend.
//! 2. **Lazy Expiry**: An entry whose expiry instant has passed is treated as
//!    absent by every read and is removed by the `get` that observes it.
//! 3. **Whole-Entry Writes**: value and expiry are replaced together under the
//!    shard's write lock, so no reader sees a value paired with another
//!    writer's expiry.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with optional expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry that expires `ttl` from now.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Checks whether this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardMap>,
}

impl Shard {
    // Every store operation leaves the map consistent before it can panic,
    // so a poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The key-value store shared by every connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task. All
/// operations are total: none of them fail.
///
/// # Example
///
/// ```
/// use redkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.get(b"session").is_some());
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();
        Self { shards }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Stores `value` under `key` with no expiry.
    ///
    /// Any previous value and any previous expiry on the key are replaced.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.insert(key, Entry::new(value));
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.insert(key, Entry::with_ttl(value, ttl));
    }

    /// Installs an entry with an absolute expiry instant.
    ///
    /// Used to seed the store from a snapshot before connections are accepted.
    pub fn load(&self, key: Bytes, value: Bytes, expires_at: Option<Instant>) {
        self.insert(key, Entry { value, expires_at });
    }

    fn insert(&self, key: Bytes, entry: Entry) {
        let shard = self.get_shard(&key);
        shard.write().insert(key, entry);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed as part of this call.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key, applying the same lazy expiry as `get`.
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let shard = self.get_shard(key);

        // Fast path: shared lock for missing or live keys.
        {
            let data = shard.read();
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        // The entry looked expired; recheck under the write lock because a
        // writer may have replaced it in between.
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Returns the keys matching `pattern`.
    ///
    /// Only the match-all pattern `*` is supported; any other pattern yields
    /// an empty list. Expired entries that have not been evicted yet are not
    /// listed. The result is a snapshot, not a live view.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        if pattern != "*" {
            return Vec::new();
        }

        // Hold every shard's read lock so the listing is one consistent cut.
        let guards: Vec<_> = self.shards.iter().map(Shard::read).collect();

        let now = Instant::now();
        guards
            .iter()
            .flat_map(|data| data.iter())
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of physically stored entries, including expired
    /// ones that have not been evicted yet.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Removes every expired entry from all shards.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut cleaned = 0;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += before - data.len();
        }

        cleaned
    }
}
