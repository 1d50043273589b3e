//! Key-Value Store with Lazy Expiry
//!
//! A plain `HashMap` of string values, each with an optional absolute
//! expiry instant. Expired entries are removed only when a read observes
//! them; nothing sweeps the map in the background.
//!
//! ## Ownership
//!
//! A [`KeyValueStore`] has a single owner and all operations take
//! `&mut self`. Sessions reach it through a [`StoreHandle`], which either
//! owns a private store or locks one that is shared process-wide,
//! depending on the configured [`StoreScope`].

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl StoreEntry {
    /// Creates an entry that expires `ttl` after `now`.
    ///
    /// A TTL too large to represent as an `Instant` never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// An entry is visible only while its expiry is absent or strictly in
    /// the future.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// The string key space of one store instance.
///
/// # Example
///
/// ```
/// use emberkv::storage::KeyValueStore;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let mut store = KeyValueStore::new();
/// store.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(store.get(b"name"), Some(Bytes::from("Ariz")));
///
/// store.set(Bytes::from("session"), Bytes::from("abc"), Some(Duration::from_secs(60)));
/// assert!(store.get(b"session").is_some());
/// ```
#[derive(Debug, Default)]
pub struct KeyValueStore {
    data: HashMap<Bytes, StoreEntry>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`, measuring the TTL from now.
    pub fn set(&mut self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Inserts or overwrites `key`, measuring the TTL from `now`.
    pub fn set_at(&mut self, key: Bytes, value: Bytes, ttl: Option<Duration>, now: Instant) {
        self.data.insert(key, StoreEntry::new(value, ttl, now));
    }

    /// Reads `key` as of the current instant.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    /// Reads `key` as observed at `now`.
    ///
    /// An entry found expired is removed before `None` is returned.
    pub fn get_at(&mut self, key: &[u8], now: Instant) -> Option<Bytes> {
        let entry = self.data.get(key)?;
        if !entry.is_expired_at(now) {
            return Some(entry.value.clone());
        }

        self.data.remove(key);
        trace!(key = %String::from_utf8_lossy(key), "Evicted expired key");
        None
    }

    /// Whether an entry for `key` is physically present, expired or not.
    pub fn contains_entry(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    /// Number of entries held, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Whether sessions get a private store or share one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreScope {
    /// Each session starts with its own empty store
    #[default]
    PerConnection,
    /// All sessions read and write one process-wide store
    Shared,
}

/// A store shared between sessions.
pub type SharedStore = Arc<Mutex<KeyValueStore>>;

/// Hands out a [`StoreHandle`] for every new session.
#[derive(Debug, Clone, Default)]
pub struct StoreFactory {
    shared: Option<SharedStore>,
}

impl StoreFactory {
    pub fn new(scope: StoreScope) -> Self {
        let shared = match scope {
            StoreScope::PerConnection => None,
            StoreScope::Shared => Some(SharedStore::default()),
        };
        Self { shared }
    }

    pub fn scope(&self) -> StoreScope {
        match self.shared {
            Some(_) => StoreScope::Shared,
            None => StoreScope::PerConnection,
        }
    }

    /// Opens the store for one session.
    pub fn open(&self) -> StoreHandle {
        match &self.shared {
            Some(store) => StoreHandle::Shared(Arc::clone(store)),
            None => StoreHandle::Owned(KeyValueStore::new()),
        }
    }
}

/// A session's access to its store.
///
/// Each call completes one store operation; a shared store is locked for
/// exactly that long.
#[derive(Debug)]
pub enum StoreHandle {
    Owned(KeyValueStore),
    Shared(SharedStore),
}

impl StoreHandle {
    pub fn set(&mut self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        self.with(|store| store.set(key, value, ttl))
    }

    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        self.with(|store| store.get(key))
    }

    pub fn len(&mut self) -> usize {
        self.with(|store| store.len())
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn with<R>(&mut self, f: impl FnOnce(&mut KeyValueStore) -> R) -> R {
        match self {
            StoreHandle::Owned(store) => f(store),
            StoreHandle::Shared(store) => f(&mut *lock(store)),
        }
    }
}

/// Store operations cannot leave the map half-updated, so a poisoned lock
/// is still safe to use.
fn lock(store: &SharedStore) -> MutexGuard<'_, KeyValueStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
