use super::KeyValueStore;
use crate::core::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Every this many writes, expired entries are swept from the whole map.
pub const PURGE_INTERVAL: usize = 1024;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    /// A TTL too large for `Instant` means no expiry.
    fn new(value: &str, now: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// In-process key-value store with TTL support.
///
/// Expired entries are evicted when their key is touched, and the whole map
/// is swept every [`PURGE_INTERVAL`] writes. Useful for single-process
/// deployments and for tests; it offers no cross-process exclusion.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.lock()?;
        Ok(entries.values().filter(|entry| entry.is_live(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn insert(&self, entries: &mut HashMap<String, Entry>, key: &str, entry: Entry, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_INTERVAL == 0 {
            entries.retain(|_, entry| entry.is_live(now));
        }
        entries.insert(key.to_string(), entry);
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        self.insert(&mut entries, key, Entry::new(value, now, Some(ttl)), now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        Ok(entries.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;
        self.insert(&mut entries, key, Entry::new(value, now, ttl), now);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
