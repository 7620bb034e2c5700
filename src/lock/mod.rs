//! Advisory mutual exclusion on top of a shared key-value store.
//!
//! A lock is a single key created with set-if-absent plus a TTL. Whoever
//! creates the key holds the lock until it is deleted or expires.
//!
//! # Caveats
//!
//! - The key carries no owner token. `release` deletes it unconditionally,
//!   so a holder whose TTL lapsed can delete a lock that now belongs to
//!   someone else.
//! - A holder that runs longer than the TTL loses exclusivity silently.
//! - There is no fencing token; downstream writes are not protected against
//!   a paused holder.
//! - A crashed holder blocks others until the TTL expires.
//! - Exclusion is only as strong as the store: a failover that drops the key
//!   lets a second caller acquire.

use crate::kv::KeyValueStore;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Value stored under every lock key.
pub const LOCK_SENTINEL: &str = "1";

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10))
    }
}

/// Named locks backed by a [`KeyValueStore`].
///
/// See the module docs for what this lock does and does not guarantee.
pub struct DistributedLock<S> {
    store: S,
    release_policy: RetryPolicy,
}

impl<S: KeyValueStore> DistributedLock<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            release_policy: RetryPolicy::default(),
        }
    }

    /// Policy used by [`with_lock`](Self::with_lock) when releasing.
    pub fn with_release_policy(mut self, policy: RetryPolicy) -> Self {
        self.release_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tries once to take `name` for `ttl`.
    ///
    /// Returns `true` iff this call created the lock key. Contention and store
    /// failures both yield `false`; a failure after the server applied the
    /// write may leave the lock held until it expires.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> bool {
        let ttl = ttl.max(Duration::from_millis(1));
        match self.store.set_if_absent(name, LOCK_SENTINEL, ttl).await {
            Ok(acquired) => {
                debug!(lock = name, acquired, "try_acquire");
                acquired
            }
            Err(e) => {
                warn!(lock = name, error = %e, "Lock acquire failed");
                false
            }
        }
    }

    /// Polls [`try_acquire`](Self::try_acquire) under `policy`.
    pub async fn acquire_with_retry(&self, name: &str, ttl: Duration, policy: RetryPolicy) -> bool {
        for attempt in 1..=policy.attempts.max(1) {
            if self.try_acquire(name, ttl).await {
                return true;
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }
        false
    }

    /// Deletes the lock key, returning `true` iff an entry was removed.
    ///
    /// Ownership is not checked.
    pub async fn release(&self, name: &str) -> bool {
        match self.store.delete(name).await {
            Ok(removed) => {
                debug!(lock = name, removed, "release");
                removed
            }
            Err(e) => {
                warn!(lock = name, error = %e, "Lock release failed");
                false
            }
        }
    }

    /// Repeats [`release`](Self::release) until it reports a removal or the
    /// attempts run out.
    pub async fn release_with_retry(&self, name: &str, policy: RetryPolicy) -> bool {
        for attempt in 1..=policy.attempts.max(1) {
            if self.release(name).await {
                return true;
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }
        warn!(lock = name, attempts = policy.attempts, "Lock not released");
        false
    }

    /// Runs `work` while holding `name`.
    ///
    /// Returns `None` without running `work` when the lock is taken. The lock
    /// is released afterwards with the configured release policy.
    pub async fn with_lock<F, T>(&self, name: &str, ttl: Duration, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        if !self.try_acquire(name, ttl).await {
            return None;
        }
        let output = work.await;
        self.release_with_retry(name, self.release_policy).await;
        Some(output)
    }
}
