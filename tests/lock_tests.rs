/// Distributed lock tests
///
/// Mutual exclusion and expiry of `DistributedLock` over the in-process store.
/// Run with: cargo test --test lock_tests

use shardgate::{DistributedLock, KeyValueStore, MemoryKvStore, RetryPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_acquire_has_single_winner() {
    let lock = Arc::new(DistributedLock::new(MemoryKvStore::new()));
    let num_tasks = 50;
    let barrier = Arc::new(Barrier::new(num_tasks));

    let mut handles = vec![];
    for _ in 0..num_tasks {
        let lock = Arc::clone(&lock);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            lock.try_acquire("cron:cleanup", Duration::from_secs(300)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_with_lock_serializes_critical_sections() {
    let lock = Arc::new(DistributedLock::new(Arc::new(MemoryKvStore::new())));
    let inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..8 {
        let lock = Arc::clone(&lock);
        let inside = Arc::clone(&inside);
        let completed = Arc::clone(&completed);
        handles.push(tokio::spawn(async move {
            let policy = RetryPolicy::new(500, Duration::from_millis(2));
            while !lock
                .acquire_with_retry("section", Duration::from_secs(10), policy)
                .await
            {}
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders at once");
            tokio::time::sleep(Duration::from_millis(5)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
            assert!(lock.release_with_retry("section", RetryPolicy::default()).await);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_lock_expires_after_ttl() {
    let lock = DistributedLock::new(MemoryKvStore::new());
    assert!(lock.try_acquire("lease", Duration::from_millis(30)).await);
    assert!(!lock.try_acquire("lease", Duration::from_millis(30)).await);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(lock.try_acquire("lease", Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_release_is_not_owner_checked() {
    let store = Arc::new(MemoryKvStore::new());
    let first = DistributedLock::new(Arc::clone(&store));
    let second = DistributedLock::new(Arc::clone(&store));

    assert!(first.try_acquire("shared", Duration::from_secs(300)).await);
    assert!(second.release("shared").await);
    assert!(second.try_acquire("shared", Duration::from_secs(300)).await);
}

#[tokio::test]
async fn test_sentinel_value_is_stored() {
    let store = Arc::new(MemoryKvStore::new());
    let lock = DistributedLock::new(Arc::clone(&store));
    assert!(lock.try_acquire("marker", Duration::from_secs(5)).await);
    assert_eq!(store.get("marker").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_with_lock_releases_with_configured_policy() {
    let lock = DistributedLock::new(MemoryKvStore::new())
        .with_release_policy(RetryPolicy::new(3, Duration::from_millis(10)));

    let result = lock
        .with_lock("import", Duration::from_secs(5), async { "imported" })
        .await;
    assert_eq!(result, Some("imported"));
    assert!(lock.store().get("import").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unbounded_ttl_is_accepted() {
    let lock = DistributedLock::new(MemoryKvStore::new());
    assert!(lock.try_acquire("forever", Duration::MAX).await);
    assert!(!lock.try_acquire("forever", Duration::from_secs(1)).await);
    assert!(lock.release("forever").await);
}
