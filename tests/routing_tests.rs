/// Shard routing tests
///
/// Drives `ShardRouter` and `Cluster` through an in-memory connector that
/// stands in for one table per shard.
/// Run with: cargo test --test routing_tests

use async_trait::async_trait;
use shardgate::{
    Cluster, IdGenerator, MemoryKvStore, Result, ShardClusterConfig, ShardConnector,
    ShardEndpoint, ShardError, ShardRouter, fingerprint,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    id: i64,
    name: String,
}

/// One shard's `user` table.
#[derive(Default)]
struct FakeShard {
    users: Mutex<Vec<User>>,
    down: AtomicBool,
}

impl FakeShard {
    fn insert(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    async fn select_all(&self) -> std::result::Result<Vec<User>, String> {
        tokio::task::yield_now().await;
        if self.down.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        Ok(self.users.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct FakeConnector {
    opened: AtomicUsize,
    refuse: Option<u32>,
}

#[async_trait]
impl ShardConnector for FakeConnector {
    type Handle = Arc<FakeShard>;

    async fn connect(&self, endpoint: &ShardEndpoint, _: &ShardClusterConfig) -> Result<Arc<FakeShard>> {
        if self.refuse == Some(endpoint.index) {
            return Err(ShardError::Store(format!("{}:{} refused", endpoint.host, endpoint.port)));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeShard::default()))
    }
}

fn cluster_config(shards: u32) -> ShardClusterConfig {
    (0..shards).fold(ShardClusterConfig::new("root", "123456", "test"), |config, i| {
        config.host(i, &format!("127.0.0.1:{}", 3306 + i))
    })
}

async fn open_router(shards: u32) -> ShardRouter<FakeConnector> {
    let router = ShardRouter::new(cluster_config(shards), FakeConnector::default());
    router.open().await.unwrap();
    router
}

#[tokio::test]
async fn test_two_shard_placement() {
    let router = open_router(2).await;
    for (name, shard) in [("cs01", 1), ("cs02", 0), ("yang", 1), ("ycs01", 0), ("ycs02", 1)] {
        assert_eq!(router.shard_index_for(name).unwrap(), shard, "placement of {}", name);
    }
}

#[tokio::test]
async fn test_placement_matches_fingerprint_modulo() {
    for shards in 1..=7 {
        let router = open_router(shards).await;
        for i in 0..200 {
            let name = format!("user-{}@example.com", i);
            let expected = (fingerprint(&name).unwrap().value() % shards as u128) as u32;
            assert_eq!(router.shard_index_for(&name).unwrap(), expected);
            assert!(router.shard_index_for(&name).unwrap() < shards);
        }
    }
}

#[tokio::test]
async fn test_resolve_returns_owning_handle() {
    let router = open_router(2).await;
    let names = ["yang", "ycs01", "ycs02", "cs01", "cs02"];
    for (id, name) in names.iter().enumerate() {
        router.resolve(name).unwrap().insert(User {
            id: id as i64,
            name: name.to_string(),
        });
    }

    for name in names {
        let shard = router.resolve(name).unwrap();
        let users = shard.select_all().await.unwrap();
        assert!(users.iter().any(|u| u.name == name));
    }
}

#[tokio::test]
async fn test_scatter_gather_collects_every_shard() {
    let router = open_router(3).await;
    for (id, name) in ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"].iter().enumerate() {
        router.resolve(name).unwrap().insert(User {
            id: id as i64,
            name: name.to_string(),
        });
    }

    let gathered = router
        .scatter_gather(|_, shard| async move { shard.select_all().await })
        .await;
    assert!(gathered.is_complete());

    let (rows, err) = gathered.into_result();
    assert!(err.is_none());
    let ids: HashSet<i64> = rows.iter().map(|u| u.id).collect();
    assert_eq!(ids, (0..6).collect());
}

#[tokio::test]
async fn test_scatter_gather_keeps_rows_of_healthy_shards() {
    let router = open_router(3).await;
    for (index, handle) in router.all_handles().iter().enumerate() {
        handle.insert(User {
            id: index as i64,
            name: format!("on-{}", index),
        });
    }
    router.handle(1).unwrap().down.store(true, Ordering::SeqCst);
    router.handle(2).unwrap().down.store(true, Ordering::SeqCst);

    let gathered = router
        .scatter_gather(|index, shard| async move {
            shard
                .select_all()
                .await
                .map_err(|e| format!("shard {}: {}", index, e))
        })
        .await;

    assert_eq!(gathered.failed_shards(), vec![1, 2]);
    let (rows, err) = gathered.into_result();
    assert_eq!(rows, vec![User { id: 0, name: "on-0".into() }]);
    assert_eq!(err.as_deref(), Some("shard 1: connection refused"));
}

#[tokio::test]
async fn test_scatter_gather_before_open_is_empty() {
    let router = ShardRouter::new(cluster_config(2), FakeConnector::default());
    let gathered = router
        .scatter_gather(|_, shard| async move { shard.select_all().await })
        .await;
    assert!(gathered.rows().is_empty());
    assert!(gathered.is_complete());
}

#[tokio::test]
async fn test_failed_shard_aborts_open() {
    let connector = FakeConnector {
        refuse: Some(1),
        ..FakeConnector::default()
    };
    let router = ShardRouter::new(cluster_config(3), connector);

    let err = router.open().await.unwrap_err();
    assert!(matches!(err, ShardError::Connectivity { shard: 1, .. }));
    assert!(!router.is_open());
    assert!(router.all_handles().is_empty());
}

#[tokio::test]
async fn test_concurrent_open_connects_once() {
    let router = Arc::new(ShardRouter::new(cluster_config(4), FakeConnector::default()));

    let mut handles = vec![];
    for _ in 0..8 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move { router.open().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(router.shard_count(), 4);
}

#[tokio::test]
async fn test_cluster_insert_and_list_users() {
    let cluster = Cluster::open(
        cluster_config(2).worker_id(7),
        FakeConnector::default(),
        MemoryKvStore::new(),
    )
    .await
    .unwrap();

    for name in ["yang", "ycs01", "ycs02"] {
        let id = cluster.next_id().unwrap();
        assert_eq!(cluster.ids().decompose(id).worker_id, 7);
        cluster.router().resolve(name).unwrap().insert(User {
            id,
            name: name.to_string(),
        });
    }

    let (users, err) = cluster
        .router()
        .scatter_gather(|_, shard| async move { shard.select_all().await })
        .await
        .into_result();
    assert!(err.is_none());
    assert_eq!(users.len(), 3);

    assert!(cluster.try_lock("user:yang", Duration::from_secs(300)).await);
    assert!(!cluster.try_lock("user:yang", Duration::from_secs(300)).await);
    assert!(cluster.unlock("user:yang").await);
}

#[tokio::test]
async fn test_cluster_rejects_bad_worker_id() {
    let result = Cluster::open(
        cluster_config(1).worker_id(4096),
        FakeConnector::default(),
        MemoryKvStore::new(),
    )
    .await;
    assert!(matches!(result, Err(ShardError::Config(_))));
}

#[test]
fn test_ids_are_unique_across_threads() {
    let ids = Arc::new(shardgate::SnowflakeIdGenerator::new(1).unwrap());
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let ids = Arc::clone(&ids);
            std::thread::spawn(move || (0..5000).map(|_| ids.next_id().unwrap()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for thread in threads {
        for id in thread.join().unwrap() {
            assert!(seen.insert(id));
        }
    }
}
