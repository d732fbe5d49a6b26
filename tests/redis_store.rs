//! Redis backend integration tests.
//!
//! These need a live Redis server and are ignored by default. Run with:
//!
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_store -- --ignored
//! ```
//!
//! Keys are prefixed per test with a random run id so concurrent runs
//! against a shared server do not collide.

use std::time::Duration;

use parlo_core::cache::{CacheStore, RedisStore};

async fn store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisStore::connect(&url)
        .await
        .expect("redis server reachable")
}

fn test_key(suffix: &str) -> String {
    format!("parlo:test:{}:{suffix}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires a live redis server"]
async fn get_set_delete_round_trip() {
    let store = store().await;
    let key = test_key("kv");

    assert_eq!(store.get(&key).await.unwrap(), None);
    store.set(&key, "value", None).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("value"));
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a live redis server"]
async fn sub_second_ttl_rounds_up_instead_of_vanishing() {
    let store = store().await;
    let key = test_key("ttl");

    store
        .set(&key, "short-lived", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    // Rounded up to 1s, so it is still visible immediately.
    assert!(store.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a live redis server"]
async fn incr_and_expire_behave_like_a_quota_counter() {
    let store = store().await;
    let key = test_key("quota");

    assert_eq!(store.incr_by(&key, 1).await.unwrap(), 1);
    assert_eq!(store.incr_by(&key, 1).await.unwrap(), 2);
    assert!(store.expire(&key, Duration::from_secs(60)).await.unwrap());
    assert!(!store
        .expire(&test_key("missing"), Duration::from_secs(60))
        .await
        .unwrap());

    store.delete(&key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a live redis server"]
async fn set_nx_and_compare_and_delete_implement_the_lock_protocol() {
    let store = store().await;
    let key = test_key("lock");
    let ttl = Duration::from_secs(30);

    assert!(store.set_nx(&key, "holder-a", ttl).await.unwrap());
    assert!(!store.set_nx(&key, "holder-b", ttl).await.unwrap());

    // Wrong token cannot release; right token can.
    assert!(!store.delete_if_equals(&key, "holder-b").await.unwrap());
    assert!(store.delete_if_equals(&key, "holder-a").await.unwrap());
    assert!(store.set_nx(&key, "holder-b", ttl).await.unwrap());

    store.delete(&key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a live redis server"]
async fn hash_and_set_primitives() {
    let store = store().await;
    let hash_key = test_key("hash");
    let set_key = test_key("set");

    store
        .hash_set(&hash_key, "streak_days", "4", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(
        store.hash_get(&hash_key, "streak_days").await.unwrap().as_deref(),
        Some("4")
    );
    assert_eq!(store.hash_get(&hash_key, "missing").await.unwrap(), None);

    assert!(store.set_add(&set_key, "token-1", None).await.unwrap());
    assert!(!store.set_add(&set_key, "token-1", None).await.unwrap());
    assert!(store.set_contains(&set_key, "token-1").await.unwrap());
    assert!(!store.set_contains(&set_key, "token-2").await.unwrap());

    store.delete(&hash_key).await.unwrap();
    store.delete(&set_key).await.unwrap();
}
