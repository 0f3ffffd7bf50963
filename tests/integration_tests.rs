//! Integration tests for the ACME bucket cache

use acme_bucket_cache::prelude::{
    Cache, CacheError, Error, Lookup, MemoryBackend, MemoryStore, RetryPolicy, StorageCache, StorageError,
};
use acme_bucket_cache::storage::FaultPoint;
use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn new_cache() -> StorageCache<MemoryStore> {
    init_tracing();
    StorageCache::init_with_store(MemoryStore::new("certs"), "my-project")
        .await
        .expect("Failed to initialize cache")
}

#[test]
fn test_library_version() {
    assert!(!acme_bucket_cache::VERSION.is_empty());
    assert_eq!(acme_bucket_cache::CRATE_NAME, "acme-bucket-cache");
}

#[tokio::test]
async fn test_unwritten_key_is_a_miss() {
    let cache = new_cache().await;

    for key in ["example.org", "acme_account+key", "", "dir/with/slashes"] {
        let err = cache.get(key).await.unwrap_err();
        assert!(err.is_miss(), "expected miss for {:?}, got {:?}", key, err);
        assert!(cache.lookup(key).await.is_miss());
    }
}

#[tokio::test]
async fn test_overwrite_is_last_write_wins() {
    let cache = new_cache().await;

    assert_ok!(cache.put("example.org", Bytes::from_static(b"first")).await);
    assert_ok!(cache.put("example.org", Bytes::from_static(b"second")).await);

    assert_eq!(cache.get("example.org").await.unwrap(), Bytes::from_static(b"second"));
    assert_eq!(cache.store().object_count(), 1);
}

#[tokio::test]
async fn test_delete_then_get_is_a_miss() {
    let cache = new_cache().await;

    assert_ok!(cache.put("example.org", Bytes::from_static(b"cert")).await);
    assert_ok!(cache.delete("example.org").await);

    assert!(cache.get("example.org").await.unwrap_err().is_miss());
    assert!(!cache.store().contains("example.org"));
}

#[tokio::test]
async fn test_delete_unwritten_key_propagates_not_found() {
    let cache = new_cache().await;

    let err = assert_err!(cache.delete("never-written").await);
    assert!(err.is_not_found());
    assert!(matches!(err, StorageError::ObjectNotFound { ref key, .. } if key == "never-written"));
}

#[tokio::test]
async fn test_init_twice_is_idempotent() {
    init_tracing();
    let backend = MemoryBackend::new();

    let first = StorageCache::init_with_store(backend.bucket("certs"), "my-project").await;
    let second = StorageCache::init_with_store(backend.bucket("certs"), "my-project").await;
    let first = assert_ok!(first);
    let second = assert_ok!(second);

    // Both handles see the same bucket
    assert_ok!(first.put("example.org", Bytes::from_static(b"cert")).await);
    assert_eq!(second.get("example.org").await.unwrap(), Bytes::from_static(b"cert"));
}

#[tokio::test]
async fn test_init_surfaces_other_creation_failures() {
    init_tracing();
    let backend = MemoryBackend::new();
    backend.inject_fault(FaultPoint::CreateBucket, 1);

    let result = StorageCache::init_with_store(backend.bucket("certs"), "my-project").await;
    assert!(matches!(result, Err(StorageError::OperationFailed { .. })));
    assert!(!backend.bucket_exists("certs"));
}

#[tokio::test]
async fn test_unreachable_backend_fails_every_operation() {
    let cache = new_cache().await;
    cache.store().backend().set_reachable(false);

    let err = cache.get("example.org").await.unwrap_err();
    assert!(!err.is_miss());
    assert!(matches!(cache.lookup("example.org").await, Lookup::Failure(StorageError::ConnectionError { .. })));
    assert_err!(cache.put("example.org", Bytes::from_static(b"cert")).await);
    assert_err!(cache.delete("example.org").await);
}

#[tokio::test]
async fn test_failed_open_is_not_retried_by_default() {
    let cache = new_cache().await;
    assert_ok!(cache.put("example.org", Bytes::from_static(b"cert")).await);

    cache.store().backend().inject_fault(FaultPoint::Open, 1);
    assert!(!cache.get("example.org").await.unwrap_err().is_miss());

    // The injected fault was consumed by the single attempt
    assert_eq!(cache.get("example.org").await.unwrap(), Bytes::from_static(b"cert"));
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retry_policy() {
    let cache = new_cache()
        .await
        .with_retry_policy(RetryPolicy::bounded(1, Duration::from_millis(50)));

    cache.store().backend().inject_fault(FaultPoint::Delete, 1);
    assert_ok!(cache.put("example.org", Bytes::from_static(b"cert")).await);
    assert_ok!(cache.delete("example.org").await);

    cache.store().backend().inject_fault(FaultPoint::Write, 2);
    assert_err!(cache.put("example.org", Bytes::from_static(b"cert")).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_leave_one_value() {
    let cache = Arc::new(new_cache().await);
    let v1 = Bytes::from(vec![1u8; 64 * 1024]);
    let v2 = Bytes::from(vec![2u8; 64 * 1024]);

    for _ in 0..20 {
        let (a, b) = (cache.clone(), cache.clone());
        let (d1, d2) = (v1.clone(), v2.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.put("example.org", d1).await }),
            tokio::spawn(async move { b.put("example.org", d2).await }),
        );
        assert_ok!(r1.unwrap());
        assert_ok!(r2.unwrap());

        let stored = cache.get("example.org").await.unwrap();
        assert!(stored == v1 || stored == v2, "value was corrupted");
    }
}

#[tokio::test]
async fn test_concurrent_mixed_keys() {
    let cache = new_cache().await;

    let puts = (0..32).map(|i| {
        let cache = cache.clone();
        async move { cache.put(&format!("domain-{i}.example"), Bytes::from(format!("cert-{i}"))).await }
    });
    for result in futures::future::join_all(puts).await {
        assert_ok!(result);
    }

    for i in 0..32 {
        let data = cache.get(&format!("domain-{i}.example")).await.unwrap();
        assert_eq!(data, Bytes::from(format!("cert-{i}")));
    }
}

#[tokio::test]
async fn test_shared_through_cache_trait() {
    let cache: Arc<dyn Cache> = Arc::new(new_cache().await);

    assert!(cache.get("example.org").await.unwrap_err().is_miss());
    assert_ok!(cache.put("example.org", Bytes::from_static(b"cert")).await);
    assert_eq!(cache.get("example.org").await.unwrap(), Bytes::from_static(b"cert"));
    assert_ok!(cache.delete("example.org").await);
}

#[test]
fn test_error_types() {
    let error = Error::from(CacheError::CacheMiss);
    assert!(error.to_string().contains("cache miss"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_put_then_get_returns_payload(key in ".*", payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let stored = rt.block_on(async {
            let cache = StorageCache::init_with_store(MemoryStore::new("certs"), "my-project").await.unwrap();
            cache.put(&key, Bytes::from(payload.clone())).await.unwrap();
            cache.get(&key).await.unwrap()
        });
        prop_assert_eq!(stored.to_vec(), payload);
    }
}

#[cfg(feature = "s3")]
mod s3_init {
    use super::*;
    use acme_bucket_cache::prelude::{S3Config, S3Store};
    use std::process::Command;

    const CHILD_ENV: &str = "ACME_BUCKET_CACHE_FATAL_INIT_CHILD";

    #[tokio::test]
    async fn test_init_with_unusable_client_aborts_process() {
        if std::env::var_os(CHILD_ENV).is_some() {
            let config = S3Config {
                bucket: "certs".to_string(),
                region: String::new(),
                ..Default::default()
            };
            let _ = StorageCache::init_with_config(config, "my-project").await;
            unreachable!("init must terminate the process when the client cannot be built");
        }

        let exe = std::env::current_exe().unwrap();
        let status = Command::new(exe)
            .args(["s3_init::test_init_with_unusable_client_aborts_process", "--exact", "--test-threads=1"])
            .env(CHILD_ENV, "1")
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(1));
    }

    #[tokio::test]
    async fn test_init_without_credentials_aborts_process() {
        if std::env::var_os(CHILD_ENV).is_some() {
            let config = S3Config {
                bucket: "certs".to_string(),
                region: "eu-west-1".to_string(),
                ..Default::default()
            };

            let result = S3Store::connect(config.clone()).await;
            assert!(matches!(result, Err(StorageError::ConnectionError { .. })));

            let _ = StorageCache::init_with_config(config, "my-project").await;
            unreachable!("init must terminate the process when no credentials resolve");
        }

        // Nothing for the default provider chain to find
        let exe = std::env::current_exe().unwrap();
        let status = Command::new(exe)
            .args(["s3_init::test_init_without_credentials_aborts_process", "--exact", "--test-threads=1"])
            .env_clear()
            .env(CHILD_ENV, "1")
            .env("HOME", "/nonexistent")
            .env("AWS_CONFIG_FILE", "/nonexistent/config")
            .env("AWS_SHARED_CREDENTIALS_FILE", "/nonexistent/credentials")
            .env("AWS_EC2_METADATA_DISABLED", "true")
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(1));
    }
}
