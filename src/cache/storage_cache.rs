//! Object-storage backed certificate cache

use crate::cache::{Cache, Lookup};
use crate::error::{CacheError, CacheResult, StorageError, StorageResult};
use crate::storage::storage_api::{with_retry, ObjectReader, ObjectStore, ObjectWriter, RetryPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info};

#[cfg(feature = "s3")]
use crate::config::CacheConfig;
#[cfg(feature = "s3")]
use crate::storage::storage_s3::{S3Config, S3Store};

/// Certificate cache storing each entry as one object in a bucket.
///
/// The store handle is fixed at construction and never mutated, so a cache
/// can be cloned or shared behind an `Arc` across concurrent callers. The
/// cache adds no locking of its own: concurrent writes to one key resolve
/// the way the backing store resolves them.
#[derive(Debug, Clone)]
pub struct StorageCache<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: ObjectStore> StorageCache<S> {
    /// Wrap a store handle without contacting the backend
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::none(),
        }
    }

    /// Wrap a store handle and make sure its bucket exists under `owner`.
    ///
    /// Calling this again for a bucket the owner already holds succeeds.
    pub async fn init_with_store(store: S, owner: &str) -> StorageResult<Self> {
        let cache = Self::new(store);
        cache.ensure_bucket(owner).await?;
        Ok(cache)
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying store handle
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Name of the backing bucket
    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Active retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create the bucket, treating "already owned by `owner`" as success
    pub async fn ensure_bucket(&self, owner: &str) -> StorageResult<()> {
        match self.store.create_bucket(owner).await {
            Ok(()) => {
                info!(bucket = self.bucket(), owner, "certs bucket created");
                Ok(())
            }
            Err(StorageError::BucketAlreadyOwned { .. }) => {
                debug!(bucket = self.bucket(), owner, "certs bucket already owned");
                Ok(())
            }
            Err(e) => {
                error!(bucket = self.bucket(), owner, error = %e, "failed to create certs bucket");
                Err(e)
            }
        }
    }

    /// Fetch the value stored under `key`
    pub async fn get(&self, key: &str) -> CacheResult<Bytes> {
        info!(bucket = self.bucket(), key, "fetching from cache");
        with_retry(&self.retry, "get", || self.fetch(key)).await
    }

    /// Fetch the value stored under `key` as a tagged [`Lookup`]
    pub async fn lookup(&self, key: &str) -> Lookup {
        self.get(key).await.into()
    }

    /// Store `data` under `key`, overwriting unconditionally
    pub async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        info!(bucket = self.bucket(), key, size = data.len(), "putting into cache");
        with_retry(&self.retry, "put", || self.upload(key, &data)).await
    }

    /// Delete the object stored under `key`
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        info!(bucket = self.bucket(), key, "deleting from cache");
        with_retry(&self.retry, "delete", || self.remove(key)).await
    }

    async fn fetch(&self, key: &str) -> CacheResult<Bytes> {
        let reader = match self.store.open_reader(key).await {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                debug!(bucket = self.bucket(), key, "cache miss");
                return Err(CacheError::CacheMiss);
            }
            Err(e) => {
                error!(bucket = self.bucket(), key, error = %e, "failed fetching from cache");
                return Err(e.into());
            }
        };

        reader.read_all().await.map_err(|e| {
            error!(bucket = self.bucket(), key, error = %e, "failed reading from cache");
            CacheError::from(e)
        })
    }

    async fn upload(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let mut writer = self.store.open_writer(key);

        // A failed write leaves the object in whatever state the backend left it
        if let Err(e) = writer.write(data).await {
            error!(bucket = self.bucket(), key, error = %e, "failed writing to cache");
            return Err(e);
        }

        if let Err(e) = writer.close().await {
            error!(bucket = self.bucket(), key, error = %e, "failed closing object in cache");
            return Err(e);
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.store.delete_object(key).await.map_err(|e| {
            error!(bucket = self.bucket(), key, error = %e, "failed deleting from cache");
            e
        })
    }
}

#[cfg(feature = "s3")]
impl StorageCache<S3Store> {
    /// Connect to S3 and make sure `bucket` exists.
    ///
    /// A non-empty `owner` is used as the expected bucket owner on every
    /// object request. If the client cannot be built the process exits.
    pub async fn init(bucket: &str, owner: &str) -> StorageResult<Self> {
        let config = S3Config {
            bucket: bucket.to_string(),
            expected_bucket_owner: (!owner.is_empty()).then(|| owner.to_string()),
            ..Default::default()
        };
        Self::init_with_config(config, owner).await
    }

    /// Connect with an explicit S3 configuration. If the client cannot be built the process exits.
    pub async fn init_with_config(config: S3Config, owner: &str) -> StorageResult<Self> {
        let store = match S3Store::connect(config).await {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "failed to create storage client");
                std::process::exit(1);
            }
        };

        Self::init_with_store(store, owner).await
    }

    /// Connect using a [`CacheConfig`], applying its retry policy
    pub async fn from_config(config: &CacheConfig) -> StorageResult<Self> {
        let cache = Self::init_with_config(config.s3_config(), &config.owner).await?;
        Ok(cache.with_retry_policy(config.retry.clone()))
    }
}

#[async_trait]
impl<S: ObjectStore> Cache for StorageCache<S> {
    async fn get(&self, key: &str) -> CacheResult<Bytes> {
        StorageCache::get(self, key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        StorageCache::put(self, key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        StorageCache::delete(self, key).await
    }
}
