//! Certificate cache contract and its object-storage implementation
//!
//! The certificate-issuance workflow consumes a three-operation cache:
//! fetch, store and delete by key. [`Cache`] is that contract, and
//! [`StorageCache`] fulfils it on top of any [`ObjectStore`](crate::storage::ObjectStore).
//!
//! # Example
//!
//! ```rust
//! use acme_bucket_cache::cache::{Lookup, StorageCache};
//! use acme_bucket_cache::storage::MemoryStore;
//! use bytes::Bytes;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = StorageCache::init_with_store(MemoryStore::new("certs"), "my-project").await?;
//!
//! assert!(cache.get("example.org").await.unwrap_err().is_miss());
//!
//! cache.put("example.org", Bytes::from_static(b"-----BEGIN CERTIFICATE-----")).await?;
//! match cache.lookup("example.org").await {
//!     Lookup::Hit(data) => assert!(data.starts_with(b"-----BEGIN")),
//!     other => panic!("unexpected lookup result: {:?}", other),
//! }
//!
//! cache.delete("example.org").await?;
//! # Ok(())
//! # }
//! ```

pub mod storage_cache;

pub use storage_cache::StorageCache;

use crate::error::{CacheError, CacheResult, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Key-value cache consumed by the certificate-issuance workflow.
///
/// Keys are opaque and used verbatim; values are opaque bytes.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the value for `key`. A missing value is [`CacheError::CacheMiss`].
    async fn get(&self, key: &str) -> CacheResult<Bytes>;

    /// Store `data` under `key`, overwriting any previous value.
    /// Any error means the value is not guaranteed to be stored.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Remove `key`. Any error means the value may still be present.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Tagged outcome of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    /// Value found
    Hit(Bytes),
    /// Nothing stored for the key
    Miss,
    /// The store could not answer
    Failure(StorageError),
}

impl Lookup {
    /// Whether the lookup found a value
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Whether the lookup was a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// The value, if found
    pub fn into_hit(self) -> Option<Bytes> {
        match self {
            Self::Hit(data) => Some(data),
            _ => None,
        }
    }
}

impl From<CacheResult<Bytes>> for Lookup {
    fn from(result: CacheResult<Bytes>) -> Self {
        match result {
            Ok(data) => Self::Hit(data),
            Err(CacheError::CacheMiss) => Self::Miss,
            Err(CacheError::Storage(e)) => Self::Failure(e),
        }
    }
}
