//! # ACME Bucket Cache
//!
//! Persistence for automatic TLS certificate management: certificate and
//! account data produced by an ACME issuance workflow is kept as objects in a
//! shared bucket instead of on the local filesystem.
//!
//! ## Features
//!
//! - **Cache Module**: The three-operation cache contract (get, put, delete) and
//!   the object-storage adapter implementing it
//! - **Storage Module**: The backing-store contract with in-memory and S3 backends
//! - **Config Module**: Start-up configuration from code, serde or the environment
//!
//! ## Optional Features
//!
//! - `s3`: AWS S3 storage backend (default)
//! - `serde_support`: Serde serialization support for configuration (default)
//!
//! ## Example
//!
//! ```rust
//! use acme_bucket_cache::prelude::{MemoryStore, StorageCache};
//! use bytes::Bytes;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = StorageCache::init_with_store(MemoryStore::new("certs"), "my-project").await?;
//!
//! cache.put("example.org", Bytes::from_static(b"cert+key")).await?;
//! assert_eq!(cache.get("example.org").await?, Bytes::from_static(b"cert+key"));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core error types
pub use error::{Error, Result};

// Core modules
pub mod cache;
pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types
pub mod prelude {
    //! Common types and traits for convenient importing

    pub use crate::cache::{Cache, Lookup, StorageCache};
    pub use crate::config::CacheConfig;
    pub use crate::error::{CacheError, CacheResult, Error, Result, StorageError, StorageResult};
    pub use crate::storage::{MemoryBackend, MemoryStore, ObjectStore, RetryPolicy};

    #[cfg(feature = "s3")]
    pub use crate::storage::{S3Config, S3Store};
}

// Version information
/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "acme-bucket-cache");
    }
}
