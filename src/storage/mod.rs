//! Storage module for the cache's backing object store
//!
//! This module provides the object-store contract the cache is written
//! against, plus its backend implementations:
//! - **In-memory storage** - An in-process store with fault injection, for tests and local runs
//! - **AWS S3 storage** - For S3-compatible object storage (optional, requires `s3` feature)
//!
//! A store value is a handle to a single bucket. Objects are named by the
//! cache key verbatim; no prefixing, escaping or validation happens here.
//!
//! # Examples
//!
//! ## In-memory storage
//!
//! ```rust
//! use acme_bucket_cache::storage::{MemoryStore, ObjectReader, ObjectStore, ObjectWriter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new("certs");
//! store.create_bucket("my-project").await?;
//!
//! let mut writer = store.open_writer("example.org");
//! writer.write(b"certificate chain").await?;
//! writer.close().await?;
//!
//! let data = store.open_reader("example.org").await?.read_all().await?;
//! assert_eq!(&data[..], b"certificate chain");
//! # Ok(())
//! # }
//! ```
//!
//! ## S3 storage (requires `s3` feature)
//!
//! ```rust,ignore
//! use acme_bucket_cache::storage::{S3Config, S3Store};
//!
//! let store = S3Store::connect(S3Config {
//!     bucket: "my-certs".to_string(),
//!     region: "eu-west-1".to_string(),
//!     ..Default::default()
//! })
//! .await?;
//! ```

// Backing store contract
pub mod storage_api;

// Storage backend implementations
pub mod memory_adapter;

#[cfg(feature = "s3")]
pub mod storage_s3;

// Re-export main types for convenience
pub use storage_api::{with_retry, ObjectReader, ObjectStore, ObjectWriter, RetryPolicy, Retryable};

pub use memory_adapter::{FaultPoint, MemoryBackend, MemoryStore};

#[cfg(feature = "s3")]
pub use storage_s3::{S3Config, S3Store};
