//! Error types for the ACME bucket cache
//!
//! This module provides the error taxonomy used throughout the crate, built on
//! `thiserror`. Three layers exist:
//!
//! - [`StorageError`] - failures reported by a backing object store
//! - [`CacheError`] - the result of a cache lookup, separating a [`CacheError::CacheMiss`]
//!   from a broken store
//! - [`Error`] - the crate-wide error, including configuration problems

use thiserror::Error;

/// Boxed underlying cause carried by backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for the ACME bucket cache
#[derive(Error, Debug)]
pub enum Error {
    /// Cache lookup errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Storage operation errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },
}

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// The named object does not exist in the bucket
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// Bucket that was searched
        bucket: String,
        /// Key that has no object
        key: String,
    },

    /// The bucket itself does not exist
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// Missing bucket
        bucket: String,
    },

    /// Bucket creation was refused because the caller already owns the bucket
    #[error("Bucket already owned by caller: {bucket}")]
    BucketAlreadyOwned {
        /// Bucket the caller already owns
        bucket: String,
    },

    /// Bucket creation was refused because someone else owns the name
    #[error("Bucket already exists: {bucket}")]
    BucketAlreadyExists {
        /// Bucket name held by another owner
        bucket: String,
    },

    /// The backend client could not be constructed
    #[error("Connection error: {reason}")]
    ConnectionError {
        /// Why the client is unusable
        reason: String,
    },

    /// A single attempt exceeded the configured attempt timeout
    #[error("Storage operation timed out: {operation}")]
    Timeout {
        /// Operation that ran out of time
        operation: String,
    },

    /// Any other backend failure, with the backend's error kept as the source
    #[error("Storage operation failed: {operation}: {source}")]
    OperationFailed {
        /// Backend operation that failed
        operation: String,
        /// Error reported by the backend
        #[source]
        source: BoxError,
    },
}

impl StorageError {
    /// Wrap a backend error for the named operation
    pub fn operation_failed(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Whether this error is the backend's native "object does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }

    /// Whether an explicit retry policy may attempt the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OperationFailed { .. } | Self::Timeout { .. })
    }
}

/// Outcome of a failed cache lookup
#[derive(Error, Debug)]
pub enum CacheError {
    /// No value is currently stored for the key
    #[error("cache miss")]
    CacheMiss,

    /// The store could not serve the key
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CacheError {
    /// Whether this is the distinguished cache-miss signal
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::CacheMiss)
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience type alias for Storage Results
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Convenience type alias for cache lookups
pub type CacheResult<T> = std::result::Result<T, CacheError>;
