//! Backing store contract
//!
//! The cache talks to its object store only through the traits in this
//! module. A store value is a handle to exactly one bucket; objects inside it
//! are addressed by their verbatim name.
//!
//! Reads and writes are split into an open step and a data step so that a
//! failure to open an object stays distinguishable from a failure while
//! moving its bytes, and a failed write stays distinguishable from a failed
//! finalize.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

/// Handle to one bucket in a backing object store
pub trait ObjectStore: Send + Sync {
    /// Reader returned by [`ObjectStore::open_reader`]
    type Reader: ObjectReader;
    /// Writer returned by [`ObjectStore::open_writer`]
    type Writer: ObjectWriter;

    /// Name of the bucket this handle points at
    fn bucket(&self) -> &str;

    /// Create the bucket under the given owner identity.
    ///
    /// A bucket that already exists and belongs to `owner` must be reported
    /// as [`StorageError::BucketAlreadyOwned`].
    fn create_bucket(&self, owner: &str) -> impl Future<Output = StorageResult<()>> + Send;

    /// Open an object for reading. A missing object is [`StorageError::ObjectNotFound`].
    fn open_reader(&self, key: &str) -> impl Future<Output = StorageResult<Self::Reader>> + Send;

    /// Open a create-or-overwrite stream for an object
    fn open_writer(&self, key: &str) -> Self::Writer;

    /// Delete an object, reporting whatever the backend reports for a missing one
    fn delete_object(&self, key: &str) -> impl Future<Output = StorageResult<()>> + Send;
}

/// An opened object
pub trait ObjectReader: Send {
    /// Read the entire object content into memory
    fn read_all(self) -> impl Future<Output = StorageResult<Bytes>> + Send;
}

/// A pending object write. Nothing is durable until [`ObjectWriter::close`] succeeds.
pub trait ObjectWriter: Send {
    /// Append bytes to the pending object
    fn write(&mut self, data: &[u8]) -> impl Future<Output = StorageResult<usize>> + Send;

    /// Finalize the object
    fn close(self) -> impl Future<Output = StorageResult<()>> + Send;
}

/// Explicit, bounded retry policy applied at the cache boundary.
///
/// The default policy performs a single attempt with no timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde_support", serde(default))]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Backoff before the first retry; doubled for every further retry
    pub base_delay: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    /// Policy with `max_retries` additional attempts
    pub fn bounded(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            attempt_timeout: None,
        }
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    /// Backoff before retry number `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Errors the retry loop knows how to classify
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;
    /// Error produced when an attempt exceeds the attempt timeout
    fn timed_out(operation: &str) -> Self;
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        StorageError::is_retryable(self)
    }

    fn timed_out(operation: &str) -> Self {
        StorageError::Timeout {
            operation: operation.to_string(),
        }
    }
}

impl Retryable for crate::error::CacheError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::CacheMiss => false,
            Self::Storage(e) => e.is_retryable(),
        }
    }

    fn timed_out(operation: &str) -> Self {
        Self::Storage(StorageError::timed_out(operation))
    }
}

/// Run `operation` under `policy`, retrying retryable failures with exponential backoff
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let outcome = match policy.attempt_timeout {
            Some(limit) => match timeout(limit, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(E::timed_out(operation_name)),
            },
            None => operation().await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying storage operation"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
