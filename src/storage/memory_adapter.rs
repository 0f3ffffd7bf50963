//! In-memory object store
//!
//! [`MemoryBackend`] plays the part of an object-storage service inside the
//! process: it holds any number of owned buckets, and [`MemoryStore`] is a
//! handle to one of them. Missing objects produce the same structured
//! not-found errors a real backend reports, including on delete.
//!
//! Failures can be injected per call site with [`MemoryBackend::inject_fault`],
//! and the whole backend can be taken offline with
//! [`MemoryBackend::set_reachable`].

use crate::error::{StorageError, StorageResult};
use crate::storage::storage_api::{ObjectReader, ObjectStore, ObjectWriter};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Call sites at which a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Bucket creation
    CreateBucket,
    /// Opening an object for reading
    Open,
    /// Reading an opened object
    Read,
    /// Writing into a pending object
    Write,
    /// Finalizing a pending object
    Close,
    /// Deleting an object
    Delete,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    owner: String,
    objects: HashMap<String, Bytes>,
}

#[derive(Debug)]
struct BackendState {
    buckets: RwLock<HashMap<String, MemoryBucket>>,
    faults: Mutex<HashMap<FaultPoint, u32>>,
    reachable: AtomicBool,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }
}

/// Shared in-process object storage service
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<BackendState>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the named bucket. The bucket does not need to exist yet.
    pub fn bucket(&self, name: impl Into<String>) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
            bucket: name.into(),
        }
    }

    /// Make the next `times` calls at `point` fail with a transient error
    pub fn inject_fault(&self, point: FaultPoint, times: u32) {
        let mut faults = self.state.faults.lock().unwrap_or_else(PoisonError::into_inner);
        *faults.entry(point).or_insert(0) += times;
    }

    /// Take the backend offline or bring it back
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Whether the named bucket exists
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets().contains_key(name)
    }

    /// Owner of the named bucket, if it exists
    pub fn bucket_owner(&self, name: &str) -> Option<String> {
        self.buckets().get(name).map(|bucket| bucket.owner.clone())
    }

    fn buckets(&self) -> RwLockReadGuard<'_, HashMap<String, MemoryBucket>> {
        self.state.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn buckets_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryBucket>> {
        self.state.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, point: FaultPoint, operation: &str) -> StorageResult<()> {
        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError {
                reason: format!("memory backend unreachable during {}", operation),
            });
        }

        let mut faults = self.state.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StorageError::operation_failed(
                    operation,
                    std::io::Error::other(format!("injected fault at {:?}", point)),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Handle to one bucket of a [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    bucket: String,
}

impl MemoryStore {
    /// Standalone store with its own backend
    pub fn new(bucket: impl Into<String>) -> Self {
        MemoryBackend::new().bucket(bucket)
    }

    /// Backend this handle belongs to
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// Number of objects currently in the bucket
    pub fn object_count(&self) -> usize {
        self.backend
            .buckets()
            .get(&self.bucket)
            .map_or(0, |bucket| bucket.objects.len())
    }

    /// Whether an object with this name is currently stored
    pub fn contains(&self, key: &str) -> bool {
        self.backend
            .buckets()
            .get(&self.bucket)
            .is_some_and(|bucket| bucket.objects.contains_key(key))
    }

    fn bucket_not_found(&self) -> StorageError {
        StorageError::BucketNotFound {
            bucket: self.bucket.clone(),
        }
    }
}

impl ObjectStore for MemoryStore {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_bucket(&self, owner: &str) -> StorageResult<()> {
        self.backend.check(FaultPoint::CreateBucket, "create_bucket")?;

        let mut buckets = self.backend.buckets_mut();
        match buckets.get(&self.bucket) {
            Some(existing) if existing.owner == owner => Err(StorageError::BucketAlreadyOwned {
                bucket: self.bucket.clone(),
            }),
            Some(_) => Err(StorageError::BucketAlreadyExists {
                bucket: self.bucket.clone(),
            }),
            None => {
                buckets.insert(
                    self.bucket.clone(),
                    MemoryBucket {
                        owner: owner.to_string(),
                        objects: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn open_reader(&self, key: &str) -> StorageResult<MemoryReader> {
        self.backend.check(FaultPoint::Open, "open_object")?;

        let buckets = self.backend.buckets();
        let bucket = buckets.get(&self.bucket).ok_or_else(|| self.bucket_not_found())?;
        let data = bucket
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            })?;

        Ok(MemoryReader {
            backend: self.backend.clone(),
            data,
        })
    }

    fn open_writer(&self, key: &str) -> MemoryWriter {
        MemoryWriter {
            backend: self.backend.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            buffer: Vec::new(),
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.backend.check(FaultPoint::Delete, "delete_object")?;

        let mut buckets = self.backend.buckets_mut();
        let bucket = buckets.get_mut(&self.bucket).ok_or_else(|| self.bucket_not_found())?;
        match bucket.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::ObjectNotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            }),
        }
    }
}

/// Opened in-memory object
#[derive(Debug)]
pub struct MemoryReader {
    backend: MemoryBackend,
    data: Bytes,
}

impl ObjectReader for MemoryReader {
    async fn read_all(self) -> StorageResult<Bytes> {
        self.backend.check(FaultPoint::Read, "read_object")?;
        Ok(self.data)
    }
}

/// Pending in-memory object, published on close
#[derive(Debug)]
pub struct MemoryWriter {
    backend: MemoryBackend,
    bucket: String,
    key: String,
    buffer: Vec<u8>,
}

impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        self.backend.check(FaultPoint::Write, "write_object")?;
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    async fn close(self) -> StorageResult<()> {
        self.backend.check(FaultPoint::Close, "close_object")?;

        let mut buckets = self.backend.buckets_mut();
        let bucket = buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: self.bucket.clone(),
            })?;
        bucket.objects.insert(self.key, Bytes::from(self.buffer));
        Ok(())
    }
}
