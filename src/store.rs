//! Storage collaborators: blob store and durable record store.
//!
//! Both are externally-injected capabilities passed into the pipeline as
//! trait objects, never process-wide singletons, so every stage is
//! independently testable. The library ships two backends each:
//!
//! * [`MemoryBlobStore`] / [`MemoryRecordStore`] — in-process maps, used by
//!   the integration tests and library consumers embedding the pipeline.
//! * [`FsBlobStore`] / [`JsonRecordStore`] — directory-backed blobs and one
//!   JSON document per partition key, used by the CLI.
//!
//! The record store contract is idempotent overwrite by partition key:
//! re-delivering the same document after a failed write is always safe.

use crate::events::PersistedRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {location}/{key}")]
    NotFound { location: String, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Blob storage with `get`/`put` semantics.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get(&self, location: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store an object, returning the key it was written under.
    async fn put(
        &self,
        location: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Durable record storage with idempotent overwrite by partition key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write (or overwrite) the record stored under `pk`.
    async fn put_record(&self, pk: &str, record: &PersistedRecord) -> Result<(), StoreError>;

    /// Read the record stored under `pk`, if any.
    async fn get_record(&self, pk: &str) -> Result<Option<PersistedRecord>, StoreError>;
}

// ── In-memory backends ───────────────────────────────────────────────────

/// In-process blob store backed by a `HashMap`, shared via `Arc`.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored under `location`, sorted. Test/diagnostic helper.
    pub fn keys(&self, location: &str) -> Vec<String> {
        let objects = self.objects.lock().expect("blob store lock poisoned");
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(loc, _)| loc == location)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, location: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let objects = self.objects.lock().expect("blob store lock poisoned");
        objects
            .get(&(location.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                location: location.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        let mut objects = self.objects.lock().expect("blob store lock poisoned");
        objects.insert((location.to_string(), key.to_string()), bytes);
        Ok(key.to_string())
    }
}

/// In-process record store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, PersistedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put_record(&self, pk: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("record store lock poisoned");
        records.insert(pk.to_string(), record.clone());
        Ok(())
    }

    async fn get_record(&self, pk: &str) -> Result<Option<PersistedRecord>, StoreError> {
        let records = self.records.lock().expect("record store lock poisoned");
        Ok(records.get(pk).cloned())
    }
}

// ── Filesystem backends ──────────────────────────────────────────────────

/// Blob store rooted at a directory: `{root}/{location}/{key}`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, location: &str, key: &str) -> PathBuf {
        self.root.join(location).join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, location: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(location, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                location: location.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let path = self.object_path(location, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(
            "Stored {}/{} ({} bytes, {})",
            location,
            key,
            bytes.len(),
            content_type
        );
        Ok(key.to_string())
    }
}

/// Record store writing one JSON document per partition key.
///
/// Keys may contain `/`, which is not welcome in a flat file name; the
/// on-disk name replaces separators with `__`. Writes are atomic (temp file
/// + rename) so a crash mid-write never leaves a partial record.
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, pk: &str) -> PathBuf {
        let name = pk.replace(['/', '\\'], "__");
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn put_record(&self, pk: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.record_path(pk);
        let json = serde_json::to_vec_pretty(record)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        debug!("Persisted record '{}' to {}", pk, path.display());
        Ok(())
    }

    async fn get_record(&self, pk: &str) -> Result<Option<PersistedRecord>, StoreError> {
        let path = self.record_path(pk);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Content type for an object key, by extension. Defaults to octet-stream.
pub fn content_type_for_key(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}
