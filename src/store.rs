use std::fmt::Display;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

/// Metadata key holding the commit permalink on the hosting service.
pub const COMMIT_URL_KEY: &str = "commit_url";
/// Metadata key holding the raw JSON fragment the record was built from.
pub const COMMIT_DATA_KEY: &str = "commit_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Published,
}

/// One publishable record built from an accepted commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub body: String,
    pub status: RecordStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub value: Value,
}

/// A record as held by a store, with everything attached to it so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: NormalizedRecord,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

impl StoredRecord {
    /// First value attached under `key`, if any.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata
            .iter()
            .find(|meta| meta.key == key)
            .map(|meta| &meta.value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} doesn't exist")]
    NotFound(RecordId),

    #[error("store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't encode record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("couldn't encode options: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("store lock was poisoned")]
    Poisoned,
}

/// The publishing backend records end up in.
///
/// Calls are synchronous and may block; implementations must tolerate
/// concurrent independent `create` calls from separate requests.
pub trait ContentStore: Send + Sync {
    fn create(&self, record: NormalizedRecord) -> Result<RecordId, StoreError>;

    fn attach_metadata(&self, id: RecordId, key: &str, value: Value) -> Result<(), StoreError>;

    /// Looks up the first value attached to `id` under `key`.
    fn metadata(&self, id: RecordId, key: &str) -> Result<Option<Value>, StoreError>;

    /// Brings the store's layout up to date. Called by the upgrade hook.
    fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
