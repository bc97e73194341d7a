//! Represents an object (blob) held by the object store client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Custom key/value metadata attached to an object.
pub type MetadataMap = BTreeMap<String, String>;

/// A single stored object as reported by the object store.
///
/// The object store knows nothing about citizens or documents; this record
/// only carries the key, the system attributes and the opaque custom metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Content type (MIME type) recorded at upload.
    pub content_type: Option<String>,

    /// MD5 checksum of the payload, hex encoded.
    pub etag: Option<String>,

    /// Timestamp when the payload or its metadata was last written.
    pub last_modified: DateTime<Utc>,

    /// Custom metadata stored alongside the object.
    pub metadata: MetadataMap,
}

impl ObjectInfo {
    /// Last path segment of the key.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Row shape of the `objects` table.
#[derive(Clone, FromRow, Debug)]
pub struct ObjectRow {
    pub key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl ObjectRow {
    pub fn into_info(self, metadata: MetadataMap) -> ObjectInfo {
        ObjectInfo {
            key: self.key,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            etag: self.etag,
            last_modified: self.last_modified,
            metadata,
        }
    }
}

/// Row shape of the `object_metadata` table.
#[derive(Clone, FromRow, Debug)]
pub struct MetadataRow {
    pub object_key: String,
    pub meta_key: String,
    pub meta_value: String,
}
