//! Object store client seam.
//!
//! The document layer talks to a flat key/blob store through
//! [`ObjectStoreClient`]. Keys are opaque strings; the store has no notion of
//! folders, citizens or documents.

pub mod local;

use crate::models::object::{MetadataMap, ObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::{self, BoxStream}};
use std::{io, time::Duration};
use thiserror::Error;

pub use local::LocalObjectStore;

/// Payload bytes flowing into or out of the store.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A single in-memory chunk as a [`ByteStream`].
pub fn byte_body(content: Bytes) -> ByteStream {
    stream::once(async move { Ok(content) }).boxed()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("signed url is unknown")]
    SignedUrlUnknown,
    #[error("signed url has expired")]
    SignedUrlExpired,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Write (or overwrite) `key` with the streamed payload.
    async fn put(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: MetadataMap,
        body: ByteStream,
    ) -> StoreResult<ObjectInfo>;

    async fn head(&self, key: &str) -> StoreResult<Option<ObjectInfo>>;

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// True when at least one object key starts with `prefix`.
    async fn has_prefix(&self, prefix: &str) -> StoreResult<bool>;

    /// All objects whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>>;

    async fn get(&self, key: &str) -> StoreResult<(ObjectInfo, ByteStream)>;

    /// Replace the custom metadata of `key`.
    async fn set_metadata(&self, key: &str, metadata: MetadataMap) -> StoreResult<ObjectInfo>;

    /// Server-side copy of payload, content type and metadata.
    async fn copy(&self, from: &str, to: &str) -> StoreResult<ObjectInfo>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Stable reference URL for `key`.
    fn object_url(&self, key: &str) -> String;

    /// Time-limited, pre-authenticated read URL for `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StoreResult<String>;
}
