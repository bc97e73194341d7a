//! src/store/local.rs
//!
//! LocalObjectStore — a single-bucket object store backed by SQLite for
//! object records, custom metadata and signed-URL tokens, and by local disk
//! for payloads sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use super::{ByteStream, ObjectStoreClient, StoreError, StoreResult};
use crate::models::object::{MetadataMap, MetadataRow, ObjectInfo, ObjectRow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Outcome of a single readiness check.
#[derive(Debug, Clone, Serialize)]
pub struct Probe {
    pub ok: bool,
    pub error: Option<String>,
}

impl Probe {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for object records.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: String,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store over a private in-memory database with the schema applied.
    pub async fn open_in_memory(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> StoreResult<Self> {
        // A single long-lived connection keeps the in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(Arc::new(pool), base_path, bucket, public_base_url);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn run_migrations(&self) -> StoreResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Rejects keys that are empty, oversized, absolute, have a `.` or `..`
    /// path segment, or carry control characters and backslashes.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidKey);
        }
        if key.starts_with('/')
            || key
                .split('/')
                .any(|segment| matches!(segment, "." | ".."))
        {
            return Err(StoreError::InvalidKey);
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(StoreError::InvalidKey);
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// First two bytes of MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_row(&self, key: &str) -> StoreResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    async fn fetch_metadata(&self, key: &str) -> StoreResult<MetadataMap> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            "SELECT object_key, meta_key, meta_value
             FROM object_metadata WHERE object_key = ?",
        )
        .bind(key)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(|r| (r.meta_key, r.meta_value)).collect())
    }

    async fn fetch_info(&self, key: &str) -> StoreResult<Option<ObjectInfo>> {
        match self.fetch_row(key).await? {
            Some(row) => {
                let metadata = self.fetch_metadata(key).await?;
                Ok(Some(row.into_info(metadata)))
            }
            None => Ok(None),
        }
    }

    async fn require_info(&self, key: &str) -> StoreResult<ObjectInfo> {
        self.fetch_info(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Parent directory of `path`, created if missing.
    async fn prepare_parent(path: &Path) -> StoreResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent)
    }

    /// Move a finished temp file into place, replacing any previous payload.
    async fn commit_payload(tmp_path: &Path, file_path: &Path) -> StoreResult<()> {
        if let Err(err) = fs::rename(tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        Ok(())
    }

    /// Stream the payload to a temp file next to its final location, hashing
    /// as it goes. Returns the temp path, byte count and MD5 etag; the caller
    /// renames it into place once the object row is committed.
    async fn stage_payload(
        &self,
        key: &str,
        mut stream: ByteStream,
    ) -> StoreResult<(PathBuf, i64, String)> {
        let file_path = self.object_path(key);
        let parent = Self::prepare_parent(&file_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        Ok((tmp_path, size_bytes, format!("{:x}", digest.compute())))
    }

    /// Commit the object row and its metadata, then move the staged payload
    /// into place. A failed commit leaves the previous row and payload intact.
    async fn install(
        &self,
        tmp_path: &Path,
        row: &ObjectRow,
        metadata: &MetadataMap,
    ) -> StoreResult<()> {
        let written = async {
            let mut tx = self.db.begin().await?;
            upsert_row(&mut tx, row).await?;
            replace_metadata(&mut tx, &row.key, metadata).await?;
            tx.commit().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(tmp_path).await;
            return Err(StoreError::Sqlx(err));
        }
        Self::commit_payload(tmp_path, &self.object_path(&row.key)).await
    }

    /// Resolve a signed-URL token to the object it grants access to.
    pub async fn open_signed(&self, token: &str) -> StoreResult<(ObjectInfo, ByteStream)> {
        let grant = sqlx::query_as::<_, (String, i64)>(
            "SELECT object_key, expires_at FROM signed_urls WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;

        let (key, expires_at) = grant.ok_or(StoreError::SignedUrlUnknown)?;
        if expires_at <= Utc::now().timestamp() {
            return Err(StoreError::SignedUrlExpired);
        }
        self.get(&key).await
    }

    async fn purge_expired_grants(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM signed_urls WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// `SELECT 1` against the metadata database.
    pub async fn probe_database(&self) -> Probe {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => Probe::ok(),
            Ok(v) => Probe::failed(format!("unexpected result: {}", v)),
            Err(e) => Probe::failed(format!("error: {}", e)),
        }
    }

    /// Write, read back and delete a scratch file under `base_path`.
    pub async fn probe_disk(&self) -> Probe {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp_path, b"readyz").await {
            return Probe::failed(format!("could not write tmp file: {}", e));
        }

        let probe = match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => Probe::ok(),
            Ok(_) => Probe::failed("file content mismatch"),
            Err(e) => Probe::failed(format!("could not read tmp file: {}", e)),
        };

        match fs::remove_file(&tmp_path).await {
            Err(e) if probe.ok => Probe {
                ok: true,
                error: Some(format!("could not remove tmp file: {}", e)),
            },
            _ => probe,
        }
    }

    /// Remove empty shard directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn upsert_row(conn: &mut SqliteConnection, row: &ObjectRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO objects (key, content_type, size_bytes, etag, last_modified)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            content_type = excluded.content_type,
            size_bytes = excluded.size_bytes,
            etag = excluded.etag,
            last_modified = excluded.last_modified
        "#,
    )
    .bind(&row.key)
    .bind(&row.content_type)
    .bind(row.size_bytes)
    .bind(&row.etag)
    .bind(row.last_modified)
    .execute(conn)
    .await?;
    Ok(())
}

async fn replace_metadata(
    conn: &mut SqliteConnection,
    key: &str,
    metadata: &MetadataMap,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM object_metadata WHERE object_key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?;
    for (meta_key, meta_value) in metadata {
        sqlx::query(
            "INSERT INTO object_metadata (object_key, meta_key, meta_value) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(meta_key)
        .bind(meta_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn new_grant_token() -> String {
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    raw[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(raw)
}

#[async_trait]
impl ObjectStoreClient for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: MetadataMap,
        body: ByteStream,
    ) -> StoreResult<ObjectInfo> {
        Self::ensure_key_safe(key)?;
        let (tmp_path, size_bytes, etag) = self.stage_payload(key, body).await?;

        let row = ObjectRow {
            key: key.to_string(),
            content_type,
            size_bytes,
            etag: Some(etag),
            last_modified: Utc::now(),
        };

        self.install(&tmp_path, &row, &metadata).await?;
        Ok(row.into_info(metadata))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<ObjectInfo>> {
        Self::ensure_key_safe(key)?;
        self.fetch_info(key).await
    }

    async fn has_prefix(&self, prefix: &str) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM objects WHERE substr(key, 1, length(?)) = ?)",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE substr(key, 1, length(?)) = ?
             ORDER BY key ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;

        let meta_rows = sqlx::query_as::<_, MetadataRow>(
            "SELECT object_key, meta_key, meta_value
             FROM object_metadata WHERE substr(object_key, 1, length(?)) = ?",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;

        let mut by_key: HashMap<String, MetadataMap> = HashMap::new();
        for meta in meta_rows {
            by_key
                .entry(meta.object_key)
                .or_default()
                .insert(meta.meta_key, meta.meta_value);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let metadata = by_key.remove(&row.key).unwrap_or_default();
                row.into_info(metadata)
            })
            .collect())
    }

    async fn get(&self, key: &str) -> StoreResult<(ObjectInfo, ByteStream)> {
        Self::ensure_key_safe(key)?;
        let info = self.require_info(key).await?;

        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok((info, ReaderStream::new(file).boxed()))
    }

    async fn set_metadata(&self, key: &str, metadata: MetadataMap) -> StoreResult<ObjectInfo> {
        Self::ensure_key_safe(key)?;
        let mut row = self
            .fetch_row(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        row.last_modified = Utc::now();

        let mut tx = self.db.begin().await?;
        replace_metadata(&mut tx, key, &metadata).await?;
        sqlx::query("UPDATE objects SET last_modified = ? WHERE key = ?")
            .bind(row.last_modified)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(row.into_info(metadata))
    }

    async fn copy(&self, from: &str, to: &str) -> StoreResult<ObjectInfo> {
        Self::ensure_key_safe(from)?;
        Self::ensure_key_safe(to)?;
        let source = self.require_info(from).await?;
        if from == to {
            return Ok(source);
        }

        let target_path = self.object_path(to);
        let parent = Self::prepare_parent(&target_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = fs::copy(self.object_path(from), &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(from.to_string())
            } else {
                StoreError::Io(err)
            });
        }

        let row = ObjectRow {
            key: to.to_string(),
            content_type: source.content_type.clone(),
            size_bytes: source.size_bytes,
            etag: source.etag.clone(),
            last_modified: Utc::now(),
        };
        self.install(&tmp_path, &row, &source.metadata).await?;

        debug!("copied {} -> {}", from, to);
        Ok(row.into_info(source.metadata))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        Self::ensure_key_safe(key)?;

        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        sqlx::query("DELETE FROM object_metadata WHERE object_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM signed_urls WHERE object_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }

        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, key)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        Self::ensure_key_safe(key)?;
        if self.fetch_row(key).await?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let purged = self.purge_expired_grants().await?;
        if purged > 0 {
            debug!("purged {} expired signed url grants", purged);
        }

        let token = new_grant_token();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);
        sqlx::query("INSERT INTO signed_urls (token, object_key, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(key)
            .bind(expires_at)
            .execute(&*self.db)
            .await?;

        Ok(format!("{}/signed/{}", self.public_base_url, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{TryStreamExt, stream};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, LocalObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::open_in_memory(dir.path(), "docs", "http://localhost:3000")
            .await
            .unwrap();
        (dir, store)
    }

    fn body(bytes: &'static [u8]) -> ByteStream {
        stream::once(async move { Ok(Bytes::from_static(bytes)) }).boxed()
    }

    async fn read_all(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    fn meta(pairs: &[(&str, &str)]) -> MetadataMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn put_then_get_returns_payload_and_metadata() {
        let (_dir, store) = test_store().await;
        let info = store
            .put(
                "7/a.txt",
                Some("text/plain".into()),
                meta(&[("k", "v")]),
                body(b"hello"),
            )
            .await
            .unwrap();
        assert_eq!(info.size_bytes, 5);
        assert_eq!(info.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));

        let (fetched, stream) = store.get("7/a.txt").await.unwrap();
        assert_eq!(fetched.metadata, meta(&[("k", "v")]));
        assert_eq!(fetched.content_type.as_deref(), Some("text/plain"));
        assert_eq!(read_all(stream).await, b"hello");
    }

    #[tokio::test]
    async fn overwrite_replaces_payload_and_metadata() {
        let (_dir, store) = test_store().await;
        store
            .put("7/a.txt", None, meta(&[("old", "1")]), body(b"first"))
            .await
            .unwrap();
        store
            .put("7/a.txt", None, meta(&[("new", "2")]), body(b"second!"))
            .await
            .unwrap();

        let (info, stream) = store.get("7/a.txt").await.unwrap();
        assert_eq!(info.metadata, meta(&[("new", "2")]));
        assert_eq!(read_all(stream).await, b"second!");
        assert_eq!(store.list("7/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prefix_matching_is_literal() {
        let (_dir, store) = test_store().await;
        store
            .put("1_2/a", None, MetadataMap::new(), body(b"x"))
            .await
            .unwrap();
        store
            .put("1x2/b", None, MetadataMap::new(), body(b"y"))
            .await
            .unwrap();

        let listed = store.list("1_2/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "1_2/a");
        assert!(store.has_prefix("1x2/").await.unwrap());
        assert!(!store.has_prefix("1%/").await.unwrap());
    }

    #[tokio::test]
    async fn copy_duplicates_payload_and_metadata() {
        let (_dir, store) = test_store().await;
        store
            .put(
                "1/doc.pdf",
                Some("application/pdf".into()),
                meta(&[("isSign", "true")]),
                body(b"%PDF"),
            )
            .await
            .unwrap();

        let copied = store.copy("1/doc.pdf", "2/doc.pdf").await.unwrap();
        assert_eq!(copied.key, "2/doc.pdf");
        assert_eq!(copied.metadata, meta(&[("isSign", "true")]));

        let (_, stream) = store.get("2/doc.pdf").await.unwrap();
        assert_eq!(read_all(stream).await, b"%PDF");
        assert!(store.exists("1/doc.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn delete_reports_missing_objects() {
        let (_dir, store) = test_store().await;
        store
            .put("1/a", None, MetadataMap::new(), body(b"x"))
            .await
            .unwrap();

        store.delete("1/a").await.unwrap();
        assert!(matches!(
            store.delete("1/a").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.head("1/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (_dir, store) = test_store().await;
        for key in ["", "/abs", "a/../b", "a\\b", "1/.", ".", "./a", "1/.."] {
            assert!(matches!(
                store.put(key, None, MetadataMap::new(), body(b"x")).await,
                Err(StoreError::InvalidKey)
            ));
        }
    }

    #[tokio::test]
    async fn double_dots_inside_a_name_are_allowed() {
        let (_dir, store) = test_store().await;
        store
            .put("1/report..v2.pdf", None, MetadataMap::new(), body(b"v2"))
            .await
            .unwrap();
        let (_, stream) = store.get("1/report..v2.pdf").await.unwrap();
        assert_eq!(read_all(stream).await, b"v2");
    }

    async fn reject_metadata_writes(store: &LocalObjectStore) {
        sqlx::query(
            "CREATE TRIGGER reject_metadata BEFORE INSERT ON object_metadata
             BEGIN SELECT RAISE(ABORT, 'metadata writes disabled'); END",
        )
        .execute(&*store.db)
        .await
        .unwrap();
    }

    fn staged_files(store: &LocalObjectStore, key: &str) -> Vec<String> {
        let parent = store.object_path(key).parent().unwrap().to_path_buf();
        match std::fs::read_dir(parent) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(".tmp-"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_previous_object() {
        let (_dir, store) = test_store().await;
        store
            .put("1/a.pdf", None, meta(&[("v", "1")]), body(b"first"))
            .await
            .unwrap();
        reject_metadata_writes(&store).await;

        let result = store
            .put("1/a.pdf", None, meta(&[("v", "2")]), body(b"second"))
            .await;
        assert!(matches!(result, Err(StoreError::Sqlx(_))));

        let (info, stream) = store.get("1/a.pdf").await.unwrap();
        assert_eq!(info.size_bytes, 5);
        assert_eq!(info.metadata, meta(&[("v", "1")]));
        assert_eq!(read_all(stream).await, b"first");
        assert!(staged_files(&store, "1/a.pdf").is_empty());
    }

    #[tokio::test]
    async fn failed_copy_leaves_no_target() {
        let (_dir, store) = test_store().await;
        store
            .put("1/a.pdf", None, meta(&[("v", "1")]), body(b"first"))
            .await
            .unwrap();
        reject_metadata_writes(&store).await;

        assert!(matches!(
            store.copy("1/a.pdf", "2/a.pdf").await,
            Err(StoreError::Sqlx(_))
        ));
        assert!(store.head("2/a.pdf").await.unwrap().is_none());
        assert!(!store.object_path("2/a.pdf").exists());
        assert!(staged_files(&store, "2/a.pdf").is_empty());

        let (_, stream) = store.get("1/a.pdf").await.unwrap();
        assert_eq!(read_all(stream).await, b"first");
    }

    #[tokio::test]
    async fn signed_url_grants_read_until_expiry() {
        let (_dir, store) = test_store().await;
        store
            .put("1/a", None, MetadataMap::new(), body(b"data"))
            .await
            .unwrap();

        let url = store.signed_url("1/a", Duration::from_secs(60)).await.unwrap();
        let token = url
            .strip_prefix("http://localhost:3000/signed/")
            .unwrap()
            .to_string();
        let (_, stream) = store.open_signed(&token).await.unwrap();
        assert_eq!(read_all(stream).await, b"data");

        sqlx::query("UPDATE signed_urls SET expires_at = 0 WHERE token = ?")
            .bind(&token)
            .execute(&*store.db)
            .await
            .unwrap();
        assert!(matches!(
            store.open_signed(&token).await,
            Err(StoreError::SignedUrlExpired)
        ));
        assert!(matches!(
            store.open_signed("nope").await,
            Err(StoreError::SignedUrlUnknown)
        ));
    }

    #[tokio::test]
    async fn signed_url_requires_existing_object() {
        let (_dir, store) = test_store().await;
        assert!(matches!(
            store.signed_url("1/missing", Duration::from_secs(60)).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
