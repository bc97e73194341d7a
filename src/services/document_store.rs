//! src/services/document_store.rs
//!
//! DocumentStore — citizen folders and document lifecycle on top of a flat
//! object store. Owns every path and metadata convention:
//! - a citizen folder is the key prefix `{citizenId}/`
//! - a folder exists iff at least one object carries that prefix; creating a
//!   folder writes the zero-byte marker `{citizenId}/.init`
//! - a document lives at `{citizenId}/{fileName}` with the metadata record
//!   described in `models::metadata`
//!
//! Citizen identifiers are opaque strings and are never parsed as numbers.

use crate::{
    models::{
        document::{DocumentStream, DocumentSummary, FOLDER_MARKER, NewDocument, inline_disposition},
        metadata::DocumentMetadata,
        object::{MetadataMap, ObjectInfo},
    },
    store::{ByteStream, ObjectStoreClient, StoreError, byte_body},
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{collections::HashSet, io, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(600);
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MARKER_CONTENT_TYPE: &str = "application/x-empty";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("folder not found for citizen with ID {0}")]
    FolderNotFound(String),
    #[error("file \"{file_name}\" not found for citizen with ID {citizen_id}")]
    DocumentNotFound {
        citizen_id: String,
        file_name: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error("transfer aborted after copying {} file(s): {cause}", .copied.len())]
    TransferAborted {
        copied: Vec<String>,
        cause: Box<DocumentError>,
    },
    #[error("upload aborted after storing {} file(s): {cause}", .uploaded.len())]
    UploadAborted {
        uploaded: Vec<String>,
        cause: Box<DocumentError>,
    },
}

impl From<StoreError> for DocumentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey => DocumentError::Validation("invalid object key".into()),
            other => DocumentError::StorageUnavailable(other),
        }
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Clone)]
pub struct DocumentStore {
    client: Arc<dyn ObjectStoreClient>,
    signed_url_ttl: Duration,
}

impl DocumentStore {
    pub fn new(client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            client,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }

    /// TTL applied when a signed URL is requested without one.
    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    fn folder_prefix(citizen_id: &str) -> String {
        format!("{}/", citizen_id)
    }

    fn document_key(citizen_id: &str, file_name: &str) -> String {
        format!("{}/{}", citizen_id, file_name)
    }

    fn validate_segment(field: &str, value: &str) -> DocumentResult<()> {
        if value.trim().is_empty() {
            return Err(DocumentError::Validation(format!("{} must not be empty", field)));
        }
        if value.contains('/') || value.chars().any(char::is_control) {
            return Err(DocumentError::Validation(format!(
                "{} `{}` contains forbidden characters",
                field, value
            )));
        }
        if matches!(value, "." | "..") {
            return Err(DocumentError::Validation(format!(
                "{} `{}` is not a valid name",
                field, value
            )));
        }
        Ok(())
    }

    fn validate_citizen_id(citizen_id: &str) -> DocumentResult<()> {
        Self::validate_segment("citizen id", citizen_id)
    }

    fn validate_file_name(file_name: &str) -> DocumentResult<()> {
        Self::validate_segment("file name", file_name)?;
        if file_name == FOLDER_MARKER {
            return Err(DocumentError::Validation(format!(
                "file name `{}` is reserved",
                FOLDER_MARKER
            )));
        }
        Ok(())
    }

    /// Map a store error on an addressed document, turning `NotFound` into
    /// `DocumentNotFound`.
    fn missing_document(citizen_id: &str, file_name: &str) -> impl FnOnce(StoreError) -> DocumentError {
        let citizen_id = citizen_id.to_string();
        let file_name = file_name.to_string();
        move |err| match err {
            StoreError::NotFound(_) => DocumentError::DocumentNotFound {
                citizen_id,
                file_name,
            },
            other => other.into(),
        }
    }

    async fn ensure_folder(&self, citizen_id: &str) -> DocumentResult<()> {
        if self.client.has_prefix(&Self::folder_prefix(citizen_id)).await? {
            Ok(())
        } else {
            Err(DocumentError::FolderNotFound(citizen_id.to_string()))
        }
    }

    async fn ensure_document(&self, citizen_id: &str, file_name: &str) -> DocumentResult<ObjectInfo> {
        self.client
            .head(&Self::document_key(citizen_id, file_name))
            .await?
            .ok_or_else(|| DocumentError::DocumentNotFound {
                citizen_id: citizen_id.to_string(),
                file_name: file_name.to_string(),
            })
    }

    /// Write the folder marker. Re-creating an existing folder overwrites the
    /// marker and changes nothing else.
    pub async fn create_folder(&self, citizen_id: &str) -> DocumentResult<String> {
        Self::validate_citizen_id(citizen_id)?;
        let prefix = Self::folder_prefix(citizen_id);
        let marker = format!("{}{}", prefix, FOLDER_MARKER);

        self.client
            .put(
                &marker,
                Some(MARKER_CONTENT_TYPE.into()),
                MetadataMap::new(),
                stream::empty::<io::Result<Bytes>>().boxed(),
            )
            .await?;

        info!("Folder created at path: {}", prefix);
        Ok(self.client.object_url(&prefix))
    }

    /// Upload into an existing folder. `isSign` is always written as `"false"`;
    /// a document with the same name is overwritten.
    pub async fn upload_document(
        &self,
        citizen_id: &str,
        document: NewDocument,
        body: ByteStream,
    ) -> DocumentResult<String> {
        Self::validate_citizen_id(citizen_id)?;
        Self::validate_file_name(&document.file_name)?;
        self.ensure_folder(citizen_id).await?;

        let content_type = document
            .content_type
            .clone()
            .or_else(|| document.mimetype.clone())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
        let mimetype = document
            .mimetype
            .clone()
            .unwrap_or_else(|| content_type.clone());
        let metadata = DocumentMetadata::for_upload(
            document.operator_id.as_deref().unwrap_or(""),
            &document.file_name,
            &mimetype,
            &document.size,
            citizen_id,
        );

        let key = Self::document_key(citizen_id, &document.file_name);
        let stored = self
            .client
            .put(&key, Some(content_type), metadata.into_map(), body)
            .await?;

        info!(
            "Uploaded {} ({} bytes) for citizen {}",
            document.file_name, stored.size_bytes, citizen_id
        );
        Ok(self.client.object_url(&key))
    }

    /// Convenience for callers holding the whole payload in memory.
    pub async fn upload_document_bytes(
        &self,
        citizen_id: &str,
        document: NewDocument,
        content: Bytes,
    ) -> DocumentResult<String> {
        self.upload_document(citizen_id, document, byte_body(content))
            .await
    }

    /// Upload a batch into one folder. Every file name and the folder are
    /// checked before the first write; a failure after that stops the batch
    /// and `UploadAborted::uploaded` lists what was already stored.
    pub async fn upload_documents(
        &self,
        citizen_id: &str,
        documents: Vec<(NewDocument, ByteStream)>,
    ) -> DocumentResult<Vec<String>> {
        Self::validate_citizen_id(citizen_id)?;
        let mut names = HashSet::with_capacity(documents.len());
        for (document, _) in &documents {
            Self::validate_file_name(&document.file_name)?;
            if !names.insert(document.file_name.as_str()) {
                return Err(DocumentError::Validation(format!(
                    "file \"{}\" was uploaded more than once",
                    document.file_name
                )));
            }
        }
        self.ensure_folder(citizen_id).await?;

        let mut uploaded = Vec::with_capacity(documents.len());
        for (document, body) in documents {
            let file_name = document.file_name.clone();
            match self.upload_document(citizen_id, document, body).await {
                Ok(url) => uploaded.push(url),
                Err(cause) => {
                    warn!(
                        "Upload for citizen {} stopped at {} after {} file(s): {}",
                        citizen_id,
                        file_name,
                        uploaded.len(),
                        cause
                    );
                    return Err(DocumentError::UploadAborted {
                        uploaded,
                        cause: Box::new(cause),
                    });
                }
            }
        }
        Ok(uploaded)
    }

    /// Documents of a folder, marker excluded. A folder that was created and
    /// later emptied lists as empty because the marker is still there.
    pub async fn list_documents(&self, citizen_id: &str) -> DocumentResult<Vec<DocumentSummary>> {
        Self::validate_citizen_id(citizen_id)?;
        let prefix = Self::folder_prefix(citizen_id);
        let objects = self.client.list(&prefix).await?;
        if objects.is_empty() {
            return Err(DocumentError::FolderNotFound(citizen_id.to_string()));
        }

        let marker = format!("{}{}", prefix, FOLDER_MARKER);
        let documents = objects
            .into_iter()
            .filter(|object| object.key != marker)
            .map(|object| DocumentSummary::from_object(citizen_id, object))
            .inspect(|summary| {
                if let Err(missing) = summary.metadata.validate() {
                    warn!(
                        "document {}/{} is missing metadata key `{}`",
                        citizen_id, summary.name, missing
                    );
                }
            })
            .collect::<Vec<_>>();

        debug!("Listed {} documents for citizen {}", documents.len(), citizen_id);
        Ok(documents)
    }

    /// Merge `isSign = "true"` into the document metadata. Signing an already
    /// signed document is a no-op.
    pub async fn sign_document(&self, citizen_id: &str, file_name: &str) -> DocumentResult<()> {
        Self::validate_citizen_id(citizen_id)?;
        Self::validate_file_name(file_name)?;
        let existing = self.ensure_document(citizen_id, file_name).await?;

        let metadata = DocumentMetadata::from(existing.metadata);
        if metadata.is_signed() {
            debug!("{}/{} already signed", citizen_id, file_name);
            return Ok(());
        }

        let key = Self::document_key(citizen_id, file_name);
        self.client
            .set_metadata(&key, metadata.mark_signed().into_map())
            .await
            .map_err(Self::missing_document(citizen_id, file_name))?;

        info!("Signed {} for citizen {}", file_name, citizen_id);
        Ok(())
    }

    /// Copy documents between folders, one at a time. The first failure stops
    /// the transfer; documents copied before it stay in the target folder and
    /// are reported in `TransferAborted::copied`.
    pub async fn transfer_documents(
        &self,
        source_citizen_id: &str,
        target_citizen_id: &str,
        file_names: &[String],
    ) -> DocumentResult<Vec<String>> {
        Self::validate_citizen_id(source_citizen_id)?;
        Self::validate_citizen_id(target_citizen_id)?;
        for file_name in file_names {
            Self::validate_file_name(file_name)?;
        }

        self.ensure_folder(source_citizen_id).await?;
        self.ensure_folder(target_citizen_id).await?;

        let mut copied = Vec::with_capacity(file_names.len());
        for file_name in file_names {
            match self
                .transfer_one(source_citizen_id, target_citizen_id, file_name)
                .await
            {
                Ok(url) => copied.push(url),
                Err(cause) => {
                    warn!(
                        "Transfer {} -> {} stopped at {} after {} file(s): {}",
                        source_citizen_id,
                        target_citizen_id,
                        file_name,
                        copied.len(),
                        cause
                    );
                    return Err(DocumentError::TransferAborted {
                        copied,
                        cause: Box::new(cause),
                    });
                }
            }
        }

        info!(
            "Transferred {} file(s) from {} to {}",
            copied.len(),
            source_citizen_id,
            target_citizen_id
        );
        Ok(copied)
    }

    async fn transfer_one(
        &self,
        source_citizen_id: &str,
        target_citizen_id: &str,
        file_name: &str,
    ) -> DocumentResult<String> {
        let source = self.ensure_document(source_citizen_id, file_name).await?;
        let source_key = Self::document_key(source_citizen_id, file_name);
        let target_key = Self::document_key(target_citizen_id, file_name);

        self.client
            .copy(&source_key, &target_key)
            .await
            .map_err(Self::missing_document(source_citizen_id, file_name))?;

        let metadata = DocumentMetadata::from(source.metadata).with_citizen(target_citizen_id);
        self.client
            .set_metadata(&target_key, metadata.into_map())
            .await?;

        Ok(self.client.object_url(&target_key))
    }

    /// Open a document for streaming. Nothing is buffered here; the returned
    /// stream pulls from the store as the consumer reads.
    pub async fn stream_document(
        &self,
        citizen_id: &str,
        file_name: &str,
    ) -> DocumentResult<DocumentStream> {
        Self::validate_citizen_id(citizen_id)?;
        Self::validate_file_name(file_name)?;

        let (info, body) = self
            .client
            .get(&Self::document_key(citizen_id, file_name))
            .await
            .map_err(Self::missing_document(citizen_id, file_name))?;

        Ok(DocumentStream {
            content_type: info
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            content_disposition: inline_disposition(file_name),
            content_length: info.size_bytes,
            body,
        })
    }

    pub async fn delete_document(&self, citizen_id: &str, file_name: &str) -> DocumentResult<()> {
        Self::validate_citizen_id(citizen_id)?;
        Self::validate_file_name(file_name)?;
        self.ensure_document(citizen_id, file_name).await?;

        self.client
            .delete(&Self::document_key(citizen_id, file_name))
            .await
            .map_err(Self::missing_document(citizen_id, file_name))?;

        info!("Deleted {} for citizen {}", file_name, citizen_id);
        Ok(())
    }

    /// Time-limited read URL issued by the object store. `ttl` defaults to the
    /// configured TTL and may not exceed seven days.
    pub async fn signed_download_url(
        &self,
        citizen_id: &str,
        file_name: &str,
        ttl: Option<Duration>,
    ) -> DocumentResult<String> {
        Self::validate_citizen_id(citizen_id)?;
        Self::validate_file_name(file_name)?;
        let ttl = ttl.unwrap_or(self.signed_url_ttl);
        if ttl.is_zero() || ttl > MAX_SIGNED_URL_TTL {
            return Err(DocumentError::Validation(format!(
                "ttl must be between 1 and {} seconds",
                MAX_SIGNED_URL_TTL.as_secs()
            )));
        }
        self.ensure_document(citizen_id, file_name).await?;

        let url = self
            .client
            .signed_url(&Self::document_key(citizen_id, file_name), ttl)
            .await
            .map_err(Self::missing_document(citizen_id, file_name))?;

        debug!(
            "Issued signed url for {}/{} valid {}s",
            citizen_id,
            file_name,
            ttl.as_secs()
        );
        Ok(url)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        models::metadata::{CITIZEN_ID, IS_SIGN},
        store::{LocalObjectStore, StoreResult},
    };
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    pub(crate) async fn test_documents() -> (TempDir, DocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::open_in_memory(dir.path(), "docs", "http://localhost:3000")
            .await
            .unwrap();
        (dir, DocumentStore::new(Arc::new(store)))
    }

    fn pdf(name: &str) -> NewDocument {
        NewDocument {
            file_name: name.into(),
            operator_id: Some("op-7".into()),
            mimetype: Some("application/pdf".into()),
            size: "4".into(),
            content_type: Some("application/pdf".into()),
        }
    }

    async fn upload(docs: &DocumentStore, citizen: &str, name: &str) -> String {
        docs.upload_document_bytes(citizen, pdf(name), Bytes::from_static(b"%PDF"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn created_folder_lists_empty() {
        let (_dir, docs) = test_documents().await;
        let url = docs.create_folder("00123").await.unwrap();
        assert_eq!(url, "http://localhost:3000/docs/00123/");
        assert!(docs.list_documents("00123").await.unwrap().is_empty());

        docs.create_folder("00123").await.unwrap();
        assert!(docs.list_documents("00123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leading_zeros_are_distinct_folders() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("0123").await.unwrap();
        assert!(matches!(
            docs.list_documents("123").await,
            Err(DocumentError::FolderNotFound(id)) if id == "123"
        ));
    }

    #[tokio::test]
    async fn upload_requires_folder() {
        let (_dir, docs) = test_documents().await;
        let result = docs
            .upload_document_bytes("123", pdf("test.pdf"), Bytes::from_static(b"%PDF"))
            .await;
        assert!(matches!(result, Err(DocumentError::FolderNotFound(_))));
    }

    #[tokio::test]
    async fn upload_then_list_shows_unsigned_document() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        let url = upload(&docs, "123", "test.pdf").await;
        assert_eq!(url, "http://localhost:3000/docs/123/test.pdf");

        let files = docs.list_documents("123").await.unwrap();
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.name, "test.pdf");
        assert_eq!(file.size, 4);
        assert_eq!(file.backend_url, "/download-file/123/test.pdf");
        assert_eq!(file.metadata.get(IS_SIGN), Some("false"));
        assert_eq!(file.metadata.get(CITIZEN_ID), Some("123"));
        assert_eq!(file.metadata.get("operatorId"), Some("op-7"));
        assert!(file.metadata.validate().is_ok());
    }

    #[tokio::test]
    async fn reupload_overwrites_and_resets_sign_flag() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;
        docs.sign_document("123", "test.pdf").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        let files = docs.list_documents("123").await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(!files[0].metadata.is_signed());
    }

    #[tokio::test]
    async fn signing_is_idempotent() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        docs.sign_document("123", "test.pdf").await.unwrap();
        let first = docs.list_documents("123").await.unwrap()[0].metadata.clone();
        docs.sign_document("123", "test.pdf").await.unwrap();
        let second = docs.list_documents("123").await.unwrap()[0].metadata.clone();

        assert!(first.is_signed());
        assert_eq!(first, second);
        assert_eq!(first.get("operatorId"), Some("op-7"));
    }

    #[tokio::test]
    async fn signing_missing_document_fails() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        assert!(matches!(
            docs.sign_document("123", "nope.pdf").await,
            Err(DocumentError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        docs.create_folder("456").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        let listed = docs.list_documents("123").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "test.pdf");

        docs.sign_document("123", "test.pdf").await.unwrap();
        let copied = docs
            .transfer_documents("123", "456", &["test.pdf".to_string()])
            .await
            .unwrap();
        assert_eq!(copied, vec!["http://localhost:3000/docs/456/test.pdf"]);

        let target = docs.list_documents("456").await.unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].name, "test.pdf");
        assert_eq!(target[0].metadata.get(IS_SIGN), Some("true"));
        assert_eq!(target[0].metadata.get(CITIZEN_ID), Some("456"));

        let source = docs.list_documents("123").await.unwrap();
        assert_eq!(source[0].metadata.get(CITIZEN_ID), Some("123"));
    }

    #[tokio::test]
    async fn transfer_requires_both_folders() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        let result = docs
            .transfer_documents("123", "456", &["test.pdf".to_string()])
            .await;
        assert!(matches!(result, Err(DocumentError::FolderNotFound(id)) if id == "456"));
    }

    #[tokio::test]
    async fn transfer_stops_at_first_missing_file_without_rollback() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        docs.create_folder("456").await.unwrap();
        upload(&docs, "123", "a.pdf").await;
        upload(&docs, "123", "c.pdf").await;

        let names = ["a.pdf", "b.pdf", "c.pdf"].map(String::from);
        match docs.transfer_documents("123", "456", &names).await {
            Err(DocumentError::TransferAborted { copied, cause }) => {
                assert_eq!(copied, vec!["http://localhost:3000/docs/456/a.pdf"]);
                assert!(matches!(
                    *cause,
                    DocumentError::DocumentNotFound { ref file_name, .. } if file_name == "b.pdf"
                ));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let target: Vec<String> = docs
            .list_documents("456")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(target, vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn stream_document_sets_headers_and_streams_bytes() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        let doc = docs.stream_document("123", "test.pdf").await.unwrap();
        assert_eq!(doc.content_type, "application/pdf");
        assert_eq!(doc.content_disposition, "inline; filename=\"test.pdf\"");
        assert_eq!(doc.content_length, 4);
        let chunks: Vec<Bytes> = doc.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"%PDF");

        assert!(matches!(
            docs.stream_document("123", "other.pdf").await,
            Err(DocumentError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        docs.delete_document("123", "test.pdf").await.unwrap();
        assert!(matches!(
            docs.delete_document("123", "test.pdf").await,
            Err(DocumentError::DocumentNotFound { .. })
        ));
        assert!(docs.list_documents("123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn marker_name_is_reserved() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        assert!(matches!(
            docs.delete_document("123", ".init").await,
            Err(DocumentError::Validation(_))
        ));
        assert!(matches!(
            docs.create_folder("../etc").await,
            Err(DocumentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn batch_upload_checks_every_name_before_writing() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();

        let batch = vec![
            (pdf("a.pdf"), byte_body(Bytes::from_static(b"%PDF"))),
            (pdf(".init"), byte_body(Bytes::from_static(b"%PDF"))),
        ];
        assert!(matches!(
            docs.upload_documents("123", batch).await,
            Err(DocumentError::Validation(_))
        ));
        assert!(docs.list_documents("123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_upload_reports_files_stored_before_a_failure() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();

        let broken: ByteStream = stream::once(async {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client went away"))
        })
        .boxed();
        let batch = vec![
            (pdf("a.pdf"), byte_body(Bytes::from_static(b"%PDF"))),
            (pdf("b.pdf"), broken),
            (pdf("c.pdf"), byte_body(Bytes::from_static(b"%PDF"))),
        ];

        match docs.upload_documents("123", batch).await {
            Err(DocumentError::UploadAborted { uploaded, cause }) => {
                assert_eq!(uploaded, vec!["http://localhost:3000/docs/123/a.pdf"]);
                assert!(matches!(*cause, DocumentError::StorageUnavailable(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let names: Vec<String> = docs
            .list_documents("123")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn dot_segments_are_rejected_but_inner_dots_are_not() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();

        for name in [".", ".."] {
            assert!(matches!(
                docs.upload_document_bytes("123", pdf(name), Bytes::from_static(b"%PDF"))
                    .await,
                Err(DocumentError::Validation(_))
            ));
            assert!(matches!(
                docs.create_folder(name).await,
                Err(DocumentError::Validation(_))
            ));
        }

        upload(&docs, "123", "report..v2.pdf").await;
        let files = docs.list_documents("123").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report..v2.pdf");
        assert!(docs.stream_document("123", "report..v2.pdf").await.is_ok());
    }

    #[tokio::test]
    async fn signed_url_validates_ttl_and_existence() {
        let (_dir, docs) = test_documents().await;
        docs.create_folder("123").await.unwrap();
        upload(&docs, "123", "test.pdf").await;

        let url = docs
            .signed_download_url("123", "test.pdf", None)
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/signed/"));

        assert!(matches!(
            docs.signed_download_url("123", "test.pdf", Some(Duration::ZERO))
                .await,
            Err(DocumentError::Validation(_))
        ));
        assert!(matches!(
            docs.signed_download_url("123", "missing.pdf", None).await,
            Err(DocumentError::DocumentNotFound { .. })
        ));
    }

    /// Store whose every call fails as if the backend were down.
    pub(crate) struct UnavailableStore;

    fn down<T>() -> StoreResult<T> {
        Err(StoreError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "backend down",
        )))
    }

    #[async_trait]
    impl ObjectStoreClient for UnavailableStore {
        async fn put(
            &self,
            _key: &str,
            _content_type: Option<String>,
            _metadata: MetadataMap,
            _body: ByteStream,
        ) -> StoreResult<ObjectInfo> {
            down()
        }
        async fn head(&self, _key: &str) -> StoreResult<Option<ObjectInfo>> {
            down()
        }
        async fn has_prefix(&self, _prefix: &str) -> StoreResult<bool> {
            down()
        }
        async fn list(&self, _prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
            down()
        }
        async fn get(&self, _key: &str) -> StoreResult<(ObjectInfo, ByteStream)> {
            down()
        }
        async fn set_metadata(&self, _key: &str, _metadata: MetadataMap) -> StoreResult<ObjectInfo> {
            down()
        }
        async fn copy(&self, _from: &str, _to: &str) -> StoreResult<ObjectInfo> {
            down()
        }
        async fn delete(&self, _key: &str) -> StoreResult<()> {
            down()
        }
        fn object_url(&self, key: &str) -> String {
            format!("unavailable://{}", key)
        }
        async fn signed_url(&self, _key: &str, _ttl: Duration) -> StoreResult<String> {
            down()
        }
    }

    #[tokio::test]
    async fn backend_failures_surface_as_storage_unavailable() {
        let docs = DocumentStore::new(Arc::new(UnavailableStore));
        assert!(matches!(
            docs.create_folder("123").await,
            Err(DocumentError::StorageUnavailable(_))
        ));
        assert!(matches!(
            docs.list_documents("123").await,
            Err(DocumentError::StorageUnavailable(_))
        ));
    }
}
