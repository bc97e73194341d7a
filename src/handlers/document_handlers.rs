//! HTTP handlers for citizen folders and documents.
//! Each handler validates the request shape and delegates to one
//! `DocumentStore` operation; downloads stream straight from the store.

use crate::{
    errors::AppError,
    models::{
        document::NewDocument,
        requests::{
            CreateFolderReq, FileRefReq, FolderCreatedResp, ListDocumentsResp, MessageResp,
            SignedUrlQuery, SignedUrlResp, TextOrNumber, TransferFilesReq, TransferResp,
            UploadMetaEntry, UploadResp,
        },
    },
    services::document_store::DocumentStore,
    store::{ByteStream, byte_body},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tracing::{debug, warn};

/// A file part received in an upload.
#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    content: Bytes,
}

/// The `metadata` part: a JSON array, or a single object for one-file uploads.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum MetadataPart {
    Many(Vec<UploadMetaEntry>),
    One(UploadMetaEntry),
}

impl MetadataPart {
    fn into_entries(self) -> Vec<UploadMetaEntry> {
        match self {
            MetadataPart::Many(entries) => entries,
            MetadataPart::One(entry) => vec![entry],
        }
    }
}

fn required_text(field: &str, value: String) -> Result<String, AppError> {
    if value.trim().is_empty() {
        Err(AppError::bad_request(format!("{} must not be empty", field)))
    } else {
        Ok(value)
    }
}

/// A citizen id given as text or as an integer.
fn id_text(field: &str, value: TextOrNumber) -> Result<String, AppError> {
    let text = value
        .into_text()
        .map_err(|msg| AppError::bad_request(format!("{}: {}", field, msg)))?;
    required_text(field, text)
}

/// Pair every uploaded file with the metadata entry carrying its name.
fn match_metadata(
    files: Vec<UploadedFile>,
    entries: Vec<UploadMetaEntry>,
) -> Result<Vec<(UploadedFile, UploadMetaEntry)>, AppError> {
    let mut by_name: HashMap<String, UploadMetaEntry> = HashMap::with_capacity(entries.len());
    for entry in entries {
        let name = entry.file_name.clone();
        if by_name.insert(name.clone(), entry).is_some() {
            return Err(AppError::bad_request(format!(
                "metadata lists file \"{}\" more than once",
                name
            )));
        }
    }

    let mut seen = HashSet::with_capacity(files.len());
    let mut pairs = Vec::with_capacity(files.len());
    for file in files {
        if !seen.insert(file.file_name.clone()) {
            return Err(AppError::bad_request(format!(
                "file \"{}\" was uploaded more than once",
                file.file_name
            )));
        }
        let entry = by_name.remove(&file.file_name).ok_or_else(|| {
            AppError::bad_request(format!(
                "no metadata entry for file \"{}\"",
                file.file_name
            ))
        })?;
        pairs.push((file, entry));
    }

    for unused in by_name.keys() {
        warn!("metadata entry for \"{}\" has no matching file", unused);
    }
    Ok(pairs)
}

/// `POST /create-folder`
pub async fn create_folder(
    State(documents): State<DocumentStore>,
    payload: Result<Json<CreateFolderReq>, JsonRejection>,
) -> Result<(StatusCode, Json<FolderCreatedResp>), AppError> {
    let Json(req) = payload?;
    let citizen_id = id_text("idCitizen", req.id_citizen)?;

    let folder_url = documents.create_folder(&citizen_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(FolderCreatedResp {
            message: "folder created successfully".into(),
            folder_url,
        }),
    ))
}

/// `POST /upload` — multipart with repeated file parts plus `idCitizen` and
/// `metadata` text parts. Metadata entries are matched to files by name.
pub async fn upload_documents(
    State(documents): State<DocumentStore>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResp>), AppError> {
    let mut citizen_id = None;
    let mut metadata_raw = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "idCitizen" => citizen_id = Some(field.text().await?),
            "metadata" => metadata_raw = Some(field.text().await?),
            _ => match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let content = field.bytes().await?;
                    files.push(UploadedFile {
                        file_name,
                        content_type,
                        content,
                    });
                }
                None => debug!("ignoring multipart field `{}`", name),
            },
        }
    }

    let citizen_id = required_text(
        "idCitizen",
        citizen_id.ok_or_else(|| AppError::bad_request("idCitizen is required"))?,
    )?;
    if files.is_empty() {
        return Err(AppError::bad_request("at least one file is required"));
    }
    let metadata_raw = metadata_raw.ok_or_else(|| AppError::bad_request("metadata is required"))?;
    let entries = serde_json::from_str::<MetadataPart>(&metadata_raw)
        .map_err(|err| AppError::bad_request(format!("invalid metadata: {}", err)))?
        .into_entries();

    let mut batch = Vec::with_capacity(files.len());
    for (file, entry) in match_metadata(files, entries)? {
        let size = match entry.size {
            Some(size) => size
                .into_text()
                .map_err(|msg| AppError::bad_request(format!("size: {}", msg)))?,
            None => file.content.len().to_string(),
        };
        let document = NewDocument {
            file_name: file.file_name,
            operator_id: entry.operator_id,
            mimetype: entry.mimetype,
            size,
            content_type: file.content_type,
        };
        batch.push((document, byte_body(file.content)));
    }
    let urls = documents.upload_documents(&citizen_id, batch).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResp {
            message: "Files uploaded successfully".into(),
            urls,
        }),
    ))
}

/// `GET /list-documents/{idCitizen}`
pub async fn list_documents(
    State(documents): State<DocumentStore>,
    Path(citizen_id): Path<String>,
) -> Result<Json<ListDocumentsResp>, AppError> {
    let files = documents.list_documents(&citizen_id).await?;
    Ok(Json(ListDocumentsResp {
        message: "Documents listed successfully".into(),
        files,
    }))
}

/// `GET /download-file/{idCitizen}/{fileName}` — streamed inline.
pub async fn download_file(
    State(documents): State<DocumentStore>,
    Path((citizen_id, file_name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let document = documents.stream_document(&citizen_id, &file_name).await?;
    Ok(stream_response(
        &document.content_type,
        document.content_length,
        Some(&document.content_disposition),
        document.body,
    ))
}

/// `POST /sign-file`
pub async fn sign_file(
    State(documents): State<DocumentStore>,
    payload: Result<Json<FileRefReq>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResp>), AppError> {
    let Json(req) = payload?;
    let citizen_id = id_text("idCitizen", req.id_citizen)?;
    let file_name = required_text("fileName", req.file_name)?;

    documents.sign_document(&citizen_id, &file_name).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResp {
            message: format!("File {} signed successfully", file_name),
        }),
    ))
}

/// `POST /transfer-files`
pub async fn transfer_files(
    State(documents): State<DocumentStore>,
    payload: Result<Json<TransferFilesReq>, JsonRejection>,
) -> Result<(StatusCode, Json<TransferResp>), AppError> {
    let Json(req) = payload?;
    let source = id_text("sourceCitizenId", req.source_citizen_id)?;
    let target = id_text("targetCitizenId", req.target_citizen_id)?;
    if req.file_names.is_empty() {
        return Err(AppError::bad_request("fileNames must not be empty"));
    }

    let copied_files = documents
        .transfer_documents(&source, &target, &req.file_names)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TransferResp {
            message: format!(
                "{} file(s) successfully copied from {} to {}",
                copied_files.len(),
                source,
                target
            ),
            copied_files,
        }),
    ))
}

/// `POST /delete-file`
pub async fn delete_file(
    State(documents): State<DocumentStore>,
    payload: Result<Json<FileRefReq>, JsonRejection>,
) -> Result<Json<MessageResp>, AppError> {
    let Json(req) = payload?;
    let citizen_id = id_text("idCitizen", req.id_citizen)?;
    let file_name = required_text("fileName", req.file_name)?;

    documents.delete_document(&citizen_id, &file_name).await?;
    Ok(Json(MessageResp {
        message: format!("File {} deleted successfully", file_name),
    }))
}

/// `GET /signed-url/{idCitizen}/{fileName}?ttlSeconds=N`
pub async fn signed_url(
    State(documents): State<DocumentStore>,
    Path((citizen_id, file_name)): Path<(String, String)>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResp>, AppError> {
    let ttl = query.ttl_seconds.map(Duration::from_secs);
    let url = documents
        .signed_download_url(&citizen_id, &file_name, ttl)
        .await?;
    Ok(Json(SignedUrlResp {
        message: "Signed URL generated successfully".into(),
        url,
    }))
}

/// Build a streaming response; the body is pulled from `body` as the client reads.
pub(crate) fn stream_response(
    content_type: &str,
    content_length: i64,
    content_disposition: Option<&str>,
    body: ByteStream,
) -> Response {
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    set_stream_headers(
        response.headers_mut(),
        content_type,
        content_length,
        content_disposition,
    );
    response
}

fn set_stream_headers(
    headers: &mut HeaderMap,
    content_type: &str,
    content_length: i64,
    content_disposition: Option<&str>,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(content_length.max(0) as u64),
    );

    if let Some(value) = content_disposition.and_then(|d| HeaderValue::from_str(d).ok()) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: None,
            content: Bytes::from_static(b"x"),
        }
    }

    fn entry(name: &str) -> UploadMetaEntry {
        UploadMetaEntry {
            operator_id: None,
            file_name: name.into(),
            mimetype: None,
            size: None,
        }
    }

    #[test]
    fn metadata_is_matched_by_name_not_position() {
        let pairs = match_metadata(
            vec![file("a.pdf"), file("b.pdf")],
            vec![entry("b.pdf"), entry("a.pdf")],
        )
        .unwrap();
        for (file, entry) in pairs {
            assert_eq!(file.file_name, entry.file_name);
        }
    }

    #[test]
    fn unmatched_file_is_rejected() {
        let err = match_metadata(vec![file("a.pdf")], vec![entry("b.pdf")]).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("a.pdf"));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let err = match_metadata(vec![file("a.pdf")], vec![entry("a.pdf"), entry("a.pdf")])
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
