//! Defines routes for the citizen document API.
//!
//! ## Structure
//! - **Document endpoints** (state: `DocumentStore`)
//!   - `POST /create-folder` — create a citizen folder
//!   - `POST /upload` — multipart upload with per-file metadata
//!   - `GET  /list-documents/{idCitizen}` — list a folder
//!   - `GET  /download-file/{idCitizen}/{fileName}` — stream a document inline
//!   - `POST /sign-file` — mark a document as signed
//!   - `POST /transfer-files` — copy documents between folders
//!   - `POST /delete-file` — delete a document
//!   - `GET  /signed-url/{idCitizen}/{fileName}` — issue a time-limited link
//!
//! - **Store endpoints** (state: `LocalObjectStore`)
//!   - `GET /signed/{token}` — serve a signed link
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        document_handlers::{
            create_folder, delete_file, download_file, list_documents, sign_file, signed_url,
            transfer_files, upload_documents,
        },
        health_handlers::{healthz, readyz},
        signed_handlers::open_signed,
    },
    services::document_store::DocumentStore,
    store::LocalObjectStore,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Document routes carrying `DocumentStore` as shared state.
///
/// `max_upload_bytes` bounds the multipart body of `/upload`.
pub fn routes(max_upload_bytes: usize) -> Router<DocumentStore> {
    Router::new()
        .route("/create-folder", post(create_folder))
        .route(
            "/upload",
            post(upload_documents).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/list-documents/{id_citizen}", get(list_documents))
        .route(
            "/download-file/{id_citizen}/{file_name}",
            get(download_file),
        )
        .route("/sign-file", post(sign_file))
        .route("/transfer-files", post(transfer_files))
        .route("/delete-file", post(delete_file))
        .route("/signed-url/{id_citizen}/{file_name}", get(signed_url))
}

/// Routes served directly by the local object store.
pub fn store_routes() -> Router<LocalObjectStore> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/signed/{token}", get(open_signed))
}

/// Full application router.
pub fn app(documents: DocumentStore, store: LocalObjectStore, max_upload_bytes: usize) -> Router {
    routes(max_upload_bytes)
        .with_state(documents)
        .merge(store_routes().with_state(store))
}
