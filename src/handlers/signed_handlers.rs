//! Serves objects behind signed-URL tokens issued by the local store.

use super::document_handlers::stream_response;
use crate::{errors::AppError, store::LocalObjectStore};
use axum::{
    extract::{Path, State},
    response::Response,
};
use tracing::debug;

/// `GET /signed/{token}` — 403 once the grant has expired, 404 for unknown tokens.
pub async fn open_signed(
    State(store): State<LocalObjectStore>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let (info, body) = store.open_signed(&token).await?;
    debug!("serving {} through signed url", info.key);

    let content_type = info
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    Ok(stream_response(content_type, info.size_bytes, None, body))
}
