use crate::{services::document_store::DocumentError, store::StoreError};
use axum::{
    Json,
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Extra fields merged into the JSON body.
    pub details: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let (Some(Value::Object(extra)), Some(fields)) = (self.details, body.as_object_mut()) {
            fields.extend(extra);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::FolderNotFound(_) | DocumentError::DocumentNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            DocumentError::Validation(msg) => AppError::bad_request(msg),
            DocumentError::StorageUnavailable(ref source) => {
                error!("storage backend failure: {}", source);
                AppError::internal(err.to_string())
            }
            DocumentError::TransferAborted { copied, cause } => {
                let message = format!("transfer aborted: {}", cause);
                AppError {
                    message,
                    ..AppError::from(*cause)
                }
                .with_details(json!({ "copiedFiles": copied }))
            }
            DocumentError::UploadAborted { uploaded, cause } => {
                let message = format!("upload aborted: {}", cause);
                AppError {
                    message,
                    ..AppError::from(*cause)
                }
                .with_details(json!({ "uploadedFiles": uploaded }))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SignedUrlUnknown | StoreError::NotFound(_) => {
                AppError::not_found(err.to_string())
            }
            StoreError::SignedUrlExpired => AppError::new(StatusCode::FORBIDDEN, err.to_string()),
            StoreError::InvalidKey => AppError::bad_request(err.to_string()),
            StoreError::Sqlx(_) | StoreError::Io(_) => {
                error!("storage backend failure: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
