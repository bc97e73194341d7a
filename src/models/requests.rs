//! Request and response bodies of the HTTP surface.

use super::document::DocumentSummary;
use serde::{Deserialize, Serialize};

/// A JSON value callers send either as a string or as a bare number.
///
/// Citizen identifiers are kept as text; an integer is rendered with all its
/// digits. Floats and integers outside the 64-bit range are refused rather
/// than rendered in float notation.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    pub fn into_text(self) -> Result<String, String> {
        match self {
            TextOrNumber::Text(text) => Ok(text),
            TextOrNumber::Number(number) => integer_text(&number)
                .ok_or_else(|| format!("expected an integer or a string, got {}", number)),
        }
    }
}

/// Decimal digits of an integral JSON number.
pub fn integer_text(number: &serde_json::Number) -> Option<String> {
    number
        .as_u64()
        .map(|n| n.to_string())
        .or_else(|| number.as_i64().map(|n| n.to_string()))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderReq {
    pub id_citizen: TextOrNumber,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileRefReq {
    pub id_citizen: TextOrNumber,
    pub file_name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransferFilesReq {
    pub source_citizen_id: TextOrNumber,
    pub target_citizen_id: TextOrNumber,
    pub file_names: Vec<String>,
}

/// One element of the `metadata` JSON array sent with an upload.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetaEntry {
    pub operator_id: Option<String>,
    pub file_name: String,
    pub mimetype: Option<String>,
    pub size: Option<TextOrNumber>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlQuery {
    pub ttl_seconds: Option<u64>,
}

#[derive(Serialize, Debug)]
pub struct MessageResp {
    pub message: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FolderCreatedResp {
    pub message: String,
    pub folder_url: String,
}

#[derive(Serialize, Debug)]
pub struct UploadResp {
    pub message: String,
    pub urls: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct ListDocumentsResp {
    pub message: String,
    pub files: Vec<DocumentSummary>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransferResp {
    pub message: String,
    pub copied_files: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct SignedUrlResp {
    pub message: String,
    pub url: String,
}
