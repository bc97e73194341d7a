//! Document-level views built on top of stored objects.

use super::{metadata::DocumentMetadata, object::ObjectInfo};
use crate::store::ByteStream;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Reserved marker object name that signals a citizen folder exists.
pub const FOLDER_MARKER: &str = ".init";

/// Input for a single document upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub operator_id: Option<String>,
    pub mimetype: Option<String>,
    /// Stringified size recorded in metadata.
    pub size: String,
    /// Content type of the uploaded payload.
    pub content_type: Option<String>,
}

/// One entry of a citizen folder listing.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub name: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub metadata: DocumentMetadata,
    pub backend_url: String,
}

impl DocumentSummary {
    pub fn from_object(citizen_id: &str, object: ObjectInfo) -> Self {
        let name = object.name().to_string();
        Self {
            backend_url: format!("/download-file/{}/{}", citizen_id, name),
            name,
            size: object.size_bytes,
            last_modified: object.last_modified,
            content_type: object.content_type,
            metadata: DocumentMetadata::from(object.metadata),
        }
    }
}

/// A document ready to be piped to a response.
pub struct DocumentStream {
    pub content_type: String,
    pub content_disposition: String,
    pub content_length: i64,
    pub body: ByteStream,
}

impl std::fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStream")
            .field("content_type", &self.content_type)
            .field("content_disposition", &self.content_disposition)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// `inline` disposition for `file_name`.
///
/// Plain ASCII names go out as a quoted `filename`; anything else also gets an
/// RFC 5987 `filename*` so the header stays valid.
pub fn inline_disposition(file_name: &str) -> String {
    let plain = file_name
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\');
    if plain {
        return format!("inline; filename=\"{}\"", file_name);
    }

    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_disposition_is_quoted() {
        assert_eq!(
            inline_disposition("test.pdf"),
            "inline; filename=\"test.pdf\""
        );
    }

    #[test]
    fn non_ascii_disposition_is_encoded() {
        let value = inline_disposition("cédula.pdf");
        assert!(value.starts_with("inline; filename=\"c_dula.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''c%C3%A9dula.pdf"));
    }
}
