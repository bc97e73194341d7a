//! Citizen lifecycle events → document store operations.
//!
//! The dispatcher is transport-free: the broker consumer hands it an
//! [`EventEnvelope`] and acts on the returned [`Disposition`]. Errors never
//! escape `dispatch`; each one is logged and turned into an ack or a
//! dead-letter decision.

use super::document_store::{DocumentError, DocumentStore};
use crate::models::requests::integer_text;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

pub const EVENT_CREATE: &str = "CREATE";

/// A delivered message reduced to what dispatching needs.
#[derive(Debug, Clone, Default)]
pub struct EventEnvelope {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub body: Vec<u8>,
}

/// What the transport should do with a message once dispatching is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Reject without requeue so the broker routes it to the dead-letter exchange.
    DeadLetter,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Create { document_number: String },
}

impl UserEvent {
    pub fn parse(event_type: Option<&str>, body: &[u8]) -> Result<Self, DispatchError> {
        match event_type {
            Some(EVENT_CREATE) => Ok(UserEvent::Create {
                document_number: document_number(body)?,
            }),
            Some(other) => Err(DispatchError::UnsupportedOperation(other.to_string())),
            None => Err(DispatchError::UnsupportedOperation("<missing eventType>".into())),
        }
    }
}

/// Accepts `"123"`, `123` or `{"documentNumber": "123" | 123}`.
fn document_number(body: &[u8]) -> Result<String, DispatchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| DispatchError::MalformedPayload(format!("invalid JSON: {}", err)))?;

    let number = match value {
        Value::Object(mut fields) => fields.remove("documentNumber").unwrap_or(Value::Null),
        other => other,
    };

    let number = match number {
        Value::String(text) => text,
        Value::Number(n) => integer_text(&n).ok_or_else(|| {
            DispatchError::MalformedPayload(format!("document number {} is not an integer", n))
        })?,
        other => {
            return Err(DispatchError::MalformedPayload(format!(
                "expected a document number, got {}",
                other
            )));
        }
    };

    if number.trim().is_empty() {
        return Err(DispatchError::MalformedPayload(
            "document number is empty".into(),
        ));
    }
    Ok(number)
}

#[derive(Clone)]
pub struct EventDispatcher {
    documents: DocumentStore,
}

impl EventDispatcher {
    pub fn new(documents: DocumentStore) -> Self {
        Self { documents }
    }

    pub async fn dispatch(&self, envelope: &EventEnvelope) -> Disposition {
        let user_id = envelope.user_id.as_deref().unwrap_or("<none>");
        let event_type = envelope.event_type.as_deref().unwrap_or("<none>");
        info!(
            "Received user request for userId: {}, operation: {}, message: {}",
            user_id,
            event_type,
            String::from_utf8_lossy(&envelope.body)
        );

        match self.process(envelope).await {
            Ok(()) => Disposition::Ack,
            Err(DispatchError::UnsupportedOperation(op)) => {
                warn!(
                    "Message processing failed for userId: {}: unsupported operation {}",
                    user_id, op
                );
                Disposition::Ack
            }
            Err(err) => {
                error!(
                    "Message processing failed for userId: {}, operation: {}: {}",
                    user_id, event_type, err
                );
                Disposition::DeadLetter
            }
        }
    }

    async fn process(&self, envelope: &EventEnvelope) -> Result<(), DispatchError> {
        match UserEvent::parse(envelope.event_type.as_deref(), &envelope.body)? {
            UserEvent::Create { document_number } => {
                let folder = self.documents.create_folder(&document_number).await?;
                info!("Citizen folder ready for {} at {}", document_number, folder);
                Ok(())
            }
        }
    }
}
