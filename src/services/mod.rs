pub mod document_store;
pub mod event_dispatcher;
