//! Core data models for the citizen document service.
//!
//! `object` mirrors what the object store keeps, `metadata` and `document`
//! layer the citizen/document conventions on top, and `requests` holds the
//! JSON shapes of the HTTP surface.

pub mod document;
pub mod metadata;
pub mod object;
pub mod requests;
