//! Document metadata record stored as custom object metadata.
//!
//! Every document carries a flat string → string map. The keys below are
//! always present on documents written by this service; callers may find
//! additional keys on objects written by other tools and those are kept
//! untouched by every mutation here.

use super::object::MetadataMap;
use serde::{Deserialize, Serialize};

pub const OPERATOR_ID: &str = "operatorId";
pub const FILE_NAME: &str = "fileName";
pub const MIMETYPE: &str = "mimetype";
pub const SIZE: &str = "size";
pub const CITIZEN_ID: &str = "citizenId";
pub const IS_SIGN: &str = "isSign";

pub const REQUIRED_KEYS: [&str; 6] = [OPERATOR_ID, FILE_NAME, MIMETYPE, SIZE, CITIZEN_ID, IS_SIGN];

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct DocumentMetadata(MetadataMap);

impl DocumentMetadata {
    /// Build the record written on upload. `isSign` always starts as `"false"`.
    pub fn for_upload(
        operator_id: &str,
        file_name: &str,
        mimetype: &str,
        size: &str,
        citizen_id: &str,
    ) -> Self {
        let mut map = MetadataMap::new();
        map.insert(OPERATOR_ID.into(), operator_id.into());
        map.insert(FILE_NAME.into(), file_name.into());
        map.insert(MIMETYPE.into(), mimetype.into());
        map.insert(SIZE.into(), size.into());
        map.insert(CITIZEN_ID.into(), citizen_id.into());
        map.insert(IS_SIGN.into(), "false".into());
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_signed(&self) -> bool {
        self.get(IS_SIGN) == Some("true")
    }

    /// Merge `isSign = "true"`, keeping every other key.
    pub fn mark_signed(mut self) -> Self {
        self.0.insert(IS_SIGN.into(), "true".into());
        self
    }

    /// Rewrite the owning citizen, keeping every other key.
    pub fn with_citizen(mut self, citizen_id: &str) -> Self {
        self.0.insert(CITIZEN_ID.into(), citizen_id.into());
        self
    }

    /// First required key missing from the record, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        match REQUIRED_KEYS
            .into_iter()
            .find(|key| !self.0.contains_key(*key))
        {
            Some(missing) => Err(missing),
            None => Ok(()),
        }
    }

    pub fn as_map(&self) -> &MetadataMap {
        &self.0
    }

    pub fn into_map(self) -> MetadataMap {
        self.0
    }
}

impl From<MetadataMap> for DocumentMetadata {
    fn from(map: MetadataMap) -> Self {
        Self(map)
    }
}
