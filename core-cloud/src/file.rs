use crate::path::CloudPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata key holding the back end's native identifier.
pub const META_ID: &str = "id";
/// Metadata key holding a revision marker (rev, eTag, version).
pub const META_REVISION: &str = "rev";
/// Metadata key holding a MIME type or type tag.
pub const META_MIME_TYPE: &str = "mime_type";

/// A file or directory as every back end reports it.
///
/// Values are never mutated after construction; operations that change
/// remote state return freshly mapped instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFile {
    /// Absolute caller-facing path, e.g. `/docs/report.txt`.
    pub path: String,
    pub name: String,
    /// Absent for directories or when the back end does not report it.
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub is_directory: bool,
    /// Back-end passthrough (native id, revision, mime type / tag).
    pub metadata: BTreeMap<String, Value>,
}

impl CloudFile {
    pub fn file(path: &CloudPath) -> Self {
        Self::at(path, false)
    }

    pub fn directory(path: &CloudPath) -> Self {
        Self::at(path, true)
    }

    fn at(path: &CloudPath, is_directory: bool) -> Self {
        Self {
            path: path.to_string(),
            name: path.native_name().unwrap_or_default(),
            size: None,
            modified_time: None,
            is_directory,
            metadata: BTreeMap::new(),
        }
    }

    /// Size is only kept for files.
    pub fn with_size(mut self, size: Option<u64>) -> Self {
        if !self.is_directory {
            self.size = size;
        }
        self
    }

    /// Modification time is only kept for files.
    pub fn with_modified_time(mut self, modified: Option<DateTime<Utc>>) -> Self {
        if !self.is_directory {
            self.modified_time = modified;
        }
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Insert only when a value is present.
    pub fn with_optional_metadata<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_metadata(key, value),
            None => self,
        }
    }

    pub fn native_id(&self) -> Option<&str> {
        self.metadata.get(META_ID).and_then(Value::as_str)
    }

    pub fn revision(&self) -> Option<&str> {
        self.metadata.get(META_REVISION).and_then(Value::as_str)
    }
}

/// Parse an RFC 3339 timestamp, dropping values that do not parse.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
