//! Registration records as read from the document store

use chrono::NaiveDate;
use edusync_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names used by the registration documents.
pub mod fields {
    pub const NAME: &str = "name";
    pub const PHONE: &str = "phone";
    pub const ADDRESS: &str = "address";
    pub const PRESCHOOL_ID: &str = "preschoolId";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
    pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";
}

/// One document, verbatim. No schema is enforced; any field may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Field value, with JSON `null` treated the same as an absent key.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Field rendered as column text: strings as-is, other scalars via their
    /// JSON form, nested values as compact JSON.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Canonical text encoding used by raw mode.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(text)?))
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A record that passed the freshness filter, with its update day parsed.
///
/// Always has an `address` and an `updated_on` equal to the cutoff it was
/// filtered against.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRecord {
    pub record: RawRecord,
    pub updated_on: NaiveDate,
}

/// What the sink writer needs from either record kind.
pub trait SinkRecord {
    fn raw(&self) -> &RawRecord;

    /// Update day when it is already known.
    fn updated_on(&self) -> Option<NaiveDate> {
        None
    }
}

impl SinkRecord for RawRecord {
    fn raw(&self) -> &RawRecord {
        self
    }
}

impl SinkRecord for FilteredRecord {
    fn raw(&self) -> &RawRecord {
        &self.record
    }

    fn updated_on(&self) -> Option<NaiveDate> {
        Some(self.updated_on)
    }
}
