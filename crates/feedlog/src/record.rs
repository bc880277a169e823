//! Feeding records and their remote layout.
//!
//! A [`FeedingRecord`] is the value the rest of the crate works with. On the
//! wire it travels as a [`RemoteRecord`]: a typed bag of named fields that the
//! backend stores without knowing anything about feedings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Remote record type for feeding events.
pub const RECORD_TYPE: &str = "FeedingRecord";

/// Remote field holding who fed the pet.
pub const PERSON_NAME_FIELD: &str = "personName";

/// Remote field holding which pet was fed.
pub const PET_NAME_FIELD: &str = "petName";

/// Remote field holding when the feeding happened.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One feeding event.
///
/// Records are immutable once saved: they are created or deleted, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingRecord {
    /// Backend identifier. Proposed by the client, confirmed by the backend.
    pub id: String,

    /// Who fed the pet.
    pub actor_name: String,

    /// Which pet was fed.
    pub subject_name: String,

    /// When the feeding happened.
    pub timestamp: DateTime<Utc>,
}

impl FeedingRecord {
    /// Create a record stamped with the current time and a fresh proposed id.
    #[must_use]
    pub fn new(actor_name: impl Into<String>, subject_name: impl Into<String>) -> Self {
        Self::at(actor_name, subject_name, Utc::now())
    }

    /// Create a record for a specific point in time.
    #[must_use]
    pub fn at(
        actor_name: impl Into<String>,
        subject_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_name: actor_name.into(),
            subject_name: subject_name.into(),
            timestamp,
        }
    }

    /// Convert into the remote layout.
    #[must_use]
    pub fn to_remote(&self) -> RemoteRecord {
        RemoteRecord::new(self.id.clone(), RECORD_TYPE)
            .with_field(PERSON_NAME_FIELD, FieldValue::String(self.actor_name.clone()))
            .with_field(PET_NAME_FIELD, FieldValue::String(self.subject_name.clone()))
            .with_field(TIMESTAMP_FIELD, FieldValue::Timestamp(self.timestamp))
    }

    /// Build the confirmed record from what the backend saved.
    ///
    /// Values echoed by the backend win; fields it did not echo fall back to
    /// the proposed record.
    #[must_use]
    pub fn confirmed(saved: &RemoteRecord, proposed: &Self) -> Self {
        Self {
            id: if saved.record_name.is_empty() {
                proposed.id.clone()
            } else {
                saved.record_name.clone()
            },
            actor_name: saved
                .string(PERSON_NAME_FIELD)
                .map_or_else(|| proposed.actor_name.clone(), str::to_string),
            subject_name: saved
                .string(PET_NAME_FIELD)
                .map_or_else(|| proposed.subject_name.clone(), str::to_string),
            timestamp: saved.timestamp(TIMESTAMP_FIELD).unwrap_or(proposed.timestamp),
        }
    }
}

impl TryFrom<&RemoteRecord> for FeedingRecord {
    type Error = Error;

    fn try_from(remote: &RemoteRecord) -> Result<Self> {
        if remote.record_type != RECORD_TYPE {
            return Err(Error::invalid_record(
                &remote.record_name,
                format!("unexpected record type '{}'", remote.record_type),
            ));
        }

        let required_string = |field: &str| -> Result<String> {
            match remote.string(field) {
                Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
                Some(_) => Err(Error::invalid_record(
                    &remote.record_name,
                    format!("field '{field}' is empty"),
                )),
                None => Err(Error::invalid_record(
                    &remote.record_name,
                    format!("missing field '{field}'"),
                )),
            }
        };

        let actor_name = required_string(PERSON_NAME_FIELD)?;
        let subject_name = required_string(PET_NAME_FIELD)?;
        let timestamp = remote.timestamp(TIMESTAMP_FIELD).ok_or_else(|| {
            Error::invalid_record(
                &remote.record_name,
                format!("missing field '{TIMESTAMP_FIELD}'"),
            )
        })?;

        Ok(Self {
            id: remote.record_name.clone(),
            actor_name,
            subject_name,
            timestamp,
        })
    }
}

/// A typed field value in the remote layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// A text value.
    String(String),
    /// A point in time.
    Timestamp(DateTime<Utc>),
}

/// A record as the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Backend identifier of the record.
    pub record_name: String,

    /// The record type, e.g. [`RECORD_TYPE`].
    pub record_type: String,

    /// Named field values.
    pub fields: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    /// Create an empty record of the given type.
    #[must_use]
    pub fn new(record_name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            record_type: record_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field, returning the record.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Read a text field.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Read a timestamp field.
    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(name) {
            Some(FieldValue::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }
}
