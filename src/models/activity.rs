//! Activity record root and activity-only entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityRef;
use super::organisation::normalize_identifier;
use crate::codelists::Code;

/// Primary entity of an activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub identifier: String,
    pub normalized_identifier: String,
    pub last_updated_datetime: Option<DateTime<Utc>>,
    pub default_language: Option<Code>,
    pub default_currency: Option<Code>,
    pub hierarchy: Option<u32>,
    pub humanitarian: Option<bool>,
    pub linked_data_uri: Option<String>,
    pub version: String,
    pub source: String,
}

impl Activity {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>, source: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            normalized_identifier: normalize_identifier(&identifier),
            identifier,
            last_updated_datetime: None,
            default_language: None,
            default_currency: None,
            hierarchy: None,
            humanitarian: None,
            linked_data_uri: None,
            version: version.into(),
            source: source.into(),
        }
    }
}

/// Activity description; narratives hang off it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub parent: EntityRef,
    pub description_type: Option<Code>,
}

/// An organisation taking part in an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipatingOrg {
    pub parent: EntityRef,
    pub reference: Option<String>,
    pub normalized_reference: Option<String>,
    pub role: Code,
    pub org_type: Option<Code>,
    pub activity_id: Option<String>,
    /// Persisted organisation matching `reference`, when known
    pub organisation: Option<Uuid>,
    /// Persisted activity matching `activity_id`, when known
    pub activity: Option<Uuid>,
}
