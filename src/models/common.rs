//! Entities shared by organisation and activity records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityRef;
use crate::codelists::Code;

/// Free text in one language, attached to a parent entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub parent: EntityRef,
    pub language: Code,
    pub content: String,
}

/// A monetary amount as written in the source
///
/// `amount` is the raw element text; numeric interpretation is left to
/// whoever consumes the persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryValue {
    pub amount: String,
    pub currency: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
}

/// An element that only groups narratives (name, title)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub parent: EntityRef,
}

/// A child that points at one codelist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub parent: EntityRef,
    pub code: Option<Code>,
}

/// The organisation reporting a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingOrg {
    pub parent: EntityRef,
    pub reference: String,
    pub normalized_reference: String,
    pub org_type: Option<Code>,
    pub secondary_reporter: bool,
    /// Persisted organisation with the same identifier, when known
    pub organisation: Option<Uuid>,
}

/// A budget over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub parent: EntityRef,
    pub status: Option<Code>,
    pub budget_type: Option<Code>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub value: Option<MonetaryValue>,
    pub recipient_org_ref: Option<String>,
    pub recipient_org: Option<Uuid>,
    pub recipient_country: Option<Code>,
    pub recipient_region: Option<Code>,
    pub region_vocabulary: Option<Code>,
    pub vocabulary_uri: Option<String>,
}

impl Budget {
    pub fn new(parent: EntityRef) -> Self {
        Self {
            parent,
            status: None,
            budget_type: None,
            period_start: None,
            period_end: None,
            value: None,
            recipient_org_ref: None,
            recipient_org: None,
            recipient_country: None,
            recipient_region: None,
            region_vocabulary: None,
            vocabulary_uri: None,
        }
    }
}

/// A line of a budget or of a total expenditure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub parent: EntityRef,
    pub reference: String,
    pub value: Option<MonetaryValue>,
}

/// Total expenditure over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expenditure {
    pub parent: EntityRef,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub value: Option<MonetaryValue>,
}

/// A link to an external document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub parent: EntityRef,
    pub url: Option<String>,
    pub format: Option<Code>,
    pub document_date: Option<NaiveDate>,
}
