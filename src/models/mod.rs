//! Entity models built by the parser
//!
//! Entities form a tree rooted at the record's primary entity (an
//! [`Organisation`] or an [`Activity`]). Children hold an [`EntityRef`] to
//! their immediate parent inside the record's model store; the reference is
//! turned into a persisted id only when the record is committed.

pub mod activity;
pub mod common;
pub mod organisation;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use activity::{Activity, Description, ParticipatingOrg};
pub use common::{
    Budget, BudgetLine, Classification, DocumentLink, Expenditure, MonetaryValue, Narrative,
    ReportingOrg, TextBlock,
};
pub use organisation::{Organisation, normalize_identifier};

/// The two kinds of record a document can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Organisation,
    Activity,
}

impl RecordKind {
    /// Tag of the document root element
    pub fn document_tag(&self) -> &'static str {
        match self {
            RecordKind::Organisation => "iati-organisations",
            RecordKind::Activity => "iati-activities",
        }
    }

    /// Tag of each record root element
    pub fn record_tag(&self) -> &'static str {
        match self {
            RecordKind::Organisation => "iati-organisation",
            RecordKind::Activity => "iati-activity",
        }
    }

    /// Entity kind of the record's primary entity
    pub fn root_entity(&self) -> EntityKind {
        match self {
            RecordKind::Organisation => EntityKind::Organisation,
            RecordKind::Activity => EntityKind::Activity,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Organisation => f.write_str("organisation"),
            RecordKind::Activity => f.write_str("activity"),
        }
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "organisation" | "organization" => Ok(RecordKind::Organisation),
            "activity" => Ok(RecordKind::Activity),
            other => Err(format!("unknown record kind '{other}'")),
        }
    }
}

/// The four structurally identical organisation budget families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetFamily {
    Total,
    RecipientOrg,
    RecipientCountry,
    RecipientRegion,
}

impl BudgetFamily {
    pub const ALL: [BudgetFamily; 4] = [
        BudgetFamily::Total,
        BudgetFamily::RecipientOrg,
        BudgetFamily::RecipientCountry,
        BudgetFamily::RecipientRegion,
    ];

    /// Element tag of the budget
    pub fn tag(&self) -> &'static str {
        match self {
            BudgetFamily::Total => "total-budget",
            BudgetFamily::RecipientOrg => "recipient-org-budget",
            BudgetFamily::RecipientCountry => "recipient-country-budget",
            BudgetFamily::RecipientRegion => "recipient-region-budget",
        }
    }

    /// Entity type name of the budget
    pub fn type_name(&self) -> &'static str {
        match self {
            BudgetFamily::Total => "TotalBudget",
            BudgetFamily::RecipientOrg => "RecipientOrgBudget",
            BudgetFamily::RecipientCountry => "RecipientCountryBudget",
            BudgetFamily::RecipientRegion => "RecipientRegionBudget",
        }
    }

    /// Entity type name of the family's budget lines
    pub fn line_type_name(&self) -> &'static str {
        match self {
            BudgetFamily::Total => "TotalBudgetLine",
            BudgetFamily::RecipientOrg => "RecipientOrgBudgetLine",
            BudgetFamily::RecipientCountry => "RecipientCountryBudgetLine",
            BudgetFamily::RecipientRegion => "RecipientRegionBudgetLine",
        }
    }

    /// Recipient-* budgets must carry a value date on their value
    pub fn value_date_required(&self) -> bool {
        !matches!(self, BudgetFamily::Total)
    }
}

/// Entity types staged in the model store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Organisation,
    OrganisationName,
    OrganisationReportingOrg,
    OrganisationBudget(BudgetFamily),
    OrganisationBudgetLine(BudgetFamily),
    TotalExpenditure,
    TotalExpenditureLine,
    OrganisationDocumentLink,
    OrganisationDocumentLinkCategory,
    OrganisationDocumentLinkLanguage,
    Activity,
    ActivityTitle,
    ActivityDescription,
    ActivityReportingOrg,
    ParticipatingOrg,
    ActivityBudget,
    ActivityDocumentLink,
    DocumentLinkTitle,
    DocumentLinkDescription,
    DocumentLinkCategory,
    DocumentLinkLanguage,
    DocumentLinkRecipientCountry,
}

impl EntityKind {
    /// Entity type name, also the prefix of the synthesized narrative type
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Organisation => "Organisation",
            EntityKind::OrganisationName => "OrganisationName",
            EntityKind::OrganisationReportingOrg => "OrganisationReportingOrganisation",
            EntityKind::OrganisationBudget(family) => family.type_name(),
            EntityKind::OrganisationBudgetLine(family) => family.line_type_name(),
            EntityKind::TotalExpenditure => "TotalExpenditure",
            EntityKind::TotalExpenditureLine => "TotalExpenditureLine",
            EntityKind::OrganisationDocumentLink => "OrganisationDocumentLink",
            EntityKind::OrganisationDocumentLinkCategory => "OrganisationDocumentLinkCategory",
            EntityKind::OrganisationDocumentLinkLanguage => "OrganisationDocumentLinkLanguage",
            EntityKind::Activity => "Activity",
            EntityKind::ActivityTitle => "Title",
            EntityKind::ActivityDescription => "Description",
            EntityKind::ActivityReportingOrg => "ActivityReportingOrganisation",
            EntityKind::ParticipatingOrg => "ActivityParticipatingOrganisation",
            EntityKind::ActivityBudget => "Budget",
            EntityKind::ActivityDocumentLink => "DocumentLink",
            EntityKind::DocumentLinkTitle => "DocumentLinkTitle",
            EntityKind::DocumentLinkDescription => "DocumentLinkDescription",
            EntityKind::DocumentLinkCategory => "DocumentLinkCategory",
            EntityKind::DocumentLinkLanguage => "DocumentLinkLanguage",
            EntityKind::DocumentLinkRecipientCountry => "DocumentLinkRecipientCountry",
        }
    }

    /// Whether this is the primary entity of a record
    pub fn is_root(&self) -> bool {
        matches!(self, EntityKind::Organisation | EntityKind::Activity)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// In-memory ownership link from a child entity to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub index: usize,
}

impl EntityRef {
    pub fn new(kind: EntityKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// Any entity the parser can build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "kebab-case")]
pub enum Entity {
    Organisation(Organisation),
    Activity(Activity),
    TextBlock(TextBlock),
    Description(Description),
    ReportingOrg(ReportingOrg),
    ParticipatingOrg(ParticipatingOrg),
    Budget(Budget),
    BudgetLine(BudgetLine),
    Expenditure(Expenditure),
    DocumentLink(DocumentLink),
    Classification(Classification),
    Narrative(Narrative),
}

impl Entity {
    /// Parent link; `None` only for record roots
    pub fn parent(&self) -> Option<EntityRef> {
        match self {
            Entity::Organisation(_) | Entity::Activity(_) => None,
            Entity::TextBlock(e) => Some(e.parent),
            Entity::Description(e) => Some(e.parent),
            Entity::ReportingOrg(e) => Some(e.parent),
            Entity::ParticipatingOrg(e) => Some(e.parent),
            Entity::Budget(e) => Some(e.parent),
            Entity::BudgetLine(e) => Some(e.parent),
            Entity::Expenditure(e) => Some(e.parent),
            Entity::DocumentLink(e) => Some(e.parent),
            Entity::Classification(e) => Some(e.parent),
            Entity::Narrative(e) => Some(e.parent),
        }
    }

    /// Natural key of a record root
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Entity::Organisation(o) => Some(&o.identifier),
            Entity::Activity(a) => Some(&a.identifier),
            _ => None,
        }
    }

    /// Short variant name for diagnostics
    pub fn variant_name(&self) -> &'static str {
        match self {
            Entity::Organisation(_) => "Organisation",
            Entity::Activity(_) => "Activity",
            Entity::TextBlock(_) => "TextBlock",
            Entity::Description(_) => "Description",
            Entity::ReportingOrg(_) => "ReportingOrg",
            Entity::ParticipatingOrg(_) => "ParticipatingOrg",
            Entity::Budget(_) => "Budget",
            Entity::BudgetLine(_) => "BudgetLine",
            Entity::Expenditure(_) => "Expenditure",
            Entity::DocumentLink(_) => "DocumentLink",
            Entity::Classification(_) => "Classification",
            Entity::Narrative(_) => "Narrative",
        }
    }
}

/// Typed access to the payload of an [`Entity`]
pub trait StoredEntity: Sized {
    fn from_entity(entity: &Entity) -> Option<&Self>;
    fn from_entity_mut(entity: &mut Entity) -> Option<&mut Self>;
    fn into_entity(self) -> Entity;
}

macro_rules! stored_entity {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl StoredEntity for $ty {
                fn from_entity(entity: &Entity) -> Option<&Self> {
                    match entity {
                        Entity::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_entity_mut(entity: &mut Entity) -> Option<&mut Self> {
                    match entity {
                        Entity::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_entity(self) -> Entity {
                    Entity::$variant(self)
                }
            }

            impl From<$ty> for Entity {
                fn from(inner: $ty) -> Self {
                    Entity::$variant(inner)
                }
            }
        )*
    };
}

stored_entity! {
    Organisation => Organisation,
    Activity => Activity,
    TextBlock => TextBlock,
    Description => Description,
    ReportingOrg => ReportingOrg,
    ParticipatingOrg => ParticipatingOrg,
    Budget => Budget,
    BudgetLine => BudgetLine,
    Expenditure => Expenditure,
    DocumentLink => DocumentLink,
    Classification => Classification,
    Narrative => Narrative,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_family_names() {
        assert_eq!(BudgetFamily::RecipientRegion.tag(), "recipient-region-budget");
        assert_eq!(
            EntityKind::OrganisationBudgetLine(BudgetFamily::Total).type_name(),
            "TotalBudgetLine"
        );
        assert!(!BudgetFamily::Total.value_date_required());
        assert!(BudgetFamily::RecipientCountry.value_date_required());
    }

    #[test]
    fn test_record_kind_parse() {
        assert_eq!("Organisation".parse::<RecordKind>(), Ok(RecordKind::Organisation));
        assert_eq!("activity".parse::<RecordKind>(), Ok(RecordKind::Activity));
        assert!("dataset".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_typed_access() {
        let parent = EntityRef::new(EntityKind::Organisation, 0);
        let mut entity = Entity::from(TextBlock { parent });
        assert!(TextBlock::from_entity(&entity).is_some());
        assert!(Budget::from_entity(&entity).is_none());
        assert!(TextBlock::from_entity_mut(&mut entity).is_some());
        assert_eq!(entity.parent(), Some(parent));
        assert_eq!(entity.variant_name(), "TextBlock");
    }
}
