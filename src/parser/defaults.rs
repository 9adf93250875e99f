//! Narrative, currency and date resolution shared by every handler table
//!
//! Defaults are resolved once, when the entity is built, from the nearest
//! enclosing scope: an explicit attribute on the element first, then the
//! default declared on the record root. They are never revisited at commit.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::codelists::{Code, CodelistType};
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{EntityKind, MonetaryValue, Narrative};
use crate::parser::dispatch::RecordContext;
use crate::store::StoreKey;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

static TIMEZONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:Z|[+-](?:0\d|1[0-4]):[0-5]\d)$").unwrap());

/// Defaults declared on a record root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDefaults {
    pub language: Option<Code>,
    pub currency: Option<Code>,
}

/// Whether an attribute must be present for a given element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Optional,
    Mandatory,
}

impl From<bool> for Requirement {
    fn from(required: bool) -> Self {
        if required {
            Requirement::Mandatory
        } else {
            Requirement::Optional
        }
    }
}

/// Strict `xsd:date` parsing
///
/// Accepts `YYYY-MM-DD`, optionally followed by a timezone or a full time
/// part, with the year between 1900 and 2100.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10)?;
    let rest = &raw[10..];
    let valid_suffix = rest.is_empty()
        || TIMEZONE.is_match(rest)
        || (rest.starts_with('T')
            && (DateTime::parse_from_rfc3339(raw).is_ok()
                || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()));
    if !valid_suffix {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .filter(|date| (MIN_YEAR..=MAX_YEAR).contains(&date.year()))
}

/// Strict `xsd:dateTime` parsing, also accepting a plain date (midnight UTC)
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })?;
    (MIN_YEAR..=MAX_YEAR)
        .contains(&parsed.year())
        .then_some(parsed)
}

/// A date that may be absent; an invalid value is dropped
pub fn optional_date(raw: Option<&str>, context: &str, field: &str) -> Option<NaiveDate> {
    let raw = raw?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        debug!(context, field, value = raw, "Dropping invalid optional date");
    }
    parsed
}

/// A date that must be present and valid
pub fn required_date(raw: Option<&str>, context: &str, field: &str) -> ParseResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ParseError::required(context, field, "required attribute missing"))?;
    parse_date(raw).ok_or_else(|| {
        ParseError::invalid_value(context, field, "is not a valid xsd:date in range", raw)
    })
}

/// The `value-date` of a monetary element
pub fn value_date(raw: Option<&str>, requirement: Requirement, context: &str) -> ParseResult<Option<NaiveDate>> {
    match requirement {
        Requirement::Optional => Ok(optional_date(raw, context, "value-date")),
        Requirement::Mandatory => required_date(raw, context, "value-date").map(Some),
    }
}

/// Language declared on a record root, falling back to the installation default
pub fn record_language(ctx: &RecordContext<'_>, root: &Element) -> Option<Code> {
    let code = root
        .lang()
        .or(ctx.fallback_language)
        .map(str::to_lowercase);
    ctx.code(CodelistType::Language, code.as_deref())
}

/// Build a narrative for the current entity of `parent` and register it
///
/// The element's own `xml:lang` wins when it resolves; otherwise the record
/// default applies. Returns the narrative's index under `<Parent>Narrative`.
pub fn add_narrative(ctx: &mut RecordContext<'_>, element: &Element, parent: EntityKind) -> ParseResult<usize> {
    let context = StoreKey::Narrative(parent).to_string();
    let parent_ref = ctx.parent_ref(parent)?;

    let explicit = element.lang().map(str::to_lowercase);
    let language = ctx
        .code(CodelistType::Language, explicit.as_deref())
        .or_else(|| ctx.defaults.language.clone())
        .ok_or_else(|| {
            ParseError::required(
                &context,
                "xml:lang",
                "must be set on the record root or on the element itself",
            )
        })?;

    let content = element
        .text()
        .ok_or_else(|| ParseError::required(&context, "text", "empty narrative"))?
        .to_string();

    Ok(ctx.register_narrative(
        parent,
        Narrative {
            parent: parent_ref,
            language,
            content,
        },
    ))
}

/// Currency of a monetary element
///
/// An explicit attribute is always resolved on its own and never replaced by
/// the record default, even when it is not on the codelist.
pub fn currency(ctx: &RecordContext<'_>, explicit: Option<&str>, context: &str) -> ParseResult<Code> {
    match explicit.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => ctx.required_code(CodelistType::Currency, Some(code), context, "currency"),
        None => ctx.defaults.currency.clone().ok_or_else(|| {
            ParseError::required(
                context,
                "currency",
                "must be set as default-currency on the record root or as currency on the element itself",
            )
        }),
    }
}

/// Read a `value` element: currency, value date and the raw amount text
pub fn monetary_value(
    ctx: &RecordContext<'_>,
    element: &Element,
    context: &str,
    value_date_requirement: Requirement,
) -> ParseResult<MonetaryValue> {
    let currency = currency(ctx, element.attr("currency"), context)?;
    let value_date = value_date(element.attr("value-date"), value_date_requirement, context)?;
    Ok(MonetaryValue {
        amount: element.text().unwrap_or_default().to_string(),
        currency,
        value_date,
    })
}

/// Parse an XML boolean (`1`/`0`/`true`/`false`)
pub fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::trim)? {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelists::{InMemoryCodelists, ReferenceResolver};
    use crate::models::{Organisation, StoredEntity};
    use crate::storage::InMemoryBackend;
    use crate::store::ModelStore;

    fn codelists() -> InMemoryCodelists {
        InMemoryCodelists::new()
            .with_codes(CodelistType::Language, &["en", "fr"])
            .with_codes(CodelistType::Currency, &["USD", "EUR"])
    }

    fn with_context<R>(defaults: RecordDefaults, f: impl FnOnce(&mut RecordContext<'_>) -> R) -> (R, ModelStore) {
        let lists = codelists();
        let backend = InMemoryBackend::new();
        let mut store = ModelStore::new();
        let result = {
            let mut ctx = RecordContext::new(&mut store, ReferenceResolver::new(&lists, &backend), "2.02", "test");
            ctx.defaults = defaults;
            ctx.register(EntityKind::Organisation, Organisation::new("XM-DAC-1", "2.02", "test"));
            f(&mut ctx)
        };
        (result, store)
    }

    fn english() -> RecordDefaults {
        RecordDefaults {
            language: Some(Code::new(CodelistType::Language, "en")),
            currency: Some(Code::new(CodelistType::Currency, "EUR")),
        }
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2014-01-01"), NaiveDate::from_ymd_opt(2014, 1, 1));
        assert_eq!(parse_date("2014-01-01T10:00:00Z"), NaiveDate::from_ymd_opt(2014, 1, 1));
        assert_eq!(parse_date("2014-13-01"), None);
        assert_eq!(parse_date("1850-01-01"), None);
        assert_eq!(parse_date("01-01-2014"), None);
        assert_eq!(parse_date("2014-01-011"), None);
        assert_eq!(parse_date(""), None);

        let expected = NaiveDate::from_ymd_opt(2014, 1, 1);
        assert_eq!(parse_date("2014-01-01Z"), expected);
        assert_eq!(parse_date("2014-01-01+02:00"), expected);
        assert_eq!(parse_date("2014-01-01-05:30"), expected);
        assert_eq!(parse_date("2014-01-01T10:00:00"), expected);
        assert_eq!(parse_date("2014-01-01T10:00:00.250+01:00"), expected);
        assert_eq!(parse_date("2014-01-01 garbage"), None);
        assert_eq!(parse_date("2014-01-01Tnot-a-time"), None);
        assert_eq!(parse_date("2014-01-01-xx"), None);
        assert_eq!(parse_date("2014-01-01T25:00:00"), None);
        assert_eq!(parse_date("2014-01-01+99:00"), None);
    }

    #[test]
    fn test_parse_datetime() {
        assert!(parse_datetime("2014-09-10T07:15:37Z").is_some());
        assert!(parse_datetime("2014-09-10T07:15:37").is_some());
        assert!(parse_datetime("2014-09-10").is_some());
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime("2200-01-01").is_none());
    }

    #[test]
    fn test_value_date_requirements() {
        assert_eq!(value_date(None, Requirement::Optional, "total-budget/value").unwrap(), None);
        assert_eq!(value_date(Some("bad"), Requirement::Optional, "total-budget/value").unwrap(), None);

        let missing = value_date(None, Requirement::Mandatory, "recipient-org-budget/value").unwrap_err();
        assert_eq!(missing.kind(), "RequiredFieldError");
        let invalid = value_date(Some("bad"), Requirement::Mandatory, "recipient-org-budget/value").unwrap_err();
        assert_eq!(invalid.kind(), "FieldValidationError");
    }

    #[test]
    fn test_narrative_inherits_record_language() {
        let element = Element::new("narrative").with_text("Example Org");
        let (result, store) = with_context(english(), |ctx| add_narrative(ctx, &element, EntityKind::Organisation));
        assert_eq!(result.unwrap(), 0);

        let narrative = Narrative::from_entity(
            store
                .get(StoreKey::Narrative(EntityKind::Organisation), None)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(narrative.language.code, "en");
        assert_eq!(narrative.content, "Example Org");
    }

    #[test]
    fn test_narrative_without_any_language_is_required_field() {
        let element = Element::new("narrative").with_text("Example Org");
        let (result, _) = with_context(RecordDefaults::default(), |ctx| {
            add_narrative(ctx, &element, EntityKind::Organisation)
        });
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ParseError::RequiredField { ref context, ref field, .. }
                if context == "OrganisationNarrative" && field == "xml:lang"
        ));
    }

    #[test]
    fn test_narrative_explicit_language_wins() {
        let element = Element::new("narrative")
            .with_attribute("xml:lang", "FR")
            .with_text("Exemple");
        let (_, store) = with_context(english(), |ctx| add_narrative(ctx, &element, EntityKind::Organisation));
        let narrative = Narrative::from_entity(
            store
                .get(StoreKey::Narrative(EntityKind::Organisation), None)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(narrative.language.code, "fr");
    }

    #[test]
    fn test_empty_narrative_is_required_field() {
        let element = Element::new("narrative").with_attribute("xml:lang", "en");
        let (result, _) = with_context(english(), |ctx| add_narrative(ctx, &element, EntityKind::Organisation));
        assert!(matches!(
            result,
            Err(ParseError::RequiredField { ref field, .. }) if field == "text"
        ));
    }

    #[test]
    fn test_currency_default_and_explicit() {
        let (result, _) = with_context(english(), |ctx| currency(ctx, None, "total-budget/value"));
        assert_eq!(result.unwrap().code, "EUR");

        let (result, _) = with_context(english(), |ctx| currency(ctx, Some("USD"), "total-budget/value"));
        assert_eq!(result.unwrap().code, "USD");
    }

    #[test]
    fn test_explicit_unknown_currency_never_defaults() {
        let (result, _) = with_context(english(), |ctx| currency(ctx, Some("XXX"), "total-budget/value"));
        assert!(matches!(
            result,
            Err(ParseError::FieldValidation { value: Some(ref v), .. }) if v == "XXX"
        ));
    }

    #[test]
    fn test_missing_currency_names_path() {
        let (result, _) = with_context(RecordDefaults::default(), |ctx| {
            currency(ctx, None, "recipient-org-budget/budget-line/value")
        });
        assert!(matches!(
            result,
            Err(ParseError::RequiredField { ref context, .. })
                if context == "recipient-org-budget/budget-line/value"
        ));
    }

    #[test]
    fn test_monetary_value_keeps_raw_text() {
        let element = Element::new("value")
            .with_attribute("currency", "USD")
            .with_attribute("value-date", "2014-01-01")
            .with_text("1000.50");
        let (result, _) = with_context(english(), |ctx| {
            monetary_value(ctx, &element, "total-budget/value", Requirement::Optional)
        });
        let value = result.unwrap();
        assert_eq!(value.amount, "1000.50");
        assert_eq!(value.currency.code, "USD");
        assert_eq!(value.value_date, NaiveDate::from_ymd_opt(2014, 1, 1));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(Some("1")), Some(true));
        assert_eq!(parse_bool(Some("false")), Some(false));
        assert_eq!(parse_bool(Some("maybe")), None);
        assert_eq!(parse_bool(None), None);
    }
}
