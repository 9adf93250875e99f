//! Activity handler tables

use once_cell::sync::Lazy;
use tracing::debug;

use crate::codelists::CodelistType;
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{
    Activity, Budget, Description, EntityKind, ParticipatingOrg, RecordKind, ReportingOrg, TextBlock,
    normalize_identifier,
};
use crate::parser::Generation;
use crate::parser::defaults::{
    RecordDefaults, Requirement, add_narrative, monetary_value, parse_bool, parse_datetime, record_language,
    required_date,
};
use crate::parser::dispatch::{HandlerTable, RecordContext, Visit};
use crate::parser::document_link::{self, LinkOwner};

const RECORD_TAG: &str = "iati-activity";
const IDENTIFIER_TAG: &str = "iati-identifier";

/// Handler table for activity schema 2.01 to 2.03
pub static V2_TABLE: Lazy<HandlerTable> = Lazy::new(|| build(Generation::V2));

/// Handler table for activity schema 1.0x
pub static V1_TABLE: Lazy<HandlerTable> = Lazy::new(|| build(Generation::V1));

fn build(generation: Generation) -> HandlerTable {
    let name = match generation {
        Generation::V2 => "activity-2",
        Generation::V1 => "activity-1",
    };
    let mut table = HandlerTable::new(name, RECORD_TAG, IDENTIFIER_TAG);

    table.register("", activity);
    table.register(IDENTIFIER_TAG, |_, _| Ok(Visit::Descend));

    table.register("reporting-org", move |ctx, el| {
        reporting_org(ctx, el)?;
        own_text(ctx, el, EntityKind::ActivityReportingOrg, generation)
    });
    table.register("participating-org", move |ctx, el| {
        participating_org(ctx, el)?;
        own_text(ctx, el, EntityKind::ParticipatingOrg, generation)
    });
    table.register("title", move |ctx, el| {
        title(ctx)?;
        own_text(ctx, el, EntityKind::ActivityTitle, generation)
    });
    table.register("description", move |ctx, el| {
        description(ctx, el)?;
        own_text(ctx, el, EntityKind::ActivityDescription, generation)
    });

    if generation == Generation::V2 {
        for (path, parent) in [
            ("reporting-org/narrative", EntityKind::ActivityReportingOrg),
            ("participating-org/narrative", EntityKind::ParticipatingOrg),
            ("title/narrative", EntityKind::ActivityTitle),
            ("description/narrative", EntityKind::ActivityDescription),
        ] {
            table.register(path, move |ctx, el| {
                add_narrative(ctx, el, parent)?;
                Ok(Visit::Descend)
            });
        }
    }

    table.register("budget", budget);
    table.register("budget/period-start", |ctx, el| {
        let date = required_date(el.attr("iso-date"), "budget/period-start", "iso-date")?;
        ctx.entity_mut::<Budget>(EntityKind::ActivityBudget)?.period_start = Some(date);
        Ok(Visit::Descend)
    });
    table.register("budget/period-end", |ctx, el| {
        let date = required_date(el.attr("iso-date"), "budget/period-end", "iso-date")?;
        ctx.entity_mut::<Budget>(EntityKind::ActivityBudget)?.period_end = Some(date);
        Ok(Visit::Descend)
    });
    table.register("budget/value", |ctx, el| {
        let value = monetary_value(ctx, el, "budget/value", Requirement::Mandatory)?;
        ctx.entity_mut::<Budget>(EntityKind::ActivityBudget)?.value = Some(value);
        Ok(Visit::Descend)
    });

    document_link::register(&mut table, LinkOwner::Activity, generation);
    table
}

/// In 1.0x these elements are their own narrative
fn own_text(
    ctx: &mut RecordContext<'_>,
    element: &Element,
    parent: EntityKind,
    generation: Generation,
) -> ParseResult<Visit> {
    match generation {
        Generation::V2 => Ok(Visit::Descend),
        Generation::V1 => {
            if element.text().is_some() {
                add_narrative(ctx, element, parent)?;
            }
            Ok(Visit::SkipChildren)
        }
    }
}

fn activity(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    let identifier = element.child_text(IDENTIFIER_TAG).ok_or_else(|| {
        ParseError::required(RECORD_TAG, IDENTIFIER_TAG, "activity must contain iati-identifier")
    })?;

    ctx.defaults = RecordDefaults {
        language: record_language(ctx, element),
        currency: ctx.code(CodelistType::Currency, element.attr("default-currency")),
    };
    ctx.replaces = ctx.resolver().existing_record(RecordKind::Activity, identifier)?;

    let mut activity = Activity::new(identifier, ctx.version, ctx.source);
    activity.last_updated_datetime = element.attr("last-updated-datetime").and_then(parse_datetime);
    activity.default_language = ctx.defaults.language.clone();
    activity.default_currency = ctx.defaults.currency.clone();
    activity.hierarchy = element.attr_non_empty("hierarchy").and_then(|raw| {
        let parsed: Option<u32> = raw.trim().parse().ok();
        if parsed.is_none() {
            debug!(identifier, value = raw, "Ignoring non-numeric hierarchy");
        }
        parsed
    });
    activity.humanitarian = parse_bool(element.attr("humanitarian"));
    activity.linked_data_uri = element.attr_non_empty("linked-data-uri").map(str::to_string);

    ctx.register(EntityKind::Activity, activity);
    Ok(Visit::Descend)
}

fn reporting_org(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let reference = element
        .attr_non_empty("ref")
        .ok_or_else(|| ParseError::required("ActivityReportingOrganisation", "ref", "required field missing"))?;
    let parent = ctx.parent_ref(EntityKind::Activity)?;

    let reporting_org = ReportingOrg {
        parent,
        reference: reference.to_string(),
        normalized_reference: normalize_identifier(reference),
        org_type: ctx.code(CodelistType::OrganisationType, element.attr("type")),
        secondary_reporter: parse_bool(element.attr("secondary-reporter")).unwrap_or(false),
        organisation: ctx.resolver().find_organisation(Some(reference)),
    };
    ctx.register(EntityKind::ActivityReportingOrg, reporting_org);
    Ok(())
}

fn participating_org(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let role = ctx.required_code(
        CodelistType::OrganisationRole,
        element.attr("role"),
        "participating-org",
        "role",
    )?;
    let parent = ctx.parent_ref(EntityKind::Activity)?;
    let reference = element.attr_non_empty("ref");
    let activity_id = element.attr_non_empty("activity-id");

    let participating_org = ParticipatingOrg {
        parent,
        reference: reference.map(str::to_string),
        normalized_reference: reference.map(normalize_identifier),
        role,
        org_type: ctx.code(CodelistType::OrganisationType, element.attr("type")),
        activity_id: activity_id.map(str::to_string),
        organisation: ctx.resolver().find_organisation(reference),
        activity: ctx.resolver().find_activity(activity_id),
    };
    ctx.register(EntityKind::ParticipatingOrg, participating_org);
    Ok(())
}

fn title(ctx: &mut RecordContext<'_>) -> ParseResult<()> {
    if ctx.count(EntityKind::ActivityTitle) > 0 {
        return Err(ParseError::invalid("title", "title", "duplicate titles are not allowed"));
    }
    let parent = ctx.parent_ref(EntityKind::Activity)?;
    ctx.register(EntityKind::ActivityTitle, TextBlock { parent });
    Ok(())
}

fn description(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let parent = ctx.parent_ref(EntityKind::Activity)?;
    let description_type = ctx.code(
        CodelistType::DescriptionType,
        Some(element.attr_non_empty("type").unwrap_or("1")),
    );
    ctx.register(EntityKind::ActivityDescription, Description { parent, description_type });
    Ok(())
}

fn budget(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    let budget_type = ctx.required_code(
        CodelistType::BudgetType,
        Some(element.attr_non_empty("type").unwrap_or("1")),
        "budget",
        "type",
    )?;
    let status = ctx.required_code(
        CodelistType::BudgetStatus,
        Some(element.attr_non_empty("status").unwrap_or("1")),
        "budget",
        "status",
    )?;
    let parent = ctx.parent_ref(EntityKind::Activity)?;

    let mut budget = Budget::new(parent);
    budget.budget_type = Some(budget_type);
    budget.status = Some(status);
    ctx.register(EntityKind::ActivityBudget, budget);
    Ok(Visit::Descend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_paths() {
        for path in [
            "iati_activity",
            "iati_activity__iati_identifier",
            "iati_activity__reporting_org__narrative",
            "iati_activity__participating_org__narrative",
            "iati_activity__title__narrative",
            "iati_activity__description__narrative",
            "iati_activity__budget__period_start",
            "iati_activity__budget__value",
            "iati_activity__document_link__description__narrative",
            "iati_activity__document_link__document_date",
        ] {
            assert!(V2_TABLE.contains(path), "missing {path}");
        }
        assert!(!V2_TABLE.contains("iati_activity__document_link__recipient_country"));
    }

    #[test]
    fn test_v1_elements_carry_own_text() {
        assert!(V1_TABLE.contains("iati_activity__title"));
        assert!(!V1_TABLE.contains("iati_activity__title__narrative"));
        assert!(!V1_TABLE.contains("iati_activity__document_link__document_date"));
        assert_eq!(V1_TABLE.name(), "activity-1");
    }
}
