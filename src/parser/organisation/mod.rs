//! Organisation handler tables
//!
//! Two generations: 2.0x (`organisation-identifier`, narratives nested in
//! `narrative` children) and 1.0x (`iati-identifier`, text directly on the
//! element). 1.0x is also the fallback for unrecognised versions.

mod budgets;

use once_cell::sync::Lazy;

use crate::codelists::CodelistType;
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{
    BudgetFamily, EntityKind, Organisation, RecordKind, ReportingOrg, TextBlock, normalize_identifier,
};
use crate::parser::Generation;
use crate::parser::defaults::{RecordDefaults, add_narrative, parse_bool, parse_datetime, record_language};
use crate::parser::dispatch::{HandlerTable, RecordContext, Visit};
use crate::parser::document_link::{self, LinkOwner};

const RECORD_TAG: &str = "iati-organisation";

/// Handler table for organisation schema 2.01 to 2.03
pub static V2_TABLE: Lazy<HandlerTable> = Lazy::new(|| build(Generation::V2));

/// Handler table for organisation schema 1.0x
pub static V1_TABLE: Lazy<HandlerTable> = Lazy::new(|| build(Generation::V1));

fn build(generation: Generation) -> HandlerTable {
    let identifier_tag = identifier_tag(generation);
    let name = match generation {
        Generation::V2 => "organisation-2",
        Generation::V1 => "organisation-1",
    };
    let mut table = HandlerTable::new(name, RECORD_TAG, identifier_tag);

    table.register("", move |ctx, el| organisation(ctx, el, identifier_tag));
    table.register(identifier_tag, |_, _| Ok(Visit::Descend));

    match generation {
        Generation::V2 => {
            table.register("name", name_v2);
            table.register("name/narrative", |ctx, el| {
                name_narrative(ctx, el)?;
                Ok(Visit::Descend)
            });
            table.register("reporting-org", reporting_org_v2);
            table.register("reporting-org/narrative", |ctx, el| {
                add_narrative(ctx, el, EntityKind::OrganisationReportingOrg)?;
                Ok(Visit::Descend)
            });
            for family in BudgetFamily::ALL {
                budgets::register_family(&mut table, family, generation);
            }
            budgets::register_expenditure(&mut table);
        }
        Generation::V1 => {
            table.register("name", name_v1);
            table.register("reporting-org", reporting_org_v1);
            for family in [BudgetFamily::Total, BudgetFamily::RecipientOrg, BudgetFamily::RecipientCountry] {
                budgets::register_family(&mut table, family, generation);
            }
        }
    }

    document_link::register(&mut table, LinkOwner::Organisation, generation);
    table
}

/// Element holding the organisation's natural key
pub fn identifier_tag(generation: Generation) -> &'static str {
    match generation {
        Generation::V2 => "organisation-identifier",
        Generation::V1 => "iati-identifier",
    }
}

fn organisation(ctx: &mut RecordContext<'_>, element: &Element, identifier_tag: &str) -> ParseResult<Visit> {
    let identifier = element.child_text(identifier_tag).ok_or_else(|| {
        ParseError::required(
            RECORD_TAG,
            identifier_tag,
            format!("organisation must contain {identifier_tag}"),
        )
    })?;

    ctx.defaults = RecordDefaults {
        language: record_language(ctx, element),
        currency: ctx.code(CodelistType::Currency, element.attr("default-currency")),
    };
    ctx.replaces = ctx.resolver().existing_record(RecordKind::Organisation, identifier)?;

    let mut organisation = Organisation::new(identifier, ctx.version, ctx.source);
    organisation.last_updated_datetime = element.attr("last-updated-datetime").and_then(parse_datetime);
    organisation.default_language = ctx.defaults.language.clone();
    organisation.default_currency = ctx.defaults.currency.clone();

    ctx.register(EntityKind::Organisation, organisation);
    Ok(Visit::Descend)
}

fn name(ctx: &mut RecordContext<'_>) -> ParseResult<()> {
    // Only the current record is checked; persisted names are replaced anyway
    if ctx.count(EntityKind::OrganisationName) > 0 {
        return Err(ParseError::invalid("name", "name", "duplicate names are not allowed"));
    }
    let parent = ctx.parent_ref(EntityKind::Organisation)?;
    ctx.register(EntityKind::OrganisationName, TextBlock { parent });
    Ok(())
}

fn name_v2(ctx: &mut RecordContext<'_>, _element: &Element) -> ParseResult<Visit> {
    name(ctx)?;
    Ok(Visit::Descend)
}

fn name_v1(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    name(ctx)?;
    name_narrative(ctx, element)?;
    Ok(Visit::SkipChildren)
}

/// Add a name narrative and keep `primary_name` current
///
/// The first narrative becomes the primary name; a later English one replaces it.
fn name_narrative(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    add_narrative(ctx, element, EntityKind::OrganisationName)?;

    let Some(text) = element.text() else {
        return Ok(());
    };
    let language = element
        .lang()
        .map(str::to_lowercase)
        .or_else(|| ctx.defaults.language.as_ref().map(|code| code.code.clone()));

    let organisation = ctx.entity_mut::<Organisation>(EntityKind::Organisation)?;
    if organisation.primary_name.is_none() || language.as_deref() == Some("en") {
        organisation.primary_name = Some(text.to_string());
    }
    Ok(())
}

fn reporting_org_v2(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    if ctx.count(EntityKind::OrganisationReportingOrg) > 0 {
        return Err(ParseError::parser(
            "Organisation",
            "OrganisationReportingOrganisation",
            "must occur no more than once",
        ));
    }
    if element.children_named("narrative").next().is_none() {
        return Err(ParseError::required(
            "OrganisationReportingOrganisation",
            "narrative",
            "must occur at least once",
        ));
    }
    reporting_org(ctx, element)?;
    Ok(Visit::Descend)
}

fn reporting_org_v1(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    if ctx.count(EntityKind::OrganisationReportingOrg) > 0 {
        return Err(ParseError::parser(
            "Organisation",
            "OrganisationReportingOrganisation",
            "must occur no more than once",
        ));
    }
    reporting_org(ctx, element)?;
    if element.text().is_some() {
        add_narrative(ctx, element, EntityKind::OrganisationReportingOrg)?;
    }
    Ok(Visit::SkipChildren)
}

fn reporting_org(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let context = "OrganisationReportingOrganisation";
    let reference = element
        .attr_non_empty("ref")
        .ok_or_else(|| ParseError::required(context, "ref", "required field missing"))?;
    let org_type = ctx.required_code(CodelistType::OrganisationType, element.attr("type"), context, "type")?;
    let parent = ctx.parent_ref(EntityKind::Organisation)?;

    let reporting_org = ReportingOrg {
        parent,
        reference: reference.to_string(),
        normalized_reference: normalize_identifier(reference),
        org_type: Some(org_type),
        secondary_reporter: parse_bool(element.attr("secondary-reporter")).unwrap_or(false),
        organisation: ctx.resolver().find_organisation(Some(reference)),
    };
    ctx.register(EntityKind::OrganisationReportingOrg, reporting_org);
    Ok(())
}
