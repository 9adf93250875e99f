//! Organisation budget families and total expenditure
//!
//! `total-budget`, `recipient-org-budget`, `recipient-country-budget` and
//! `recipient-region-budget` share one set of handlers parametrized by
//! [`BudgetFamily`]. The families differ only in their recipient element and
//! in whether `value/@value-date` is mandatory.

use crate::codelists::CodelistType;
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{Budget, BudgetFamily, BudgetLine, EntityKind, Expenditure, MonetaryValue};
use crate::parser::Generation;
use crate::parser::defaults::{Requirement, add_narrative, monetary_value, optional_date, value_date};
use crate::parser::dispatch::{HandlerTable, RecordContext, Visit};

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

impl Bound {
    fn tag(self) -> &'static str {
        match self {
            Bound::Start => "period-start",
            Bound::End => "period-end",
        }
    }
}

/// Register all handlers of one budget family
pub(super) fn register_family(table: &mut HandlerTable, family: BudgetFamily, generation: Generation) {
    let tag = family.tag();

    table.register(tag, move |ctx, el| budget(ctx, el, family));
    for bound in [Bound::Start, Bound::End] {
        table.register(&format!("{tag}/{}", bound.tag()), move |ctx, el| {
            budget_period(ctx, el, family, bound)
        });
    }
    table.register(&format!("{tag}/value"), move |ctx, el| budget_value(ctx, el, family));
    table.register(&format!("{tag}/budget-line"), move |ctx, el| budget_line(ctx, el, family));
    table.register(&format!("{tag}/budget-line/value"), move |ctx, el| {
        budget_line_value(ctx, el, family)
    });
    table.register(&format!("{tag}/budget-line/narrative"), move |ctx, el| {
        add_narrative(ctx, el, EntityKind::OrganisationBudgetLine(family))?;
        Ok(Visit::Descend)
    });

    match family {
        BudgetFamily::Total => {}
        BudgetFamily::RecipientOrg => {
            table.register(&format!("{tag}/recipient-org"), move |ctx, el| {
                recipient_org(ctx, el)?;
                recipient_text(ctx, el, family, generation)
            });
        }
        BudgetFamily::RecipientCountry => {
            table.register(&format!("{tag}/recipient-country"), move |ctx, el| {
                let country = ctx.code(CodelistType::Country, el.attr("code"));
                ctx.entity_mut::<Budget>(EntityKind::OrganisationBudget(family))?.recipient_country = country;
                recipient_text(ctx, el, family, generation)
            });
        }
        BudgetFamily::RecipientRegion => {
            table.register(&format!("{tag}/recipient-region"), move |ctx, el| {
                recipient_region(ctx, el)?;
                recipient_text(ctx, el, family, generation)
            });
        }
    }

    if generation == Generation::V2 && family != BudgetFamily::Total {
        let recipient = match family {
            BudgetFamily::RecipientOrg => "recipient-org",
            BudgetFamily::RecipientCountry => "recipient-country",
            _ => "recipient-region",
        };
        table.register(&format!("{tag}/{recipient}/narrative"), move |ctx, el| {
            add_narrative(ctx, el, EntityKind::OrganisationBudget(family))?;
            Ok(Visit::Descend)
        });
    }
}

/// Register the `total-expenditure` handlers
pub(super) fn register_expenditure(table: &mut HandlerTable) {
    table.register("total-expenditure", total_expenditure);
    for bound in [Bound::Start, Bound::End] {
        table.register(&format!("total-expenditure/{}", bound.tag()), move |ctx, el| {
            expenditure_period(ctx, el, bound)
        });
    }
    table.register("total-expenditure/value", expenditure_value);
    table.register("total-expenditure/expense-line", expense_line);
    table.register("total-expenditure/expense-line/value", expense_line_value);
    table.register("total-expenditure/expense-line/narrative", |ctx, el| {
        add_narrative(ctx, el, EntityKind::TotalExpenditureLine)?;
        Ok(Visit::Descend)
    });
}

fn budget(ctx: &mut RecordContext<'_>, element: &Element, family: BudgetFamily) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(EntityKind::Organisation)?;
    let mut budget = Budget::new(parent);
    budget.status = ctx.code(CodelistType::BudgetStatus, element.attr("status"));
    ctx.register(EntityKind::OrganisationBudget(family), budget);
    Ok(Visit::Descend)
}

fn budget_period(
    ctx: &mut RecordContext<'_>,
    element: &Element,
    family: BudgetFamily,
    bound: Bound,
) -> ParseResult<Visit> {
    let context = format!("{}/{}", family.tag(), bound.tag());
    let date = optional_date(element.attr("iso-date"), &context, "iso-date");
    let budget = ctx.entity_mut::<Budget>(EntityKind::OrganisationBudget(family))?;
    match bound {
        Bound::Start => budget.period_start = date,
        Bound::End => budget.period_end = date,
    }
    Ok(Visit::Descend)
}

fn budget_value(ctx: &mut RecordContext<'_>, element: &Element, family: BudgetFamily) -> ParseResult<Visit> {
    let context = format!("{}/value", family.tag());
    let value = monetary_value(ctx, element, &context, family.value_date_required().into())?;
    ctx.entity_mut::<Budget>(EntityKind::OrganisationBudget(family))?.value = Some(value);
    Ok(Visit::Descend)
}

fn budget_line(ctx: &mut RecordContext<'_>, element: &Element, family: BudgetFamily) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(EntityKind::OrganisationBudget(family))?;
    let line = BudgetLine {
        parent,
        reference: element.attr("ref").unwrap_or("-").to_string(),
        value: None,
    };
    ctx.register(EntityKind::OrganisationBudgetLine(family), line);
    Ok(Visit::Descend)
}

fn budget_line_value(ctx: &mut RecordContext<'_>, element: &Element, family: BudgetFamily) -> ParseResult<Visit> {
    let context = format!("{}/budget-line/value", family.tag());
    let value = monetary_value(ctx, element, &context, Requirement::Optional)?;
    ctx.entity_mut::<BudgetLine>(EntityKind::OrganisationBudgetLine(family))?.value = Some(value);
    Ok(Visit::Descend)
}

fn recipient_org(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let reference = element.attr_non_empty("ref");
    let found = ctx.resolver().find_organisation(reference);
    let budget = ctx.entity_mut::<Budget>(EntityKind::OrganisationBudget(BudgetFamily::RecipientOrg))?;
    budget.recipient_org_ref = reference.map(str::to_string);
    budget.recipient_org = found;
    Ok(())
}

fn recipient_region(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<()> {
    let vocabulary = ctx
        .code(
            CodelistType::RegionVocabulary,
            Some(element.attr_non_empty("vocabulary").unwrap_or("1")),
        )
        .ok_or_else(|| ParseError::required("recipient-region-budget", "recipient-region", "invalid vocabulary"))?;
    let region = ctx.code(CodelistType::Region, element.attr("code"));

    let budget = ctx.entity_mut::<Budget>(EntityKind::OrganisationBudget(BudgetFamily::RecipientRegion))?;
    budget.recipient_region = region;
    budget.region_vocabulary = Some(vocabulary);
    budget.vocabulary_uri = element.attr_non_empty("vocabulary-uri").map(str::to_string);
    Ok(())
}

/// In 1.0x the recipient element carries its name as text
fn recipient_text(
    ctx: &mut RecordContext<'_>,
    element: &Element,
    family: BudgetFamily,
    generation: Generation,
) -> ParseResult<Visit> {
    if generation == Generation::V1 && element.text().is_some() {
        add_narrative(ctx, element, EntityKind::OrganisationBudget(family))?;
    }
    Ok(Visit::Descend)
}

fn total_expenditure(ctx: &mut RecordContext<'_>, _element: &Element) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(EntityKind::Organisation)?;
    ctx.register(
        EntityKind::TotalExpenditure,
        Expenditure {
            parent,
            period_start: None,
            period_end: None,
            value: None,
        },
    );
    Ok(Visit::Descend)
}

fn expenditure_period(ctx: &mut RecordContext<'_>, element: &Element, bound: Bound) -> ParseResult<Visit> {
    let context = format!("total-expenditure/{}", bound.tag());
    let date = optional_date(element.attr("iso-date"), &context, "iso-date");
    let expenditure = ctx.entity_mut::<Expenditure>(EntityKind::TotalExpenditure)?;
    match bound {
        Bound::Start => expenditure.period_start = date,
        Bound::End => expenditure.period_end = date,
    }
    Ok(Visit::Descend)
}

/// Total expenditure names its currency explicitly; the record default does not apply
fn expenditure_value(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    let context = "total-expenditure/value";
    let currency = ctx.required_code(CodelistType::Currency, element.attr("currency"), context, "currency")?;
    let value_date = value_date(element.attr("value-date"), Requirement::Optional, context)?;
    let value = MonetaryValue {
        amount: element.text().unwrap_or_default().to_string(),
        currency,
        value_date,
    };
    ctx.entity_mut::<Expenditure>(EntityKind::TotalExpenditure)?.value = Some(value);
    Ok(Visit::Descend)
}

fn expense_line(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(EntityKind::TotalExpenditure)?;
    let line = BudgetLine {
        parent,
        reference: element.attr("ref").unwrap_or_default().to_string(),
        value: None,
    };
    ctx.register(EntityKind::TotalExpenditureLine, line);
    Ok(Visit::Descend)
}

fn expense_line_value(ctx: &mut RecordContext<'_>, element: &Element) -> ParseResult<Visit> {
    let value = monetary_value(ctx, element, "total-expenditure/expense-line/value", Requirement::Optional)?;
    ctx.entity_mut::<BudgetLine>(EntityKind::TotalExpenditureLine)?.value = Some(value);
    Ok(Visit::Descend)
}
