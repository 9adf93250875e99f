//! `document-link` handlers shared by organisation and activity tables

use crate::codelists::CodelistType;
use crate::document::Element;
use crate::error::{ParseError, ParseResult};
use crate::models::{Classification, DocumentLink, EntityKind, TextBlock};
use crate::parser::Generation;
use crate::parser::defaults::{add_narrative, required_date};
use crate::parser::dispatch::{HandlerTable, RecordContext, Visit};

/// Record type a document link hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkOwner {
    Organisation,
    Activity,
}

impl LinkOwner {
    fn owner_kind(self) -> EntityKind {
        match self {
            LinkOwner::Organisation => EntityKind::Organisation,
            LinkOwner::Activity => EntityKind::Activity,
        }
    }

    fn link_kind(self) -> EntityKind {
        match self {
            LinkOwner::Organisation => EntityKind::OrganisationDocumentLink,
            LinkOwner::Activity => EntityKind::ActivityDocumentLink,
        }
    }

    fn category_kind(self) -> EntityKind {
        match self {
            LinkOwner::Organisation => EntityKind::OrganisationDocumentLinkCategory,
            LinkOwner::Activity => EntityKind::DocumentLinkCategory,
        }
    }

    fn language_kind(self) -> EntityKind {
        match self {
            LinkOwner::Organisation => EntityKind::OrganisationDocumentLinkLanguage,
            LinkOwner::Activity => EntityKind::DocumentLinkLanguage,
        }
    }
}

/// Register every document-link path for one owner and schema generation
pub(crate) fn register(table: &mut HandlerTable, owner: LinkOwner, generation: Generation) {
    table.register("document-link", move |ctx, el| document_link(ctx, el, owner, generation));
    table.register("document-link/category", move |ctx, el| {
        classification(ctx, el, owner, owner.category_kind(), CodelistType::DocumentCategory)
    });
    table.register("document-link/language", move |ctx, el| {
        classification(ctx, el, owner, owner.language_kind(), CodelistType::Language)
    });

    match generation {
        Generation::V1 => {
            table.register("document-link/title", move |ctx, el| {
                text_block(ctx, el, owner, EntityKind::DocumentLinkTitle)?;
                add_narrative(ctx, el, EntityKind::DocumentLinkTitle)?;
                Ok(Visit::SkipChildren)
            });
        }
        Generation::V2 => {
            table.register("document-link/title", move |ctx, el| {
                text_block(ctx, el, owner, EntityKind::DocumentLinkTitle)
            });
            table.register("document-link/title/narrative", |ctx, el| {
                add_narrative(ctx, el, EntityKind::DocumentLinkTitle)?;
                Ok(Visit::Descend)
            });
            table.register("document-link/document-date", move |ctx, el| document_date(ctx, el, owner));

            match owner {
                LinkOwner::Organisation => {
                    table.register("document-link/recipient-country", move |ctx, el| {
                        classification(
                            ctx,
                            el,
                            owner,
                            EntityKind::DocumentLinkRecipientCountry,
                            CodelistType::Country,
                        )
                    });
                }
                LinkOwner::Activity => {
                    table.register("document-link/description", move |ctx, el| {
                        text_block(ctx, el, owner, EntityKind::DocumentLinkDescription)
                    });
                    table.register("document-link/description/narrative", |ctx, el| {
                        add_narrative(ctx, el, EntityKind::DocumentLinkDescription)?;
                        Ok(Visit::Descend)
                    });
                }
            }
        }
    }
}

fn document_link(
    ctx: &mut RecordContext<'_>,
    element: &Element,
    owner: LinkOwner,
    generation: Generation,
) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(owner.owner_kind())?;
    let url = element.attr_non_empty("url").map(str::to_string);

    // Activity links from 2.0x on must name a resolvable url and format
    let format = if owner == LinkOwner::Activity && generation == Generation::V2 {
        if url.is_none() {
            return Err(ParseError::required("document-link", "url", "required attribute missing"));
        }
        Some(ctx.required_code(CodelistType::FileFormat, element.attr("format"), "document-link", "format")?)
    } else {
        ctx.code(CodelistType::FileFormat, element.attr("format"))
    };

    ctx.register(
        owner.link_kind(),
        DocumentLink {
            parent,
            url,
            format,
            document_date: None,
        },
    );
    Ok(Visit::Descend)
}

fn text_block(
    ctx: &mut RecordContext<'_>,
    _element: &Element,
    owner: LinkOwner,
    kind: EntityKind,
) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(owner.link_kind())?;
    ctx.register(kind, TextBlock { parent });
    Ok(Visit::Descend)
}

fn classification(
    ctx: &mut RecordContext<'_>,
    element: &Element,
    owner: LinkOwner,
    kind: EntityKind,
    list: CodelistType,
) -> ParseResult<Visit> {
    let parent = ctx.parent_ref(owner.link_kind())?;
    let raw = element.attr("code").map(|code| match list {
        CodelistType::Language => code.to_lowercase(),
        _ => code.to_string(),
    });
    let code = ctx.code(list, raw.as_deref());
    ctx.register(kind, Classification { parent, code });
    Ok(Visit::Descend)
}

fn document_date(ctx: &mut RecordContext<'_>, element: &Element, owner: LinkOwner) -> ParseResult<Visit> {
    let date = required_date(element.attr("iso-date"), "document-link/document-date", "iso-date")?;
    ctx.entity_mut::<DocumentLink>(owner.link_kind())?.document_date = Some(date);
    Ok(Visit::Descend)
}
