//! Parse command implementation

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::cli::output::{format_committed_record, format_report};
use crate::codelists::InMemoryCodelists;
use crate::config::ParserConfig;
use crate::document::Document;
use crate::models::RecordKind;
use crate::parser::{IatiParser, SourceMetadata};
use crate::storage::InMemoryBackend;

/// Arguments of the parse command
#[derive(Debug, Clone)]
pub struct ParseArgs {
    pub file: PathBuf,
    pub kind: RecordKind,
    pub codelists: PathBuf,
    pub config: Option<PathBuf>,
    pub version: Option<String>,
    pub record: Option<String>,
    pub json: bool,
}

/// Handle the parse command
pub fn handle_parse(args: &ParseArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ParserConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ParserConfig::default(),
    };
    let codelists = InMemoryCodelists::from_file(&args.codelists)
        .with_context(|| format!("Failed to load codelists {}", args.codelists.display()))?;
    let document = Document::from_file(&args.file)?;

    let mut meta = SourceMetadata::new(args.kind, args.file.display().to_string());
    if let Some(version) = &args.version {
        meta = meta.with_version(version);
    }

    let parser = IatiParser::new(codelists, InMemoryBackend::new()).with_config(config);

    if let Some(identifier) = &args.record {
        let committed = parser
            .parse_one(&document, &meta, identifier)
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&committed)?);
        } else {
            print!("{}", format_committed_record(&committed));
        }
        return Ok(());
    }

    let report = parser.parse_all(&document, &meta)?;
    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print!("{}", format_report(&report));
    }

    if report.committed() == 0 && report.total() > 0 {
        bail!("No record of {} could be committed", meta.source_ref);
    }
    Ok(())
}
