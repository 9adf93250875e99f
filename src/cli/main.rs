use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use iati_ingest::cli::commands::{ParseArgs, handle_parse};
use iati_ingest::models::RecordKind;

/// Document kind selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Organisation,
    Activity,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Organisation => RecordKind::Organisation,
            KindArg::Activity => RecordKind::Activity,
        }
    }
}

/// IATI dataset parser.
#[derive(Parser)]
#[command(name = "iati-ingest", version, about = "Parse IATI organisation and activity XML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a document into an in-memory store and print the report
    Parse {
        /// Path to the XML document
        file: PathBuf,
        /// Kind of records the document contains
        #[arg(long, value_enum)]
        kind: KindArg,
        /// YAML file listing the codelists
        #[arg(long)]
        codelists: PathBuf,
        /// TOML parser configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Schema version to use instead of the root's @version
        #[arg(long = "schema-version")]
        version: Option<String>,
        /// Parse only the record with this identifier
        #[arg(long)]
        record: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            file,
            kind,
            codelists,
            config,
            version,
            record,
            json,
        } => handle_parse(&ParseArgs {
            file,
            kind: kind.into(),
            codelists,
            config,
            version,
            record,
            json,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
