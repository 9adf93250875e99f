//! Output formatting for CLI

use crate::hooks::CommittedRecord;
use crate::parser::{ParseReport, RecordOutcome};

/// Format a parse report for the terminal
pub fn format_report(report: &ParseReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Parsed {} ({} records, table {}, version {})\n",
        report.source,
        report.total(),
        report.table,
        report.version.as_deref().unwrap_or("unknown"),
    ));

    if report.errors_count > 0 {
        output.push_str(&format!("\n⚠️  {} record(s) failed:\n", report.errors_count));
        for error in &report.errors {
            output.push_str(&format!("  - {}\n", error));
        }
        if report.errors_count > report.errors.len() {
            output.push_str(&format!("  ... and {} more\n", report.errors_count - report.errors.len()));
        }
    }

    output.push_str(&format!("\n✅ Committed {} record(s):\n", report.committed()));
    for outcome in &report.outcomes {
        if let RecordOutcome::Committed(record) = outcome {
            output.push_str(&format!(
                "  - {} ({} child entities{})\n",
                record.identifier,
                record.child_count,
                if record.replaced { ", replaced" } else { "" },
            ));
        }
    }

    if !report.pruned.is_empty() {
        output.push_str(&format!("\nPruned {} record(s): {}\n", report.pruned.len(), report.pruned.join(", ")));
    }
    if report.hook_failures > 0 {
        output.push_str(&format!("\n⚠️  {} post-commit hook failure(s)\n", report.hook_failures));
    }

    output.push_str(&format!("\nDone in {}\n", report.duration_string()));
    output
}

/// Format a single committed record
pub fn format_committed_record(record: &CommittedRecord) -> String {
    format!(
        "✅ Committed {} {} as {} ({} child entities{})\n",
        record.kind,
        record.identifier,
        record.id,
        record.child_count,
        if record.replaced { ", replaced" } else { "" },
    )
}
