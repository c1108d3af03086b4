//! Human and JSON output for each command

use anyhow::Result;
use colored::*;
use serde::Serialize;
use sheetpress_core::{
    ProcessedWorkbook, RemovalPlan, RemovalReport, RenderResult, ResolvedSheet, SheetState,
};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripts
    Json,
}

/// Outcome of one file in a batch `strip`
pub enum StripOutcome {
    Written(RemovalReport),
    Planned { plan: RemovalPlan, output: PathBuf },
    Failed(anyhow::Error),
}

pub fn print_inspect(format: OutputFormat, file: &Path, sheets: &[ResolvedSheet]) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "sheets": sheets,
        })),
        OutputFormat::Human => {
            println!("{}", format!("Workbook: {}", file.display()).bold());
            println!();
            for (position, sheet) in sheets.iter().enumerate() {
                let state = match sheet.descriptor.state {
                    SheetState::Visible => "".normal(),
                    SheetState::Hidden => " (hidden)".yellow(),
                    SheetState::VeryHidden => " (very hidden)".yellow(),
                };
                println!(
                    "{:>3}. {}{}",
                    position + 1,
                    sheet.name().cyan().bold(),
                    state
                );
                println!(
                    "     {} {}  {} {}",
                    "sheetId".bright_black(),
                    sheet.descriptor.sheet_id,
                    "r:id".bright_black(),
                    sheet.descriptor.relationship_id
                );
                println!("     {} {}", "part".bright_black(), sheet.part);
                if let Some(rels) = &sheet.rels_part {
                    println!("     {} {}", "rels".bright_black(), rels);
                }
            }
            Ok(())
        }
    }
}

pub fn print_strip(format: OutputFormat, outcomes: &[(PathBuf, StripOutcome)]) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let files: Vec<_> = outcomes
                .iter()
                .map(|(file, outcome)| {
                    let file = file.display().to_string();
                    match outcome {
                        StripOutcome::Written(report) => serde_json::json!({
                            "file": file,
                            "status": "written",
                            "report": report,
                        }),
                        StripOutcome::Planned { plan, output } => serde_json::json!({
                            "file": file,
                            "status": "dry_run",
                            "output": output.display().to_string(),
                            "removed_sheet_names": plan.removed_names(),
                            "remaining_sheet_names": plan.remaining_names(),
                            "parts_to_delete": plan.parts_to_delete,
                        }),
                        StripOutcome::Failed(e) => serde_json::json!({
                            "file": file,
                            "status": "failed",
                            "error": format!("{e:#}"),
                        }),
                    }
                })
                .collect();
            print_json(&serde_json::json!({ "files": files }))
        }
        OutputFormat::Human => {
            for (file, outcome) in outcomes {
                match outcome {
                    StripOutcome::Written(report) => {
                        println!(
                            "{} {} -> {}",
                            "✓".green().bold(),
                            file.display(),
                            report.output_path.display()
                        );
                        print_names("removed", &report.removed_sheet_names);
                        print_names("kept", &report.remaining_sheet_names);
                    }
                    StripOutcome::Planned { plan, output } => {
                        println!(
                            "{} {} -> {}",
                            "[DRY RUN]".yellow().bold(),
                            file.display(),
                            output.display()
                        );
                        print_names("would remove", &plan.removed_names());
                        print_names("would keep", &plan.remaining_names());
                        for part in &plan.parts_to_delete {
                            println!("    {} {}", "delete".bright_black(), part);
                        }
                    }
                    StripOutcome::Failed(e) => {
                        println!("{} {}: {:#}", "✗".red().bold(), file.display(), e);
                    }
                }
            }
            Ok(())
        }
    }
}

pub fn print_render(format: OutputFormat, result: &RenderResult) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Human => {
            print_pdf_summary(result);
            Ok(())
        }
    }
}

pub fn print_process(format: OutputFormat, processed: &ProcessedWorkbook) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(processed),
        OutputFormat::Human => {
            println!(
                "{} {}",
                "✓".green().bold(),
                processed.cleaned_path.display()
            );
            print_names("removed", &processed.removal.removed_sheet_names);
            print_names("kept", &processed.removal.remaining_sheet_names);
            match (&processed.pdf, &processed.pdf_error) {
                (Some(result), _) => print_pdf_summary(result),
                (None, Some(reason)) => {
                    println!("{} PDF not produced", "✗".red().bold());
                    for line in reason.lines() {
                        println!("    {line}");
                    }
                }
                (None, None) => {}
            }
            Ok(())
        }
    }
}

fn print_pdf_summary(result: &RenderResult) {
    println!(
        "{} {} ({} bytes, {} sheet{})",
        "✓".green().bold(),
        result.output_path.display(),
        result.byte_size,
        result.sheet_count,
        if result.sheet_count == 1 { "" } else { "s" }
    );
    println!(
        "    {} {} after {} attempt{} in {}ms",
        "engine".bright_black(),
        result.engine_used.cyan(),
        result.attempts,
        if result.attempts == 1 { "" } else { "s" },
        result.elapsed_ms
    );
    for record in result.attempt_log.iter().filter(|r| r.message.is_some()) {
        println!(
            "    {} {}#{}: {}",
            "retry".yellow(),
            record.engine,
            record.attempt,
            record.message.as_deref().unwrap_or_default()
        );
    }
    for warning in &result.warnings {
        println!("    {} {}", "WARN".yellow().bold(), warning);
    }
}

fn print_names(label: &str, names: &[String]) {
    let list = if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    };
    println!("    {} {}", format!("{label}:").bright_black(), list);
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
