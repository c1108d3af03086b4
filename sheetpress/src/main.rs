use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use rayon::prelude::*;
use sheetpress_core::render::{Orientation, PageFormat, Quality};
use sheetpress_core::{
    PressConfig, SheetPredicate, SheetSelector, inspect_workbook, preview_removal,
    process_workbook_with, remove_sheets,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

mod formatter;
mod logger;

use formatter::{OutputFormat, StripOutcome};

#[derive(Parser)]
#[command(name = "sheetpress")]
#[command(about = "Strip worksheets from XLSX files and render what remains to PDF", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML); defaults to ./sheetpress.toml when present
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// List sheets with their ids and backing parts
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Remove sheets from one or more workbooks
    Strip(StripArgs),
    /// Render a workbook to PDF
    Render(RenderArgs),
    /// Strip then render, leaving both files in a directory
    Process {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Directory receiving the cleaned workbook and the PDF
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Remove sheets starting with this prefix instead of the configured one
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args)]
struct StripArgs {
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Remove sheets whose name starts with this prefix
    #[arg(long, conflicts_with_all = ["name", "regex"])]
    prefix: Option<String>,

    /// Remove sheets with exactly these names
    #[arg(long, num_args = 1.., value_name = "SHEET", conflicts_with = "regex")]
    name: Vec<String>,

    /// Remove sheets whose name matches this regular expression
    #[arg(long, value_name = "PATTERN")]
    regex: Option<String>,

    /// Output file (single input only)
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory for the outputs, one per input, same file names
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Show what would be done without making changes
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RenderArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output PDF
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum)]
    page_format: Option<PageFormatArg>,

    #[arg(long, value_enum)]
    orientation: Option<OrientationArg>,

    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Only render these sheets
    #[arg(long, num_args = 1.., value_name = "SHEET")]
    include: Vec<String>,

    /// Skip these sheets
    #[arg(long, num_args = 1.., value_name = "SHEET")]
    exclude: Vec<String>,

    #[arg(long)]
    watermark: Option<String>,

    /// Engines to try, in order (chromium, wkhtmltopdf, remote, mock)
    #[arg(long = "engine", num_args = 1.., value_name = "ENGINE")]
    engines: Vec<String>,

    /// Attempts per engine
    #[arg(long)]
    max_retries: Option<u32>,

    /// Time limit for one attempt
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PageFormatArg {
    A4,
    A3,
    Letter,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    High,
    Medium,
    Low,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when output was printed but some work failed
fn run(cli: &Cli) -> Result<bool> {
    let config = PressConfig::discover(cli.config.as_deref()).context("Invalid configuration")?;

    match &cli.command {
        Command::Inspect { file } => {
            let sheets = inspect_workbook(file)
                .with_context(|| format!("Failed to inspect {}", file.display()))?;
            formatter::print_inspect(cli.format, file, &sheets)?;
            Ok(true)
        }
        Command::Strip(args) => strip(cli.format, &config, args),
        Command::Render(args) => render(cli.format, config, args),
        Command::Process {
            file,
            out_dir,
            prefix,
        } => {
            let selector = match prefix {
                Some(prefix) => SheetSelector::prefix(prefix.as_str()),
                None => config.strip_selector(),
            };
            let orchestrator = config.orchestrator()?;
            let template = config.render_request("", "");
            let processed = process_workbook_with(&orchestrator, file, out_dir, &selector, &template)
                .with_context(|| format!("Failed to process {}", file.display()))?;
            formatter::print_process(cli.format, &processed)?;
            Ok(processed.pdf.is_some())
        }
    }
}

fn strip(format: OutputFormat, config: &PressConfig, args: &StripArgs) -> Result<bool> {
    let selector = if let Some(prefix) = &args.prefix {
        SheetSelector::prefix(prefix.as_str())
    } else if !args.name.is_empty() {
        SheetSelector::names(args.name.iter().cloned())
    } else if let Some(pattern) = &args.regex {
        SheetSelector::regex(pattern).with_context(|| format!("Invalid regex '{pattern}'"))?
    } else {
        config.strip_selector()
    };

    let targets: Vec<(PathBuf, PathBuf)> = match (&args.output, &args.out_dir) {
        (Some(output), None) => {
            if args.files.len() != 1 {
                bail!("--output takes a single input file; use --out-dir for several");
            }
            vec![(args.files[0].clone(), output.clone())]
        }
        (None, Some(dir)) => {
            if !args.dry_run {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            args.files
                .iter()
                .map(|file| Ok((file.clone(), output_in(dir, file)?)))
                .collect::<Result<_>>()?
        }
        _ => bail!("Output is required. Use --output <FILE> or --out-dir <DIR>."),
    };

    let outcomes: Vec<(PathBuf, StripOutcome)> = targets
        .par_iter()
        .map(|(input, output)| {
            let outcome = strip_one(&selector, input, output, args.dry_run);
            (input.clone(), outcome)
        })
        .collect();

    formatter::print_strip(format, &outcomes)?;
    Ok(outcomes
        .iter()
        .all(|(_, outcome)| !matches!(outcome, StripOutcome::Failed(_))))
}

fn strip_one(selector: &SheetSelector, input: &Path, output: &Path, dry_run: bool) -> StripOutcome {
    let result = if dry_run {
        preview_removal(input, selector).map(|plan| StripOutcome::Planned {
            plan,
            output: output.to_path_buf(),
        })
    } else {
        remove_sheets(input, output, selector).map(StripOutcome::Written)
    };
    result.unwrap_or_else(|e| {
        StripOutcome::Failed(anyhow::Error::new(e).context(format!(
            "Failed to strip {} with {}",
            input.display(),
            selector.describe()
        )))
    })
}

fn output_in(dir: &Path, input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("{} has no file name", input.display()))?;
    Ok(dir.join(name))
}

fn render(format: OutputFormat, mut config: PressConfig, args: &RenderArgs) -> Result<bool> {
    if !args.engines.is_empty() {
        config.render.engines = args.engines.clone();
    }
    if let Some(max_retries) = args.max_retries {
        config.render.max_retries = max_retries;
    }
    config.validate().context("Invalid render options")?;

    let mut request = config.render_request(&args.file, &args.output);
    if let Some(page_format) = args.page_format {
        request.page_format = match page_format {
            PageFormatArg::A4 => PageFormat::A4,
            PageFormatArg::A3 => PageFormat::A3,
            PageFormatArg::Letter => PageFormat::Letter,
        };
    }
    if let Some(orientation) = args.orientation {
        request.orientation = match orientation {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        };
    }
    if let Some(quality) = args.quality {
        request.quality = match quality {
            QualityArg::High => Quality::High,
            QualityArg::Medium => Quality::Medium,
            QualityArg::Low => Quality::Low,
        };
    }
    if !args.include.is_empty() {
        request.include_sheets = Some(args.include.clone());
    }
    if !args.exclude.is_empty() {
        request.exclude_sheets = Some(args.exclude.clone());
    }
    if args.watermark.is_some() {
        request.watermark = args.watermark.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        request.timeout = Duration::from_millis(timeout_ms);
    }

    let result = config
        .orchestrator()?
        .convert(&request)
        .with_context(|| format!("Failed to render {}", args.file.display()))?;
    formatter::print_render(format, &result)?;
    Ok(true)
}
