/// Smart-money tagger - main entry point
/// Reads wallet trading records, tags each wallet and writes a sorted report
///
/// Usage:
///   cargo run -- input.xlsx
///   cargo run -- input.csv --config tagger.json --output tagged.xlsx
///   cargo run -- input.xlsx --drop-flagged --log-level debug

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use smartmoney_tagger::config::tagging::TaggingConfig;
use smartmoney_tagger::loader::load_trade_records;
use smartmoney_tagger::logging::init_logging;
use smartmoney_tagger::report::{build_rows, sort_description, sort_rows, write_report};
use smartmoney_tagger::settings::{PROFIT_INVALID_MARKER, TAG_ERROR_MARKER, default_output_file_name};
use smartmoney_tagger::aggregate;

#[derive(Parser)]
#[command(name = "smartmoney_tagger")]
#[command(about = "Tag smart-money wallets from a trading-records spreadsheet")]
struct Args {
    /// Input spreadsheet (.xlsx, .xls, .ods or .csv)
    input: PathBuf,

    /// JSON file overriding thresholds, column names or sort order
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file (.xlsx or .csv); defaults to a timestamped name
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Directory for the timestamped default output
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Drop low-balance and suspicious rows instead of only counting them
    #[arg(long)]
    drop_flagged: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn output_path(args: &Args) -> PathBuf {
    match &args.output {
        Some(path) => path.clone(),
        None => args
            .output_dir
            .join(default_output_file_name(chrono::Local::now().naive_local())),
    }
}

fn run(args: &Args) -> Result<PathBuf> {
    let mut config = TaggingConfig::load(args.config.as_deref())?;
    if args.drop_flagged {
        config.drop_flagged_rows = true;
    }
    info!(
        input = %args.input.display(),
        config = %args.config.as_deref().map_or("defaults".into(), |p| p.display().to_string()),
        drop_flagged_rows = config.drop_flagged_rows,
        "Starting tagger"
    );

    let (records, policy) = load_trade_records(&args.input, &config)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    if records.is_empty() {
        warn!(dropped = policy.dropped, "No records left after row policy");
    }

    let stats = aggregate(&records, &config);
    let mut rows = build_rows(stats, &config);
    sort_rows(&mut rows, &config.sort_keys);
    info!(sort = %sort_description(&config.sort_keys), wallets = rows.len(), "Wallets tagged");

    let failures = rows
        .iter()
        .filter(|r| r.tag.starts_with(TAG_ERROR_MARKER) || r.summary.contains(PROFIT_INVALID_MARKER))
        .count();
    if failures > 0 {
        info!(flagged = failures, "Wallets with error tags");
    }

    let output = output_path(args);
    write_report(&output, &rows, &config)?;
    Ok(output)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let output = run(&args)?;
    info!(output = %output.display(), "Done");
    Ok(())
}
