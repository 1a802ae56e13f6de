use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "card-reconciler",
    version,
    about = "Read card numbers from customer image folders and reconcile them into a sheet"
)]
struct Cli {
    /// CSV sheet with one row per expected card image
    #[arg(short = 's', long = "sheet")]
    sheet: PathBuf,

    /// Root directory holding one folder per customer
    #[arg(short = 'i', long = "images")]
    images: PathBuf,

    /// Where to write the reconciled sheet (default: <sheet>.reconciled.csv)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Also write the run summary as JSON
    #[arg(long = "report")]
    report: Option<PathBuf>,

    /// Write redacted card images into this directory instead of reconciling
    #[arg(long = "redact")]
    redact: Option<PathBuf>,

    /// Extraction service base URL (overrides settings [gateway])
    #[arg(short = 'e', long = "endpoint")]
    endpoint: Option<String>,

    /// API key (overrides the environment variable named in settings)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Require a known issuer prefix and length on top of the checksum
    #[arg(long = "strict")]
    strict: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    card_reconciler::logging::init(cli.verbose)?;

    let config = card_reconciler::Config {
        sheet: cli.sheet,
        images: cli.images,
        output: cli.output,
        report: cli.report,
        redact: cli.redact,
        endpoint: cli.endpoint,
        key: cli.key,
        strict: cli.strict,
        settings_path: cli.read_settings,
    };
    let output = card_reconciler::run(config).await?;
    println!("{}", output);
    Ok(())
}
