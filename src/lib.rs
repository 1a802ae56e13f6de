use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod compositor;
pub mod folders;
pub mod gateway;
pub mod logging;
pub mod matcher;
pub mod names;
mod paths;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod redaction;
pub mod report;
pub mod settings;
pub mod sheet;
pub mod validator;

#[cfg(test)]
mod test_util;

pub use gateway::{HttpGateway, OcrGateway};
pub use pipeline::{CustomerReport, Pipeline, PipelineOptions, ProgressSink, RunOutcome};
pub use settings::Settings;
pub use validator::ValidationMode;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sheet: PathBuf,
    pub images: PathBuf,
    /// Defaults to `<sheet>.reconciled.csv` next to the input.
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    /// Write redacted card images here instead of reconciling the sheet.
    pub redact: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub strict: bool,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(paths::expand_tilde);
    let mut settings = settings::load_settings(settings_path.as_deref())?;
    if config.strict {
        settings.validation_mode = ValidationMode::Issuer;
    }
    let base_url = config
        .endpoint
        .clone()
        .unwrap_or_else(|| settings.gateway_base_url.clone());
    let key = resolve_key(config.key.as_deref(), &settings.gateway_api_key_env);
    let gateway = HttpGateway::new(base_url, Duration::from_secs(settings.gateway_timeout_secs))?
        .with_key(key)
        .with_max_attempts(settings.gateway_max_retries);
    run_with_gateway(&config, &settings, gateway).await
}

/// Runs reconciliation (or redaction when `config.redact` is set) against
/// an already built gateway.
pub async fn run_with_gateway<G: OcrGateway>(
    config: &Config,
    settings: &Settings,
    gateway: G,
) -> Result<String> {
    let sheet = sheet::Sheet::load(&config.sheet, &settings.columns)?;
    let filter = folders::ImageFilter::new(&settings.image_patterns)?;
    let folders = folders::scan(&config.images, &filter)?;
    info!(
        "{} row(s), {} customer folder(s)",
        sheet.len(),
        folders.len()
    );
    if sheet.is_empty() {
        warn!("{} has no data rows", config.sheet.display());
    }
    let records = sheet.records();

    if let Some(out_dir) = &config.redact {
        let style = compositor::RedactionStyle {
            cvc_width_factor: settings.cvc_width_factor,
            cvc_height_factor: settings.cvc_height_factor,
            quality: settings.jpeg_quality,
        };
        let manifest =
            redaction::redact_all(&gateway, &records, &folders, out_dir, &style).await?;
        return Ok(format!(
            "redacted {} file(s) for {} customer(s) into {} ({} skipped)",
            manifest.file_count(),
            manifest.customers.len(),
            out_dir.display(),
            manifest.skipped.len()
        ));
    }

    let pipeline = Pipeline::new(
        gateway,
        PipelineOptions {
            validation: settings.validation_mode,
            jpeg_quality: settings.jpeg_quality,
        },
    );
    let mut log_progress = |report: &CustomerReport| {
        info!(
            "'{}' done: {} card(s), {} row(s) written",
            report.customer, report.cards, report.rows_written
        );
    };
    let outcome = pipeline.run(records, &folders, &mut log_progress).await;

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| paths::default_output_path(&config.sheet));
    if same_file(&output, &config.sheet) {
        return Err(anyhow!(
            "refusing to overwrite the input sheet: {}",
            output.display()
        ));
    }
    sheet
        .write(&output, &outcome.records)
        .with_context(|| "failed to write reconciled sheet")?;

    let summary = report::summarize(&outcome.records, &outcome.reports, &settings.columns);
    if let Some(path) = &config.report {
        report::write_json(&summary, path)?;
    }
    Ok(format!(
        "{}\nwritten: {}",
        report::render_text(&summary),
        output.display()
    ))
}

fn resolve_key(explicit: Option<&str>, env_name: &str) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
