use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::validator::ValidationMode;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub gateway_base_url: String,
    pub gateway_api_key_env: String,
    pub gateway_timeout_secs: u64,
    pub gateway_max_retries: usize,
    pub columns: SheetColumns,
    pub image_patterns: Vec<String>,
    pub jpeg_quality: u8,
    pub validation_mode: ValidationMode,
    pub cvc_width_factor: f32,
    pub cvc_height_factor: f32,
}

/// Header names of the spreadsheet columns the reconciler reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetColumns {
    pub customer: String,
    pub filename: String,
    pub expected_number: String,
    pub expected_validation: String,
    pub number: String,
    pub validation: String,
    pub pass_label: String,
    pub fail_label: String,
}

impl Default for SheetColumns {
    fn default() -> Self {
        Self {
            customer: "Customer Name".to_string(),
            filename: "Filename".to_string(),
            expected_number: "CCN Expected".to_string(),
            expected_validation: "Luhn Test Expected".to_string(),
            number: "CCN Actual".to_string(),
            validation: "Luhn Test Actual".to_string(),
            pass_label: "PASS".to_string(),
            fail_label: "FAIL".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_base_url: "http://127.0.0.1:8080".to_string(),
            gateway_api_key_env: "CARD_OCR_API_KEY".to_string(),
            gateway_timeout_secs: 120,
            gateway_max_retries: 5,
            columns: SheetColumns::default(),
            image_patterns: [
                "*.jpg", "*.jpeg", "*.png", "*.gif", "*.bmp", "*.webp", "*.tif", "*.tiff",
            ]
            .iter()
            .map(|value| value.to_string())
            .collect(),
            jpeg_quality: 90,
            validation_mode: ValidationMode::Checksum,
            cvc_width_factor: 4.0,
            cvc_height_factor: 2.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    gateway: Option<GatewaySettings>,
    sheet: Option<SheetSettings>,
    images: Option<ImageSettings>,
    validation: Option<ValidationSettings>,
    redaction: Option<RedactionSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewaySettings {
    base_url: Option<String>,
    api_key_env: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetSettings {
    customer_column: Option<String>,
    filename_column: Option<String>,
    expected_number_column: Option<String>,
    expected_validation_column: Option<String>,
    number_column: Option<String>,
    validation_column: Option<String>,
    pass_label: Option<String>,
    fail_label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSettings {
    patterns: Option<Vec<String>>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationSettings {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RedactionSettings {
    cvc_width_factor: Option<f32>,
    cvc_height_factor: Option<f32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(dir) = paths::settings_dir() {
        ordered_paths.push(dir.join("settings.toml"));
        ordered_paths.push(dir.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_settings_from(&ordered_paths)
}

pub(crate) fn load_settings_from(ordered_paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults)?;

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(gateway) = incoming.gateway {
            if let Some(url) = non_empty(gateway.base_url) {
                self.gateway_base_url = url.trim_end_matches('/').to_string();
            }
            if let Some(env) = non_empty(gateway.api_key_env) {
                self.gateway_api_key_env = env;
            }
            if let Some(secs) = gateway.timeout_secs
                && secs > 0
            {
                self.gateway_timeout_secs = secs;
            }
            if let Some(retries) = gateway.max_retries {
                self.gateway_max_retries = retries.max(1);
            }
        }
        if let Some(sheet) = incoming.sheet {
            let columns = &mut self.columns;
            let slots = [
                (sheet.customer_column, &mut columns.customer),
                (sheet.filename_column, &mut columns.filename),
                (sheet.expected_number_column, &mut columns.expected_number),
                (sheet.expected_validation_column, &mut columns.expected_validation),
                (sheet.number_column, &mut columns.number),
                (sheet.validation_column, &mut columns.validation),
                (sheet.pass_label, &mut columns.pass_label),
                (sheet.fail_label, &mut columns.fail_label),
            ];
            for (value, slot) in slots {
                if let Some(value) = non_empty(value) {
                    *slot = value;
                }
            }
        }
        if let Some(images) = incoming.images {
            if let Some(patterns) = images.patterns {
                let patterns: Vec<String> = patterns
                    .into_iter()
                    .filter(|pattern| !pattern.trim().is_empty())
                    .collect();
                if !patterns.is_empty() {
                    self.image_patterns = patterns;
                }
            }
            if let Some(quality) = images.jpeg_quality {
                self.jpeg_quality = quality.clamp(1, 100);
            }
        }
        if let Some(validation) = incoming.validation
            && let Some(mode) = non_empty(validation.mode)
        {
            self.validation_mode = ValidationMode::parse(&mode)?;
        }
        if let Some(redaction) = incoming.redaction {
            if let Some(factor) = redaction.cvc_width_factor
                && factor > 0.0
            {
                self.cvc_width_factor = factor;
            }
            if let Some(factor) = redaction.cvc_height_factor
                && factor > 0.0
            {
                self.cvc_height_factor = factor;
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
