use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "CARD_RECONCILER_DIR";

pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".card-reconciler"))
        }
    })
}

/// `accounts.csv` becomes `accounts.reconciled.csv` next to the input.
pub(crate) fn default_output_path(sheet: &Path) -> PathBuf {
    let stem = sheet
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("sheet");
    let extension = sheet
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("csv");
    sheet.with_file_name(format!("{}.reconciled.{}", stem, extension))
}

/// Directory-safe form of a customer name for redaction output.
pub(crate) fn customer_dir_name(customer: &str) -> String {
    let mut out = String::with_capacity(customer.len());
    let mut last_was_sep = false;
    for ch in customer.trim().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn expand_tilde(value: &str) -> PathBuf {
    let value = value.trim();
    if (value == "~" || value.starts_with("~/"))
        && let Ok(home) = std::env::var("HOME")
    {
        let home = home.trim();
        if !home.is_empty() {
            return PathBuf::from(format!("{}{}", home, &value[1..]));
        }
    }
    PathBuf::from(value)
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| normalize_path(expand_tilde(&value)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}
