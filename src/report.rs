use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::pipeline::CustomerReport;
use crate::records::{CardValue, CustomerRecord, Sentinel};
use crate::settings::SheetColumns;
use crate::validator::{classify, digits_only};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rows: usize,
    pub filled: usize,
    /// Rows holding a card number rather than a sentinel.
    pub read: usize,
    /// Issuer networks of the numbers read.
    pub networks: Vec<CountItem>,
    pub sentinels: Vec<CountItem>,
    pub numbers: Accuracy,
    pub validations: Accuracy,
    pub customers: Vec<CustomerReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountItem {
    pub label: String,
    pub count: usize,
}

/// Agreement between actual and expected values on rows that have both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Accuracy {
    pub checked: usize,
    pub matched: usize,
}

impl Accuracy {
    fn record(&mut self, matched: bool) {
        self.checked += 1;
        if matched {
            self.matched += 1;
        }
    }
}

pub fn summarize(
    records: &[CustomerRecord],
    customers: &[CustomerReport],
    columns: &SheetColumns,
) -> RunSummary {
    let mut filled = 0;
    let mut read = 0;
    let mut networks: Vec<CountItem> = Vec::new();
    let mut sentinel_counts = [
        (Sentinel::NotFound, 0usize),
        (Sentinel::FolderNotFound, 0),
        (Sentinel::ProcessingError, 0),
    ];
    let mut numbers = Accuracy::default();
    let mut validations = Accuracy::default();

    for record in records {
        let Some(actual) = record.actual() else {
            continue;
        };
        filled += 1;
        match &actual.card {
            CardValue::Number(number) => {
                read += 1;
                let label = classify(number).map_or("unknown", |network| network.as_str());
                match networks.iter_mut().find(|item| item.label == label) {
                    Some(item) => item.count += 1,
                    None => networks.push(CountItem {
                        label: label.to_string(),
                        count: 1,
                    }),
                }
                let expected = digits_only(record.expected_card_number());
                if !expected.is_empty() {
                    numbers.record(expected == *number);
                }
            }
            CardValue::Sentinel(sentinel) => {
                if let Some(slot) = sentinel_counts.iter_mut().find(|(kind, _)| kind == sentinel) {
                    slot.1 += 1;
                }
            }
        }
        if let Some(expected) = parse_validation(record.expected_validation(), columns) {
            validations.record(expected == actual.valid);
        }
    }

    RunSummary {
        rows: records.len(),
        filled,
        read,
        networks,
        sentinels: sentinel_counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(sentinel, count)| CountItem {
                label: sentinel.as_str().to_string(),
                count: *count,
            })
            .collect(),
        numbers,
        validations,
        customers: customers.to_vec(),
    }
}

pub fn render_text(summary: &RunSummary) -> String {
    let mut lines = vec![
        format!("rows: {} (filled {})", summary.rows, summary.filled),
        format!("card numbers read: {}", summary.read),
    ];
    if !summary.networks.is_empty() {
        let networks: Vec<String> = summary
            .networks
            .iter()
            .map(|item| format!("{} {}", item.label, item.count))
            .collect();
        lines.push(format!("networks: {}", networks.join(", ")));
    }
    for item in &summary.sentinels {
        lines.push(format!("{}: {}", item.label, item.count));
    }
    if summary.numbers.checked > 0 {
        lines.push(format!(
            "number matches: {}/{}",
            summary.numbers.matched, summary.numbers.checked
        ));
    }
    if summary.validations.checked > 0 {
        lines.push(format!(
            "validation matches: {}/{}",
            summary.validations.matched, summary.validations.checked
        ));
    }
    let failed = summary
        .customers
        .iter()
        .filter(|customer| customer.error.is_some())
        .count();
    lines.push(format!(
        "customers: {} ({} with errors)",
        summary.customers.len(),
        failed
    ));
    lines.join("\n")
}

pub fn write_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(summary).with_context(|| "failed to serialize run report")?;
    fs::write(path, json).with_context(|| format!("failed to write report: {}", path.display()))
}

/// Reads an expected-validation cell. Blank or unrecognized values are not
/// counted.
fn parse_validation(value: &str, columns: &SheetColumns) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(&columns.pass_label) {
        return Some(true);
    }
    if value.eq_ignore_ascii_case(&columns.fail_label) {
        return Some(false);
    }
    match value.to_lowercase().as_str() {
        "true" | "valid" | "pass" | "passed" | "yes" | "1" => Some(true),
        "false" | "invalid" | "fail" | "failed" | "no" | "0" => Some(false),
        _ => None,
    }
}
