use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::records::CustomerRecord;
use crate::settings::SheetColumns;

const DELIMITER: u8 = b',';

#[derive(Debug, Clone)]
struct RawRow {
    /// Record bytes without the trailing line terminator.
    content: Vec<u8>,
    /// Line terminator plus any blank lines that followed the record.
    trailer: Vec<u8>,
    values: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    customer: usize,
    filename: usize,
    expected_number: Option<usize>,
    expected_validation: Option<usize>,
    number: usize,
    validation: usize,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    header: RawRow,
    rows: Vec<RawRow>,
    index: ColumnIndex,
    appended: bool,
    number_name: String,
    validation_name: String,
    pass_label: String,
    fail_label: String,
}

impl Sheet {
    pub fn load(path: &Path, columns: &SheetColumns) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read sheet: {}", path.display()))?;
        Self::parse(&bytes, columns).with_context(|| format!("invalid sheet: {}", path.display()))
    }

    pub fn parse(bytes: &[u8], columns: &SheetColumns) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(DELIMITER)
            .from_reader(bytes);

        let mut starts = Vec::new();
        let mut decoded = Vec::new();
        for record in reader.byte_records() {
            let record = record.with_context(|| "failed to parse csv record")?;
            let start = record
                .position()
                .map(|position| position.byte() as usize)
                .unwrap_or(0);
            starts.push(start);
            decoded.push(
                record
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect::<Vec<_>>(),
            );
        }
        if decoded.is_empty() {
            return Err(anyhow!("sheet is empty"));
        }
        // header keeps any leading BOM bytes
        starts[0] = 0;

        let mut raw_rows = Vec::with_capacity(decoded.len());
        for (idx, values) in decoded.into_iter().enumerate() {
            let start = starts[idx];
            let end = starts.get(idx + 1).copied().unwrap_or(bytes.len());
            let slice = &bytes[start..end.max(start)];
            let content_len = slice
                .iter()
                .rposition(|byte| *byte != b'\n' && *byte != b'\r')
                .map(|pos| pos + 1)
                .unwrap_or(0);
            raw_rows.push(RawRow {
                content: slice[..content_len].to_vec(),
                trailer: slice[content_len..].to_vec(),
                values,
            });
        }

        let header = raw_rows.remove(0);
        let find = |name: &str| -> Option<usize> {
            header
                .values
                .iter()
                .position(|value| header_name(value).eq_ignore_ascii_case(name.trim()))
        };
        let customer = find(&columns.customer)
            .ok_or_else(|| anyhow!("missing column '{}'", columns.customer))?;
        let filename = find(&columns.filename)
            .ok_or_else(|| anyhow!("missing column '{}'", columns.filename))?;
        let (number, validation, appended) = match (find(&columns.number), find(&columns.validation)) {
            (Some(number), Some(validation)) => (number, validation, false),
            (None, None) => {
                let width = header.values.len();
                (width, width + 1, true)
            }
            (None, Some(_)) => return Err(anyhow!("missing column '{}'", columns.number)),
            (Some(_), None) => return Err(anyhow!("missing column '{}'", columns.validation)),
        };
        if number == validation {
            return Err(anyhow!("result columns must be distinct"));
        }

        Ok(Self {
            index: ColumnIndex {
                customer,
                filename,
                expected_number: find(&columns.expected_number),
                expected_validation: find(&columns.expected_validation),
                number,
                validation,
            },
            header,
            rows: raw_rows,
            appended,
            number_name: columns.number.clone(),
            validation_name: columns.validation.clone(),
            pass_label: columns.pass_label.clone(),
            fail_label: columns.fail_label.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> Vec<CustomerRecord> {
        let cell = |row: &RawRow, idx: Option<usize>| -> String {
            idx.and_then(|idx| row.values.get(idx))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                CustomerRecord::new(
                    idx,
                    cell(row, Some(self.index.customer)),
                    cell(row, Some(self.index.filename)),
                    cell(row, self.index.expected_number),
                    cell(row, self.index.expected_validation),
                )
            })
            .collect()
    }

    pub fn to_bytes(&self, records: &[CustomerRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.content);
        if self.appended {
            out.push(DELIMITER);
            out.extend_from_slice(&quote_field(&self.number_name));
            out.push(DELIMITER);
            out.extend_from_slice(&quote_field(&self.validation_name));
        }
        out.extend_from_slice(&terminator_or_default(&self.header.trailer, !self.rows.is_empty()));

        let mut actuals = vec![None; self.rows.len()];
        for record in records {
            if let Some(slot) = actuals.get_mut(record.row()) {
                *slot = record.actual();
            }
        }

        for (idx, row) in self.rows.iter().enumerate() {
            match actuals[idx] {
                None if !self.appended => out.extend_from_slice(&row.content),
                None => {
                    out.extend_from_slice(&row.content);
                    out.push(DELIMITER);
                    out.push(DELIMITER);
                }
                Some(actual) => {
                    let label = if actual.valid {
                        &self.pass_label
                    } else {
                        &self.fail_label
                    };
                    let line = self.rewrite_row(row, &actual.card.to_string(), label);
                    out.extend_from_slice(&line);
                }
            }
            let last = idx + 1 == self.rows.len();
            out.extend_from_slice(&terminator_or_default(&row.trailer, !last));
        }
        out
    }

    pub fn write(&self, path: &Path, records: &[CustomerRecord]) -> Result<()> {
        let bytes = self.to_bytes(records);
        fs::write(path, bytes).with_context(|| format!("failed to write sheet: {}", path.display()))
    }

    fn rewrite_row(&self, row: &RawRow, number: &str, validation: &str) -> Vec<u8> {
        let mut fields: Vec<Vec<u8>> = split_raw_fields(&row.content);
        if fields.len() != row.values.len() {
            debug!("re-encoding row with ambiguous raw layout");
            fields = row.values.iter().map(|value| quote_field(value)).collect();
        }
        let needed = self.index.number.max(self.index.validation) + 1;
        while fields.len() < needed {
            fields.push(Vec::new());
        }
        fields[self.index.number] = quote_field(number);
        fields[self.index.validation] = quote_field(validation);
        fields.join(&DELIMITER)
    }
}

fn header_name(value: &str) -> &str {
    value.trim_start_matches('\u{feff}').trim()
}

/// Splits a raw record on delimiters outside quotes, keeping field bytes as-is.
fn split_raw_fields(content: &[u8]) -> Vec<Vec<u8>> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (idx, byte) in content.iter().enumerate() {
        match *byte {
            b'"' => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => {
                fields.push(content[start..idx].to_vec());
                start = idx + 1;
            }
            _ => {}
        }
    }
    fields.push(content[start..].to_vec());
    fields
}

fn quote_field(value: &str) -> Vec<u8> {
    let needs_quotes = value
        .bytes()
        .any(|byte| matches!(byte, DELIMITER | b'"' | b'\n' | b'\r'));
    if !needs_quotes {
        return value.as_bytes().to_vec();
    }
    format!("\"{}\"", value.replace('"', "\"\"")).into_bytes()
}

fn terminator_or_default(trailer: &[u8], required: bool) -> Vec<u8> {
    if trailer.is_empty() && required {
        b"\n".to_vec()
    } else {
        trailer.to_vec()
    }
}
