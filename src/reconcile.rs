use tracing::{debug, warn};

use crate::names::{filename_key, filename_stem_key};
use crate::records::{ActualResult, CustomerRecord, Sentinel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOutcome {
    pub result: ActualResult,
    pub match_filenames: Vec<String>,
}

impl CardOutcome {
    pub fn new(result: ActualResult, match_filenames: Vec<String>) -> Self {
        Self {
            result,
            match_filenames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVia {
    /// Row filename equals one of the outcome's filenames, compared with
    /// extensions first and without them only when that finds nothing.
    Exact,
    Fallback,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub via: MatchVia,
    pub rows: Vec<usize>,
}

/// Rows whose filename matches any of the outcome's filenames are written,
/// even when an earlier outcome already filled them (duplicate references
/// from grouping resolve last-write-wins). Without a filename match the
/// outcome goes to the first still-empty rows, at most one per filename.
pub fn reconcile(
    outcome: &CardOutcome,
    row_indices: &[usize],
    rows: &mut [CustomerRecord],
) -> Reconciliation {
    let names = &outcome.match_filenames;
    let mut exact = filename_matches(names, row_indices, rows, filename_key);
    if exact.is_empty() {
        exact = filename_matches(names, row_indices, rows, filename_stem_key);
    }
    if !exact.is_empty() {
        for idx in &exact {
            let row = &mut rows[*idx];
            if let Some(previous) = row.set_actual(outcome.result.clone()) {
                warn!(
                    "row {} ('{}') written twice; '{}' replaced by '{}'",
                    row.row() + 1,
                    row.expected_filename(),
                    previous.card,
                    outcome.result.card
                );
            }
        }
        return Reconciliation {
            via: MatchVia::Exact,
            rows: exact,
        };
    }

    let cap = outcome.match_filenames.len().max(1);
    let targets = first_unfilled(row_indices, rows, cap);
    if targets.is_empty() {
        debug!(
            "no row left for outcome from {:?}",
            outcome.match_filenames
        );
        return Reconciliation {
            via: MatchVia::Unmatched,
            rows: targets,
        };
    }
    debug!(
        "no filename match for {:?}; filling rows {:?}",
        outcome.match_filenames, targets
    );
    for idx in &targets {
        rows[*idx].set_actual(outcome.result.clone());
    }
    Reconciliation {
        via: MatchVia::Fallback,
        rows: targets,
    }
}

/// Marks empty rows whose filename matches `name` as not found. There is
/// no positional fallback.
pub fn mark_missing(name: &str, row_indices: &[usize], rows: &mut [CustomerRecord]) -> Vec<usize> {
    let names = [name.to_string()];
    let mut matched = filename_matches(&names, row_indices, rows, filename_key);
    if matched.is_empty() {
        matched = filename_matches(&names, row_indices, rows, filename_stem_key);
    }
    let mut marked = Vec::new();
    for idx in matched {
        let row = &mut rows[idx];
        if !row.is_filled() {
            row.set_actual(ActualResult::sentinel(Sentinel::NotFound));
            marked.push(idx);
        }
    }
    marked
}

pub fn fill_unfilled(
    sentinel: Sentinel,
    row_indices: &[usize],
    rows: &mut [CustomerRecord],
) -> Vec<usize> {
    let targets = first_unfilled(row_indices, rows, usize::MAX);
    for idx in &targets {
        rows[*idx].set_actual(ActualResult::sentinel(sentinel));
    }
    targets
}

fn filename_matches(
    names: &[String],
    row_indices: &[usize],
    rows: &[CustomerRecord],
    key: fn(&str) -> String,
) -> Vec<usize> {
    let keys: Vec<String> = names
        .iter()
        .map(|name| key(name))
        .filter(|key| !key.is_empty())
        .collect();
    if keys.is_empty() {
        return Vec::new();
    }
    row_indices
        .iter()
        .copied()
        .filter(|idx| {
            rows.get(*idx)
                .is_some_and(|row| keys.contains(&key(row.expected_filename())))
        })
        .collect()
}

fn first_unfilled(row_indices: &[usize], rows: &[CustomerRecord], cap: usize) -> Vec<usize> {
    row_indices
        .iter()
        .copied()
        .filter(|idx| rows.get(*idx).is_some_and(|row| !row.is_filled()))
        .take(cap)
        .collect()
}
