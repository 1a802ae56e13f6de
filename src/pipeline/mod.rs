use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::folders::FolderEntry;
use crate::gateway::{CardPair, OcrGateway};
use crate::matcher;
use crate::names::normalize_strict;
use crate::records::{ActualResult, CustomerRecord, Sentinel};
use crate::reconcile::{fill_unfilled, mark_missing, reconcile, CardOutcome};
use crate::validator::ValidationMode;

pub mod fallback;
pub mod scenario;

use fallback::{run_chain, strategies_for, Strategy};
use scenario::{classify_folder, degenerate_pairs, plan_cards, CardPlan, Scenario, ScenarioKind};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub validation: ValidationMode,
    pub jpeg_quality: u8,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            validation: ValidationMode::Checksum,
            jpeg_quality: 90,
        }
    }
}

pub trait ProgressSink {
    fn customer_done(&mut self, report: &CustomerReport);
}

impl<F> ProgressSink for F
where
    F: FnMut(&CustomerReport),
{
    fn customer_done(&mut self, report: &CustomerReport) {
        self(report)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerReport {
    pub customer: String,
    pub folder: Option<String>,
    pub scenario: ScenarioKind,
    pub cards: usize,
    pub rows_written: usize,
    /// Categorization or grouping was unusable and every file became its own card.
    pub grouping_degraded: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<CustomerRecord>,
    pub reports: Vec<CustomerReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerGroup {
    pub name: String,
    pub rows: Vec<usize>,
}

pub fn group_customers(records: &[CustomerRecord]) -> Vec<CustomerGroup> {
    let mut groups: Vec<CustomerGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        let key = normalize_strict(record.customer_name());
        if key.is_empty() {
            continue;
        }
        match by_key.get(&key) {
            Some(group) => groups[*group].rows.push(idx),
            None => {
                by_key.insert(key, groups.len());
                groups.push(CustomerGroup {
                    name: record.customer_name().trim().to_string(),
                    rows: vec![idx],
                });
            }
        }
    }
    groups
}

pub struct Pipeline<G> {
    gateway: G,
    options: PipelineOptions,
}

impl<G: OcrGateway> Pipeline<G> {
    pub fn new(gateway: G, options: PipelineOptions) -> Self {
        Self { gateway, options }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn run(
        &self,
        mut records: Vec<CustomerRecord>,
        folders: &[FolderEntry],
        sink: &mut dyn ProgressSink,
    ) -> RunOutcome {
        let groups = group_customers(&records);
        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            let folder = matcher::find_folder(&group.name, folders);
            let scenario = classify_folder(folder);
            let mut report = CustomerReport {
                customer: group.name.clone(),
                folder: folder.map(|folder| folder.folder_name.clone()),
                scenario: scenario.kind(),
                cards: 0,
                rows_written: 0,
                grouping_degraded: false,
                error: None,
            };
            let filled_before = count_filled(&group.rows, &records);
            info!(
                "processing '{}' ({}, {} row(s))",
                group.name,
                report.scenario.as_str(),
                group.rows.len()
            );

            if let Err(err) = self
                .process_customer(scenario, &group.rows, &mut records, &mut report)
                .await
            {
                warn!("customer '{}' failed: {:#}", group.name, err);
                fill_unfilled(Sentinel::ProcessingError, &group.rows, &mut records);
                report.error = Some(format!("{:#}", err));
            }

            report.rows_written = count_filled(&group.rows, &records) - filled_before;
            sink.customer_done(&report);
            reports.push(report);
        }
        RunOutcome { records, reports }
    }

    async fn process_customer(
        &self,
        scenario: Scenario<'_>,
        rows: &[usize],
        records: &mut [CustomerRecord],
        report: &mut CustomerReport,
    ) -> Result<()> {
        match scenario {
            Scenario::NoFolder => {
                fill_unfilled(Sentinel::FolderNotFound, rows, records);
            }
            Scenario::SingleImage(image) => {
                let number = run_chain(
                    &self.gateway,
                    &[Strategy::Single(image)],
                    self.options.jpeg_quality,
                )
                .await?;
                report.cards = 1;
                let outcome = CardOutcome::new(self.result_for(number), vec![image.name.clone()]);
                reconcile(&outcome, rows, records);
            }
            Scenario::MultiImage(folder) => {
                let (pairs, degraded) = resolve_pairs(&self.gateway, folder).await;
                report.grouping_degraded = degraded;
                for plan in plan_cards(folder, &pairs) {
                    self.process_card(&plan, rows, records).await?;
                    if !matches!(plan, CardPlan::MissingReference { .. }) {
                        report.cards += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_card(
        &self,
        plan: &CardPlan<'_>,
        rows: &[usize],
        records: &mut [CustomerRecord],
    ) -> Result<()> {
        let filenames = match plan {
            CardPlan::MissingReference { names } => {
                for name in names {
                    debug!("'{}' is referenced but not on disk", name);
                    mark_missing(name, rows, records);
                }
                return Ok(());
            }
            CardPlan::UnpairedCard { file, missing } => {
                if let Some(name) = missing {
                    debug!("partner '{}' of '{}' is not on disk", name, file.name);
                    mark_missing(name, rows, records);
                }
                vec![file.name.clone()]
            }
            CardPlan::PairedCard { front, back } => vec![front.name.clone(), back.name.clone()],
        };
        let number = run_chain(&self.gateway, &strategies_for(plan), self.options.jpeg_quality)
            .await?;
        let outcome = CardOutcome::new(self.result_for(number), filenames);
        let placed = reconcile(&outcome, rows, records);
        debug!(
            "{} -> {:?} rows {:?}",
            outcome.result.card, placed.via, placed.rows
        );
        Ok(())
    }

    fn result_for(&self, number: Option<String>) -> ActualResult {
        match number {
            Some(number) => {
                let valid = self.options.validation.validate(&number);
                ActualResult::number(number, valid)
            }
            None => ActualResult::sentinel(Sentinel::NotFound),
        }
    }
}

/// Card pairs for a multi-image folder, and whether they had to be
/// synthesized one file per pair because grouping was unusable.
pub(crate) async fn resolve_pairs<G: OcrGateway>(
    gateway: &G,
    folder: &FolderEntry,
) -> (Vec<CardPair>, bool) {
    match request_pairs(gateway, folder).await {
        Ok(pairs) if !pairs.is_empty() => (pairs, false),
        Ok(_) => {
            debug!("grouping returned no pairs for '{}'", folder.folder_name);
            (degenerate_pairs(folder), true)
        }
        Err(err) => {
            warn!("grouping unavailable for '{}': {:#}", folder.folder_name, err);
            (degenerate_pairs(folder), true)
        }
    }
}

async fn request_pairs<G: OcrGateway>(gateway: &G, folder: &FolderEntry) -> Result<Vec<CardPair>> {
    let categorization = gateway
        .categorize(&folder.images)
        .await
        .with_context(|| "categorization failed")?;
    let grouping = gateway
        .group_cards(&folder.images, &categorization)
        .await
        .with_context(|| "grouping failed")?;
    Ok(grouping.pairs())
}

fn count_filled(rows: &[usize], records: &[CustomerRecord]) -> usize {
    rows.iter()
        .filter(|idx| records.get(**idx).is_some_and(CustomerRecord::is_filled))
        .count()
}
