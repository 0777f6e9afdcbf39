//! Reference data seeding: CPCs, seasonality curves, case adjustments.
//!
//! CPCs are created only when missing; curves and case adjustments are
//! replaced. The client sync walks the fact feed and creates the CPCs
//! the sales aggregator would otherwise reject as unknown.

use crate::{
    config::PipelineConfig,
    cpc_index::CpcIndex,
    error::{PlanError, PlanResult},
    keys::{KeyNormalizer, CLIENT_GROUP_LEN, PROFIT_CENTER_LEN},
    seasonality::SeasonalityCurve,
    source::{FactSource, FactWindow},
    store::{CaseAdjustmentRow, PlanStore},
    types::{PlanningPeriod, RunMode},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpcSeed {
    pub client_group: String,
    pub profit_center: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveSeed {
    pub profit_center: String,
    pub planning_period: PlanningPeriod,
    /// Month name → percentage, e.g. "april": 8.5.
    pub percentages: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseAdjustmentSeed {
    pub client_group: String,
    pub profit_center: String,
    pub planning_period: PlanningPeriod,
    #[serde(default)]
    pub best_case: f64,
    #[serde(default)]
    pub skip_budget: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub cpcs: Vec<CpcSeed>,
    #[serde(default)]
    pub seasonality: Vec<CurveSeed>,
    #[serde(default)]
    pub case_adjustments: Vec<CaseAdjustmentSeed>,
}

impl ReferenceData {
    pub fn load(path: &str) -> PlanResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub mode: RunMode,
    pub cpcs_created: usize,
    pub cpcs_existing: usize,
    pub curves_written: usize,
    pub case_adjustments_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSyncSummary {
    pub mode: RunMode,
    pub rows_seen: usize,
    /// Rows whose keys fail normalization, plus feed records that could
    /// not be read. The aggregator rejects both too.
    pub rows_ignored: usize,
    pub cpcs_existing: usize,
    pub cpcs_created: usize,
    pub created: Vec<CpcSeed>,
}

fn check_cpc_key(client_group: &str, profit_center: &str) -> PlanResult<()> {
    let reason = if client_group.chars().count() != CLIENT_GROUP_LEN {
        Some("client group must be 5 characters")
    } else if profit_center.chars().count() != PROFIT_CENTER_LEN {
        Some("profit center must be 3 characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PlanError::InvalidCpcKey {
            client_group: client_group.to_string(),
            profit_center: profit_center.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

pub struct ReferenceImporter<'a> {
    store: &'a PlanStore,
    config: &'a PipelineConfig,
}

impl<'a> ReferenceImporter<'a> {
    pub fn new(store: &'a PlanStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Seed reference tables in one transaction. Any invalid entry aborts
    /// the whole import.
    pub fn import(&self, data: &ReferenceData, mode: RunMode) -> PlanResult<ImportSummary> {
        let summary = self.store.run_in_transaction(mode, |store| {
            let mut summary = ImportSummary {
                mode,
                cpcs_created: 0,
                cpcs_existing: 0,
                curves_written: 0,
                case_adjustments_written: 0,
            };
            for seed in &data.cpcs {
                let (client_group, profit_center) = (seed.client_group.trim(), seed.profit_center.trim());
                check_cpc_key(client_group, profit_center)?;
                let (_, created) = store.insert_cpc_if_missing(client_group, profit_center)?;
                if created {
                    summary.cpcs_created += 1;
                } else {
                    summary.cpcs_existing += 1;
                }
            }
            for seed in &data.seasonality {
                let curve = SeasonalityCurve::from_named(
                    seed.profit_center.trim(),
                    seed.planning_period,
                    &seed.percentages,
                )?;
                let total = curve.total();
                if (total - Decimal::ONE_HUNDRED).abs() > Decimal::ONE {
                    log::warn!(
                        "seasonality {}/{} sums to {total}, expected ~100",
                        curve.profit_center,
                        curve.planning_period
                    );
                }
                store.upsert_seasonality_curve(&curve)?;
                summary.curves_written += 1;
            }
            for seed in &data.case_adjustments {
                let (client_group, profit_center) = (seed.client_group.trim(), seed.profit_center.trim());
                check_cpc_key(client_group, profit_center)?;
                let cpc = store.find_cpc(client_group, profit_center)?.ok_or_else(|| {
                    PlanError::InvalidCpcKey {
                        client_group: client_group.to_string(),
                        profit_center: profit_center.to_string(),
                        reason: "no such CPC",
                    }
                })?;
                store.upsert_case_adjustment(&CaseAdjustmentRow {
                    entity_id: cpc.id,
                    planning_period: seed.planning_period,
                    best_case: seed.best_case,
                    skip_budget: seed.skip_budget,
                })?;
                summary.case_adjustments_written += 1;
            }
            Ok(summary)
        })?;
        log::info!(
            "reference import: cpcs created={} existing={}, curves={}, case adjustments={}",
            summary.cpcs_created,
            summary.cpcs_existing,
            summary.curves_written,
            summary.case_adjustments_written
        );
        Ok(summary)
    }

    /// Create a CPC for every well-formed (client group, profit center)
    /// pair in the feed that the index does not know yet.
    pub fn sync_clients_from_feed(
        &self,
        source: &mut dyn FactSource,
        window: &FactWindow,
        mode: RunMode,
    ) -> PlanResult<ClientSyncSummary> {
        let keys = KeyNormalizer::new(&self.config.sales);
        let feed = source.fetch(window)?;

        let summary = self.store.run_in_transaction(mode, |store| {
            let index = CpcIndex::load(store)?;
            let mut summary = ClientSyncSummary {
                mode,
                rows_seen: feed.unreadable.len(),
                rows_ignored: feed.unreadable.len(),
                cpcs_existing: 0,
                cpcs_created: 0,
                created: Vec::new(),
            };
            let mut known = BTreeSet::new();
            let mut missing = BTreeSet::new();
            for row in &feed.rows {
                summary.rows_seen += 1;
                // Only key shape matters here; quantity problems are the
                // aggregator's to report.
                let client_group = row.client_group.trim();
                let profit_center = keys.profit_center(&row.profit_center, &row.product_group);
                if check_cpc_key(client_group, &profit_center).is_err() {
                    summary.rows_ignored += 1;
                    continue;
                }
                let pair = (client_group.to_string(), profit_center);
                if index.resolve(&pair.0, &pair.1).is_some() {
                    known.insert(pair);
                } else {
                    missing.insert(pair);
                }
            }
            summary.cpcs_existing = known.len();
            for (client_group, profit_center) in missing {
                let (_, created) = store.insert_cpc_if_missing(&client_group, &profit_center)?;
                if created {
                    summary.cpcs_created += 1;
                    summary.created.push(CpcSeed {
                        client_group,
                        profit_center,
                    });
                }
            }
            Ok(summary)
        })?;
        log::info!(
            "client sync from {}: {} CPCs created, {} already known, {} rows ignored",
            source.name(),
            summary.cpcs_created,
            summary.cpcs_existing,
            summary.rows_ignored
        );
        Ok(summary)
    }
}
