//! Forecast publisher: budget → versioned forecast snapshot.
//!
//! Copies every budget row of a planning period into the forecast
//! ledger under a version number, leaving out entities whose case
//! adjustment carries `skip_budget`. Rows are upserted in batches
//! keyed by (entity, period, month, version), so publishing the same
//! version again replaces it rather than duplicating it.

use crate::{
    batch::write_in_batches,
    config::PipelineConfig,
    diagnostics::DiagnosticSample,
    error::PlanResult,
    store::{ForecastRow, PlanStore},
    types::{new_run_id, CalendarMonth, EntityId, ForecastVersion, PlanningPeriod, RunId, RunMode},
};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
pub struct ForecastOptions {
    pub planning_period: PlanningPeriod,
    pub version: ForecastVersion,
    /// Drop the existing rows of this version before publishing.
    pub overwrite: bool,
    pub mode: RunMode,
    pub max_shown: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastWriteFailure {
    pub entity_id: EntityId,
    pub month: CalendarMonth,
    pub volume: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastSummary {
    pub run_id: RunId,
    pub planning_period: PlanningPeriod,
    pub version: ForecastVersion,
    pub mode: RunMode,
    pub overwrite: bool,
    pub rows_deleted: usize,
    pub budget_rows_read: usize,
    pub rows_written: usize,
    /// Budget rows left out because their entity is flagged skip_budget.
    pub rows_excluded: usize,
    pub entities_excluded: BTreeSet<EntityId>,
    pub rows_failed: usize,
    /// Batches that fell back to row-by-row writes.
    pub degraded_batches: usize,
    pub write_failures: DiagnosticSample<ForecastWriteFailure>,
}

pub struct ForecastPublisher<'a> {
    store: &'a PlanStore,
    config: &'a PipelineConfig,
}

impl<'a> ForecastPublisher<'a> {
    pub fn new(store: &'a PlanStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn run(&self, options: &ForecastOptions) -> PlanResult<ForecastSummary> {
        let run_id = new_run_id("forecast");
        log::info!(
            "[{run_id}] publishing forecast {} v{} (overwrite={}, {:?})",
            options.planning_period,
            options.version,
            options.overwrite,
            options.mode
        );

        let result = self.store.run_in_transaction(options.mode, |store| {
            let mut summary = ForecastSummary {
                run_id: run_id.clone(),
                planning_period: options.planning_period,
                version: options.version,
                mode: options.mode,
                overwrite: options.overwrite,
                rows_deleted: 0,
                budget_rows_read: 0,
                rows_written: 0,
                rows_excluded: 0,
                entities_excluded: BTreeSet::new(),
                rows_failed: 0,
                degraded_batches: 0,
                write_failures: DiagnosticSample::new(options.max_shown),
            };

            if options.overwrite {
                summary.rows_deleted = store.delete_forecast(options.planning_period, options.version)?;
            }

            let budget = store.budget_rows(options.planning_period)?;
            let skip = store.skipped_entities(options.planning_period)?;
            summary.budget_rows_read = budget.len();

            let mut rows = Vec::with_capacity(budget.len());
            for b in budget {
                if skip.contains(&b.entity_id) {
                    summary.rows_excluded += 1;
                    summary.entities_excluded.insert(b.entity_id);
                    continue;
                }
                rows.push(ForecastRow {
                    entity_id: b.entity_id,
                    planning_period: b.planning_period,
                    month: b.month,
                    version: options.version,
                    volume: b.volume,
                    created_by: None,
                });
            }

            let outcome = write_in_batches(
                &rows,
                self.config.forecast.batch_size,
                |batch| store.upsert_forecast_batch(batch),
                |row| store.upsert_forecast_row(row),
            );
            summary.rows_written = outcome.written;
            summary.rows_failed = outcome.failures.len();
            summary.degraded_batches = outcome.degraded_batches;
            for failure in outcome.failures {
                log::warn!(
                    "[{run_id}] forecast row entity={} month={} not written: {}",
                    failure.row.entity_id,
                    failure.row.month,
                    failure.error
                );
                summary.write_failures.record(ForecastWriteFailure {
                    entity_id: failure.row.entity_id,
                    month: failure.row.month,
                    volume: failure.row.volume,
                    error: failure.error,
                });
            }
            Ok(summary)
        });

        match result {
            Ok(summary) => {
                log::info!(
                    "[{run_id}] forecast {} v{}: written={} failed={} excluded={} deleted={} degraded_batches={}",
                    summary.planning_period,
                    summary.version,
                    summary.rows_written,
                    summary.rows_failed,
                    summary.rows_excluded,
                    summary.rows_deleted,
                    summary.degraded_batches
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!(
                    "[{run_id}] forecast {} v{} rolled back: {e}",
                    options.planning_period,
                    options.version
                );
                Err(e)
            }
        }
    }
}
