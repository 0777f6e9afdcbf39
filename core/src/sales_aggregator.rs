//! Sales aggregator: raw fact feed → monthly sales ledger.
//!
//! Design:
//!   - Each raw row is normalized (keys, month, quantity) and resolved
//!     through the CPC index. Bad rows, and feed records that could not
//!     be read at all, are rejected and counted, never fatal.
//!   - Quantities are summed as full-precision decimals per
//!     (entity, year, month) in a run-local map. A fact that would push
//!     its bucket past the decimal range is rejected, the bucket keeps
//!     its previous total.
//!   - Totals are rounded once, at write time, then upserted in batches
//!     with a row-by-row fallback.
//!   - All writes share one transaction. A systemic failure rolls back
//!     and is reported in the summary instead of being propagated.
//!
//! Totals are recomputed from the feed on every run, so re-running with
//! the same or an earlier start date never double counts.

use crate::{
    batch::write_in_batches,
    config::PipelineConfig,
    cpc_index::CpcIndex,
    diagnostics::DiagnosticSample,
    error::PlanResult,
    keys::{KeyNormalizer, RejectReason},
    numeric::{round_to, to_f64},
    source::{FactSource, FactWindow, RawFactRow, UnreadableFact},
    store::{PlanStore, SalesLedgerRow},
    types::{new_run_id, CalendarMonth, CalendarYear, EntityId, RunId, RunMode},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LedgerKey {
    pub entity_id: EntityId,
    pub year: CalendarYear,
    pub month: CalendarMonth,
}

/// Running totals of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct SalesTotals {
    buckets: BTreeMap<LedgerKey, Decimal>,
}

impl SalesTotals {
    /// Add `quantity` to the bucket of `key`. Returns false, leaving the
    /// bucket unchanged, when the sum would overflow.
    pub fn add(&mut self, key: LedgerKey, quantity: Decimal) -> bool {
        let total = self.buckets.entry(key).or_insert(Decimal::ZERO);
        match total.checked_add(quantity) {
            Some(sum) => {
                *total = sum;
                true
            }
            None => false,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Round every total to `decimal_places` and turn it into a ledger row.
    pub fn into_ledger_rows(self, decimal_places: u32) -> Vec<SalesLedgerRow> {
        self.buckets
            .into_iter()
            .map(|(key, total)| SalesLedgerRow {
                entity_id: key.entity_id,
                year: key.year,
                month: key.month,
                volume: to_f64(round_to(total, decimal_places)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationOptions {
    pub start: NaiveDate,
    /// "Now" for the run: realized facts up to here, open orders from here on.
    pub as_of: NaiveDate,
    pub mode: RunMode,
    pub max_shown: usize,
}

/// What was rejected: a parsed row, or a record the feed could not parse.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectedInput {
    Row(RawFactRow),
    Record(UnreadableFact),
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedFact {
    pub reason: RejectReason,
    pub input: RejectedInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerWriteFailure {
    pub entity_id: EntityId,
    pub year: CalendarYear,
    pub month: CalendarMonth,
    pub volume: f64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationSummary {
    pub run_id: RunId,
    pub mode: RunMode,
    pub start: NaiveDate,
    pub as_of: NaiveDate,
    pub rows_seen: usize,
    pub rows_rejected: usize,
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
    /// Distinct (entity, year, month) totals accumulated.
    pub buckets: usize,
    pub rows_upserted: usize,
    pub rows_failed: usize,
    /// Batches that fell back to row-by-row writes.
    pub degraded_batches: usize,
    /// True once the ledger writes are durable.
    pub committed: bool,
    /// Systemic failure that rolled the run back.
    pub failure: Option<String>,
    pub rejections: DiagnosticSample<RejectedFact>,
    pub write_failures: DiagnosticSample<LedgerWriteFailure>,
}

impl AggregationSummary {
    fn new(options: &AggregationOptions) -> Self {
        Self {
            run_id: new_run_id("sales"),
            mode: options.mode,
            start: options.start,
            as_of: options.as_of,
            rows_seen: 0,
            rows_rejected: 0,
            rejected_by_reason: BTreeMap::new(),
            buckets: 0,
            rows_upserted: 0,
            rows_failed: 0,
            degraded_batches: 0,
            committed: false,
            failure: None,
            rejections: DiagnosticSample::new(options.max_shown),
            write_failures: DiagnosticSample::new(options.max_shown),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    fn reject(&mut self, reason: RejectReason, input: impl FnOnce() -> RejectedInput) {
        self.rows_rejected += 1;
        *self.rejected_by_reason.entry(reason).or_insert(0) += 1;
        self.rejections.record_with(|| RejectedFact {
            reason,
            input: input(),
        });
    }
}

pub struct SalesAggregator<'a> {
    store: &'a PlanStore,
    config: &'a PipelineConfig,
}

impl<'a> SalesAggregator<'a> {
    pub fn new(store: &'a PlanStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Aggregate the feed into the sales ledger.
    ///
    /// Never returns an error: a systemic failure is logged, everything
    /// written by this run is rolled back, and the counts gathered so far
    /// come back with `failure` set.
    pub fn run(&self, source: &mut dyn FactSource, options: &AggregationOptions) -> AggregationSummary {
        let mut summary = AggregationSummary::new(options);
        log::info!(
            "[{}] aggregating {} from {} (as of {}, {:?})",
            summary.run_id,
            source.name(),
            options.start,
            options.as_of,
            options.mode
        );

        match self.execute(source, options, &mut summary) {
            Ok(()) => log::info!(
                "[{}] seen={} rejected={} buckets={} upserted={} failed={} degraded_batches={}",
                summary.run_id,
                summary.rows_seen,
                summary.rows_rejected,
                summary.buckets,
                summary.rows_upserted,
                summary.rows_failed,
                summary.degraded_batches
            ),
            Err(e) => {
                log::error!(
                    "[{}] sales aggregation rolled back at {}:{}: {e}",
                    summary.run_id,
                    file!(),
                    line!()
                );
                summary.committed = false;
                summary.failure = Some(e.to_string());
            }
        }
        summary
    }

    fn execute(
        &self,
        source: &mut dyn FactSource,
        options: &AggregationOptions,
        summary: &mut AggregationSummary,
    ) -> PlanResult<()> {
        let index = CpcIndex::load(self.store)?;
        let window = FactWindow::new(options.start, options.as_of);
        let feed = source.fetch(&window)?;

        for record in feed.unreadable {
            summary.rows_seen += 1;
            log::debug!(
                "[{}] feed record at line {:?} rejected: {}",
                summary.run_id,
                record.line,
                record.error
            );
            summary.reject(record.reason, || RejectedInput::Record(record));
        }
        let totals = self.accumulate(&feed.rows, &index, summary);
        summary.buckets = totals.bucket_count();

        if options.mode.is_dry_run() {
            return Ok(());
        }

        let ledger_rows = totals.into_ledger_rows(self.config.sales.decimal_places);
        let outcome = self.store.run_in_transaction(RunMode::Commit, |store| {
            Ok(write_in_batches(
                &ledger_rows,
                self.config.sales.batch_size,
                |batch| store.upsert_sales_batch(batch),
                |row| store.upsert_sales_row(row),
            ))
        })?;

        summary.rows_upserted = outcome.written;
        summary.rows_failed = outcome.failures.len();
        summary.degraded_batches = outcome.degraded_batches;
        for failure in outcome.failures {
            log::warn!(
                "[{}] ledger row entity={} {}-{:02} volume={} not written: {}",
                summary.run_id,
                failure.row.entity_id,
                failure.row.year,
                failure.row.month,
                failure.row.volume,
                failure.error
            );
            summary.write_failures.record(LedgerWriteFailure {
                entity_id: failure.row.entity_id,
                year: failure.row.year,
                month: failure.row.month,
                volume: failure.row.volume,
                error: failure.error,
            });
        }
        summary.committed = true;
        Ok(())
    }

    /// Validate every row and sum the valid ones per ledger key.
    fn accumulate(
        &self,
        rows: &[RawFactRow],
        index: &CpcIndex,
        summary: &mut AggregationSummary,
    ) -> SalesTotals {
        let keys = KeyNormalizer::new(&self.config.sales);
        let mut totals = SalesTotals::default();
        for row in rows {
            summary.rows_seen += 1;
            let fact = match keys.normalize(row) {
                Ok(fact) => fact,
                Err(reason) => {
                    summary.reject(reason, || RejectedInput::Row(row.clone()));
                    continue;
                }
            };
            let Some(entity_id) = index.resolve(&fact.client_group, &fact.profit_center) else {
                summary.reject(RejectReason::UnknownCpc, || RejectedInput::Row(row.clone()));
                continue;
            };
            let key = LedgerKey {
                entity_id,
                year: fact.year,
                month: fact.month,
            };
            if !totals.add(key, fact.quantity) {
                log::warn!(
                    "[{}] entity={} {}-{:02}: adding {} overflows the bucket total",
                    summary.run_id,
                    entity_id,
                    fact.year,
                    fact.month,
                    fact.quantity
                );
                summary.reject(RejectReason::QuantityOutOfRange, || RejectedInput::Row(row.clone()));
            }
        }
        totals
    }
}
