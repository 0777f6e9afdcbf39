//! Budget generator: sales ledger → full-year budget per CPC.
//!
//! Per entity, for target planning period P and cutoff month C:
//!   1. run-rate base  = ledger volume of months 1..=min(3,C) in year P-2
//!                     + ledger volume of months 4..=C in year P-1
//!   2. seasonality    = P-1 curve over months 1..=min(3,C)
//!                     + P curve over months 4..=C
//!   3. annual estimate = run-rate base / (seasonality / 100)
//!   4. annual total    = round(estimate * (1 + best_case / 100), 2)
//!   5. month volume    = round(P curve(month) / 100 * annual total, 2),
//!      months April..December then January..March
//!   6. budget row      = month volume rounded to whole units
//!
//! The P-2 / P-1 offsets follow the business calendar as it was handed
//! over and are kept exactly as listed above.
//!
//! An entity is skipped (no rows at all) when its run-rate base or its
//! cumulative seasonality is not positive, when P has no curve, or when
//! any step leaves the decimal range.
//! Otherwise all twelve months are written, so a period holds either
//! 12 budget rows for an entity or none.

use crate::{
    config::PipelineConfig,
    cpc_index::CpcIndex,
    diagnostics::DiagnosticSample,
    error::{PlanError, PlanResult},
    numeric::{decimal_from_f64, percent_of, round_to, round_to_units, to_f64},
    seasonality::{SeasonalityCurve, PLANNING_ORDER},
    store::{BudgetAuditRow, BudgetRow, CpcRow, PlanStore, UpsertOutcome},
    types::{new_run_id, CalendarMonth, CalendarYear, EntityId, PlanningPeriod, RunId, RunMode},
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

/// Cutoff month for a run: the requested month, or the month of `today`,
/// clamped into the configured bounds.
pub fn effective_cutoff(
    requested: Option<CalendarMonth>,
    today: NaiveDate,
    config: &PipelineConfig,
) -> CalendarMonth {
    requested
        .unwrap_or_else(|| today.month())
        .clamp(config.budget.cutoff_floor, config.budget.cutoff_ceiling)
}

/// The slice of sales history used as the run-rate base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRateWindow {
    pub planning_period: PlanningPeriod,
    pub cutoff: CalendarMonth,
    /// January..March segment, read from P-2.
    pub early_year: CalendarYear,
    pub early_months: RangeInclusive<CalendarMonth>,
    /// April..cutoff segment, read from P-1. Empty when cutoff < 4.
    pub late_year: CalendarYear,
    pub late_months: RangeInclusive<CalendarMonth>,
}

impl RunRateWindow {
    pub fn new(planning_period: PlanningPeriod, cutoff: CalendarMonth) -> Self {
        Self {
            planning_period,
            cutoff,
            early_year: planning_period - 2,
            early_months: 1..=cutoff.min(3),
            late_year: planning_period - 1,
            late_months: 4..=cutoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRunRate,
    NoSeasonality,
    MissingTargetCurve,
    /// An input or intermediate value does not fit a decimal.
    OutOfRange,
}

pub struct EntityInputs<'c> {
    pub run_rate_base: Decimal,
    pub best_case: Decimal,
    /// Curve of the target period P.
    pub target_curve: Option<&'c SeasonalityCurve>,
    /// Curve of P-1.
    pub prior_curve: Option<&'c SeasonalityCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthAllocation {
    pub month: CalendarMonth,
    pub percentage: Decimal,
    /// Rounded to 2 places.
    pub volume: Decimal,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityBudget {
    pub run_rate_base: Decimal,
    pub best_case: Decimal,
    pub cumulative_seasonality: Decimal,
    pub annual_estimate: Decimal,
    pub annual_total: Decimal,
    /// In planning order, April first.
    pub months: Vec<MonthAllocation>,
}

/// Annualize an entity's run rate and spread it over the twelve months
/// of the target period.
pub fn allocate(window: &RunRateWindow, inputs: &EntityInputs<'_>) -> Result<EntityBudget, SkipReason> {
    if inputs.run_rate_base <= Decimal::ZERO {
        return Err(SkipReason::NoRunRate);
    }

    let prior_share = inputs
        .prior_curve
        .map_or(Decimal::ZERO, |c| c.cumulative(window.early_months.clone()));
    let target_share = inputs
        .target_curve
        .map_or(Decimal::ZERO, |c| c.cumulative(window.late_months.clone()));
    let cumulative_seasonality = prior_share
        .checked_add(target_share)
        .ok_or(SkipReason::OutOfRange)?;
    if cumulative_seasonality <= Decimal::ZERO {
        return Err(SkipReason::NoSeasonality);
    }

    let Some(target_curve) = inputs.target_curve else {
        return Err(SkipReason::MissingTargetCurve);
    };

    let annual_estimate = inputs
        .run_rate_base
        .checked_div(cumulative_seasonality / Decimal::ONE_HUNDRED)
        .ok_or(SkipReason::OutOfRange)?;
    let uplift = Decimal::ONE
        .checked_add(inputs.best_case / Decimal::ONE_HUNDRED)
        .ok_or(SkipReason::OutOfRange)?;
    let annual_total = round_to(
        annual_estimate.checked_mul(uplift).ok_or(SkipReason::OutOfRange)?,
        2,
    );

    let months = PLANNING_ORDER
        .iter()
        .map(|&month| {
            let percentage = target_curve.percentage(month);
            let volume = round_to(
                percent_of(percentage, annual_total).ok_or(SkipReason::OutOfRange)?,
                2,
            );
            Ok(MonthAllocation {
                month,
                percentage,
                volume,
                units: round_to_units(volume),
            })
        })
        .collect::<Result<Vec<_>, SkipReason>>()?;

    Ok(EntityBudget {
        run_rate_base: inputs.run_rate_base,
        best_case: inputs.best_case,
        cumulative_seasonality,
        annual_estimate,
        annual_total,
        months,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetOptions {
    pub planning_period: PlanningPeriod,
    /// Defaults to the month of `today`; always clamped.
    pub cutoff_month: Option<CalendarMonth>,
    pub today: NaiveDate,
    /// Clear the period's budget and audit rows before recomputing.
    pub rebuild: bool,
    pub mode: RunMode,
    pub max_shown: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntity {
    pub entity_id: EntityId,
    pub client_group: String,
    pub profit_center: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetSummary {
    pub run_id: RunId,
    pub planning_period: PlanningPeriod,
    pub cutoff_month: CalendarMonth,
    pub mode: RunMode,
    pub rebuild: bool,
    pub entities_examined: usize,
    pub entities_budgeted: usize,
    pub entities_skipped: usize,
    pub skipped_by_reason: BTreeMap<SkipReason, usize>,
    pub rows_inserted: usize,
    pub rows_updated: usize,
    /// Budget rows removed up front by a rebuild.
    pub rows_cleared: usize,
    pub skipped: DiagnosticSample<SkippedEntity>,
}

impl BudgetSummary {
    fn skip(&mut self, entry: &CpcRow, reason: SkipReason) {
        self.entities_skipped += 1;
        *self.skipped_by_reason.entry(reason).or_insert(0) += 1;
        self.skipped.record_with(|| SkippedEntity {
            entity_id: entry.id,
            client_group: entry.client_group.clone(),
            profit_center: entry.profit_center.clone(),
            reason,
        });
    }
}

struct CurvePair {
    target: Option<SeasonalityCurve>,
    prior: Option<SeasonalityCurve>,
}

pub struct BudgetGenerator<'a> {
    store: &'a PlanStore,
    config: &'a PipelineConfig,
}

impl<'a> BudgetGenerator<'a> {
    pub fn new(store: &'a PlanStore, config: &'a PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Generate the budget of one planning period for every CPC.
    ///
    /// Runs in a single transaction. On error nothing written by this run
    /// survives and the error is returned to the caller.
    pub fn run(&self, options: &BudgetOptions) -> PlanResult<BudgetSummary> {
        let cutoff = effective_cutoff(options.cutoff_month, options.today, self.config);
        let window = RunRateWindow::new(options.planning_period, cutoff);
        let run_id = new_run_id("budget");
        log::info!(
            "[{run_id}] generating budget {} with cutoff month {cutoff} (rebuild={}, {:?})",
            options.planning_period,
            options.rebuild,
            options.mode
        );

        let result = self.store.run_in_transaction(options.mode, |store| {
            let index = CpcIndex::load(store)?;
            let mut summary = BudgetSummary {
                run_id: run_id.clone(),
                planning_period: options.planning_period,
                cutoff_month: cutoff,
                mode: options.mode,
                rebuild: options.rebuild,
                entities_examined: 0,
                entities_budgeted: 0,
                entities_skipped: 0,
                skipped_by_reason: BTreeMap::new(),
                rows_inserted: 0,
                rows_updated: 0,
                rows_cleared: 0,
                skipped: DiagnosticSample::new(options.max_shown),
            };
            if options.rebuild {
                summary.rows_cleared = store.delete_budget_period(options.planning_period)?;
            }

            let mut curves = HashMap::new();
            for entry in index.entries() {
                summary.entities_examined += 1;
                let pair = Self::curves_for(store, &mut curves, &entry.profit_center, options.planning_period)?;
                Self::generate_entity(store, entry, &window, pair, &mut summary)?;
            }
            Ok(summary)
        });

        match result {
            Ok(summary) => {
                log::info!(
                    "[{run_id}] budgeted={} skipped={} inserted={} updated={}",
                    summary.entities_budgeted,
                    summary.entities_skipped,
                    summary.rows_inserted,
                    summary.rows_updated
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!(
                    "[{run_id}] budget generation for {} rolled back at {}:{}: {e}",
                    options.planning_period,
                    file!(),
                    line!()
                );
                Err(e)
            }
        }
    }

    fn curves_for<'c>(
        store: &PlanStore,
        cache: &'c mut HashMap<String, CurvePair>,
        profit_center: &str,
        planning_period: PlanningPeriod,
    ) -> PlanResult<&'c CurvePair> {
        if !cache.contains_key(profit_center) {
            let pair = CurvePair {
                target: store.seasonality_curve(profit_center, planning_period)?,
                prior: store.seasonality_curve(profit_center, planning_period - 1)?,
            };
            cache.insert(profit_center.to_string(), pair);
        }
        Ok(&cache[profit_center])
    }

    /// Run-rate base and best-case uplift of one entity.
    fn entity_inputs(
        store: &PlanStore,
        entry: &CpcRow,
        window: &RunRateWindow,
    ) -> PlanResult<(Decimal, Decimal)> {
        let early = store.sales_volume(entry.id, window.early_year, window.early_months.clone())?;
        let late = store.sales_volume(entry.id, window.late_year, window.late_months.clone())?;
        let run_rate_base = early
            .checked_add(late)
            .ok_or(PlanError::Overflow("run-rate base"))?;
        let best_case = match store.case_adjustment(entry.id, window.planning_period)? {
            Some(adjustment) => decimal_from_f64(adjustment.best_case)?,
            None => Decimal::ZERO,
        };
        Ok((run_rate_base, best_case))
    }

    fn generate_entity(
        store: &PlanStore,
        entry: &CpcRow,
        window: &RunRateWindow,
        curves: &CurvePair,
        summary: &mut BudgetSummary,
    ) -> PlanResult<()> {
        let inputs = match Self::entity_inputs(store, entry, window) {
            Ok((run_rate_base, best_case)) => EntityInputs {
                run_rate_base,
                best_case,
                target_curve: curves.target.as_ref(),
                prior_curve: curves.prior.as_ref(),
            },
            Err(e) if e.is_out_of_range() => {
                log::warn!(
                    "entity {} ({}/{}) skipped: {e}",
                    entry.id,
                    entry.client_group,
                    entry.profit_center
                );
                summary.skip(entry, SkipReason::OutOfRange);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let budget = match allocate(window, &inputs) {
            Ok(budget) => budget,
            Err(reason) => {
                log::debug!(
                    "entity {} ({}/{}) skipped: {reason:?}",
                    entry.id,
                    entry.client_group,
                    entry.profit_center
                );
                summary.skip(entry, reason);
                return Ok(());
            }
        };

        log::debug!(
            "entity {}: run rate {} / {}% → {} → {}",
            entry.id,
            budget.run_rate_base,
            budget.cumulative_seasonality,
            budget.annual_estimate,
            budget.annual_total
        );

        for allocation in &budget.months {
            let row = BudgetRow {
                entity_id: entry.id,
                planning_period: window.planning_period,
                month: allocation.month,
                volume: allocation.units,
            };
            match store.upsert_budget_row(&row)? {
                UpsertOutcome::Inserted => summary.rows_inserted += 1,
                UpsertOutcome::Updated => summary.rows_updated += 1,
            }
            store.upsert_budget_audit(&BudgetAuditRow {
                entity_id: entry.id,
                planning_period: window.planning_period,
                month: allocation.month,
                cutoff_month: window.cutoff,
                run_rate_base: to_f64(budget.run_rate_base),
                best_case: to_f64(budget.best_case),
                cumulative_seasonality: to_f64(budget.cumulative_seasonality),
                annual_estimate: to_f64(budget.annual_estimate),
                annual_total: to_f64(budget.annual_total),
                month_percentage: to_f64(allocation.percentage),
                month_volume: to_f64(allocation.volume),
            })?;
        }
        summary.entities_budgeted += 1;
        Ok(())
    }
}
