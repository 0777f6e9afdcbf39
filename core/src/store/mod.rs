//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline stages call store methods, they never execute SQL directly.

use crate::{
    error::PlanResult,
    types::{CalendarMonth, CalendarYear, EntityId, ForecastVersion, PlanningPeriod, RunMode},
};
use rusqlite::Connection;
use serde::Serialize;

mod budget;
mod forecast;
mod reference;
mod sales;

pub struct PlanStore {
    conn: Connection,
}

impl PlanStore {
    pub fn open(path: &str) -> PlanResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PlanResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> PlanResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_reference.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_sales_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_budget.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_forecast.sql"))?;
        Ok(())
    }

    /// Run `work` inside one transaction.
    ///
    /// Committed only when `work` succeeds in `RunMode::Commit`. A dry run
    /// or an error rolls everything back, and the error is returned as is.
    pub fn run_in_transaction<T, F>(&self, mode: RunMode, work: F) -> PlanResult<T>
    where
        F: FnOnce(&Self) -> PlanResult<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        match work(self) {
            Ok(value) if mode.is_dry_run() => {
                tx.rollback()?;
                Ok(value)
            }
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!("Rollback failed after '{e}': {rollback_err}");
                }
                Err(e)
            }
        }
    }
}

/// SQLite's default limit on bound parameters in one statement.
pub const MAX_STATEMENT_PARAMS: usize = 32_766;
pub const SALES_LEDGER_COLUMNS: usize = 4;
pub const FORECAST_COLUMNS: usize = 6;

/// Most rows a multi-row VALUES statement of `columns` columns can bind.
pub const fn max_batch_rows(columns: usize) -> usize {
    MAX_STATEMENT_PARAMS / columns
}

/// `(?,?,..),(?,?,..)` for a multi-row VALUES clause.
fn values_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(","));
    vec![row; rows].join(",")
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpcRow {
    pub id: EntityId,
    pub client_group: String,
    pub profit_center: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseAdjustmentRow {
    pub entity_id: EntityId,
    pub planning_period: PlanningPeriod,
    pub best_case: f64,
    pub skip_budget: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesLedgerRow {
    pub entity_id: EntityId,
    pub year: CalendarYear,
    pub month: CalendarMonth,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetRow {
    pub entity_id: EntityId,
    pub planning_period: PlanningPeriod,
    pub month: CalendarMonth,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetAuditRow {
    pub entity_id: EntityId,
    pub planning_period: PlanningPeriod,
    pub month: CalendarMonth,
    pub cutoff_month: CalendarMonth,
    pub run_rate_base: f64,
    pub best_case: f64,
    pub cumulative_seasonality: f64,
    pub annual_estimate: f64,
    pub annual_total: f64,
    pub month_percentage: f64,
    pub month_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForecastRow {
    pub entity_id: EntityId,
    pub planning_period: PlanningPeriod,
    pub month: CalendarMonth,
    pub version: ForecastVersion,
    pub volume: i64,
    pub created_by: Option<String>,
}

/// Whether an upsert created a row or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
