use super::{BudgetAuditRow, BudgetRow, PlanStore, UpsertOutcome};
use crate::{
    error::PlanResult,
    types::{CalendarMonth, EntityId, PlanningPeriod},
};
use rusqlite::params;

impl PlanStore {
    /// Remove every budget and audit row of a period. Returns the number
    /// of budget rows removed.
    pub fn delete_budget_period(&self, planning_period: PlanningPeriod) -> PlanResult<usize> {
        self.conn.execute(
            "DELETE FROM budget_audit WHERE planning_period = ?1",
            params![planning_period],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM budget WHERE planning_period = ?1",
            params![planning_period],
        )?;
        Ok(removed)
    }

    pub fn budget_row_exists(
        &self,
        entity_id: EntityId,
        planning_period: PlanningPeriod,
        month: CalendarMonth,
    ) -> PlanResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT 1 FROM budget
             WHERE entity_id = ?1 AND planning_period = ?2 AND month = ?3",
        )?;
        Ok(stmt.exists(params![entity_id, planning_period, month])?)
    }

    /// Insert the row, or update its volume in place when the key exists.
    pub fn upsert_budget_row(&self, row: &BudgetRow) -> PlanResult<UpsertOutcome> {
        if self.budget_row_exists(row.entity_id, row.planning_period, row.month)? {
            self.conn.execute(
                "UPDATE budget SET volume = ?4
                 WHERE entity_id = ?1 AND planning_period = ?2 AND month = ?3",
                params![row.entity_id, row.planning_period, row.month, row.volume],
            )?;
            Ok(UpsertOutcome::Updated)
        } else {
            self.conn.execute(
                "INSERT INTO budget (entity_id, planning_period, month, volume)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.entity_id, row.planning_period, row.month, row.volume],
            )?;
            Ok(UpsertOutcome::Inserted)
        }
    }

    pub fn upsert_budget_audit(&self, row: &BudgetAuditRow) -> PlanResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO budget_audit (
                entity_id, planning_period, month, cutoff_month,
                run_rate_base, best_case, cumulative_seasonality,
                annual_estimate, annual_total, month_percentage, month_volume
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.entity_id,
                row.planning_period,
                row.month,
                row.cutoff_month,
                row.run_rate_base,
                row.best_case,
                row.cumulative_seasonality,
                row.annual_estimate,
                row.annual_total,
                row.month_percentage,
                row.month_volume,
            ],
        )?;
        Ok(())
    }

    /// Budget rows of a period, ordered by entity then month.
    pub fn budget_rows(&self, planning_period: PlanningPeriod) -> PlanResult<Vec<BudgetRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, planning_period, month, volume FROM budget
             WHERE planning_period = ?1
             ORDER BY entity_id ASC, month ASC",
        )?;
        let rows = stmt
            .query_map(params![planning_period], |row| {
                Ok(BudgetRow {
                    entity_id: row.get(0)?,
                    planning_period: row.get(1)?,
                    month: row.get(2)?,
                    volume: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn budget_rows_for_entity(
        &self,
        entity_id: EntityId,
        planning_period: PlanningPeriod,
    ) -> PlanResult<Vec<BudgetRow>> {
        Ok(self
            .budget_rows(planning_period)?
            .into_iter()
            .filter(|r| r.entity_id == entity_id)
            .collect())
    }

    pub fn budget_audit_rows(
        &self,
        entity_id: EntityId,
        planning_period: PlanningPeriod,
    ) -> PlanResult<Vec<BudgetAuditRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, planning_period, month, cutoff_month,
                    run_rate_base, best_case, cumulative_seasonality,
                    annual_estimate, annual_total, month_percentage, month_volume
             FROM budget_audit
             WHERE entity_id = ?1 AND planning_period = ?2
             ORDER BY month ASC",
        )?;
        let rows = stmt
            .query_map(params![entity_id, planning_period], |row| {
                Ok(BudgetAuditRow {
                    entity_id: row.get(0)?,
                    planning_period: row.get(1)?,
                    month: row.get(2)?,
                    cutoff_month: row.get(3)?,
                    run_rate_base: row.get(4)?,
                    best_case: row.get(5)?,
                    cumulative_seasonality: row.get(6)?,
                    annual_estimate: row.get(7)?,
                    annual_total: row.get(8)?,
                    month_percentage: row.get(9)?,
                    month_volume: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
