use super::{CaseAdjustmentRow, CpcRow, PlanStore};
use crate::{
    error::PlanResult,
    numeric::{decimal_from_f64, to_f64},
    seasonality::SeasonalityCurve,
    types::{EntityId, PlanningPeriod},
};
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::HashSet;

impl PlanStore {
    // ── CPC ────────────────────────────────────────────────────────

    pub fn all_cpcs(&self) -> PlanResult<Vec<CpcRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_group, profit_center FROM cpc ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CpcRow {
                    id: row.get(0)?,
                    client_group: row.get(1)?,
                    profit_center: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_cpc(&self, client_group: &str, profit_center: &str) -> PlanResult<Option<CpcRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, client_group, profit_center FROM cpc
                 WHERE client_group = ?1 AND profit_center = ?2",
                params![client_group, profit_center],
                |row| {
                    Ok(CpcRow {
                        id: row.get(0)?,
                        client_group: row.get(1)?,
                        profit_center: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Create the CPC when the pairing is new. Returns the row and
    /// whether it was created by this call.
    pub fn insert_cpc_if_missing(
        &self,
        client_group: &str,
        profit_center: &str,
    ) -> PlanResult<(CpcRow, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO cpc (client_group, profit_center) VALUES (?1, ?2)",
            params![client_group, profit_center],
        )?;
        let row = self
            .find_cpc(client_group, profit_center)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok((row, inserted > 0))
    }

    // ── Seasonality ────────────────────────────────────────────────

    pub fn seasonality_curve(
        &self,
        profit_center: &str,
        planning_period: PlanningPeriod,
    ) -> PlanResult<Option<SeasonalityCurve>> {
        let values = self
            .conn
            .query_row(
                "SELECT january, february, march, april, may, june,
                        july, august, september, october, november, december
                 FROM seasonality_curve
                 WHERE profit_center = ?1 AND planning_period = ?2",
                params![profit_center, planning_period],
                |row| {
                    let mut values = [0.0f64; 12];
                    for (i, value) in values.iter_mut().enumerate() {
                        *value = row.get(i)?;
                    }
                    Ok(values)
                },
            )
            .optional()?;
        let Some(values) = values else {
            return Ok(None);
        };
        let mut percentages = [Decimal::ZERO; 12];
        for (slot, value) in percentages.iter_mut().zip(values) {
            *slot = decimal_from_f64(value)?;
        }
        Ok(Some(SeasonalityCurve::new(
            profit_center,
            planning_period,
            percentages,
        )))
    }

    pub fn upsert_seasonality_curve(&self, curve: &SeasonalityCurve) -> PlanResult<()> {
        let p: Vec<f64> = curve.percentages().iter().map(|d| to_f64(*d)).collect();
        self.conn.execute(
            "INSERT INTO seasonality_curve (
                profit_center, planning_period,
                january, february, march, april, may, june,
                july, august, september, october, november, december
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(profit_center, planning_period) DO UPDATE SET
                january = excluded.january,     february = excluded.february,
                march = excluded.march,         april = excluded.april,
                may = excluded.may,             june = excluded.june,
                july = excluded.july,           august = excluded.august,
                september = excluded.september, october = excluded.october,
                november = excluded.november,   december = excluded.december",
            params![
                curve.profit_center,
                curve.planning_period,
                p[0], p[1], p[2], p[3], p[4], p[5],
                p[6], p[7], p[8], p[9], p[10], p[11],
            ],
        )?;
        Ok(())
    }

    // ── Case adjustments ───────────────────────────────────────────

    pub fn case_adjustment(
        &self,
        entity_id: EntityId,
        planning_period: PlanningPeriod,
    ) -> PlanResult<Option<CaseAdjustmentRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_id, planning_period, best_case, skip_budget
                 FROM case_adjustment
                 WHERE entity_id = ?1 AND planning_period = ?2",
                params![entity_id, planning_period],
                |row| {
                    Ok(CaseAdjustmentRow {
                        entity_id: row.get(0)?,
                        planning_period: row.get(1)?,
                        best_case: row.get(2)?,
                        skip_budget: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_case_adjustment(&self, row: &CaseAdjustmentRow) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO case_adjustment (entity_id, planning_period, best_case, skip_budget)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id, planning_period) DO UPDATE SET
                best_case = excluded.best_case,
                skip_budget = excluded.skip_budget",
            params![
                row.entity_id,
                row.planning_period,
                row.best_case,
                row.skip_budget as i64,
            ],
        )?;
        Ok(())
    }

    /// Entities flagged `skip_budget` for the period.
    pub fn skipped_entities(&self, planning_period: PlanningPeriod) -> PlanResult<HashSet<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id FROM case_adjustment
             WHERE planning_period = ?1 AND skip_budget != 0",
        )?;
        let ids = stmt
            .query_map(params![planning_period], |row| row.get::<_, EntityId>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}
