use super::{values_placeholders, ForecastRow, PlanStore, FORECAST_COLUMNS};
use crate::{
    error::PlanResult,
    types::{ForecastVersion, PlanningPeriod},
};
use rusqlite::{params, params_from_iter, types::Value};

const UPSERT_FORECAST: &str =
    "INSERT OR REPLACE INTO forecast (entity_id, planning_period, month, version, volume, created_by) VALUES ";

impl PlanStore {
    pub fn delete_forecast(
        &self,
        planning_period: PlanningPeriod,
        version: ForecastVersion,
    ) -> PlanResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM forecast WHERE planning_period = ?1 AND version = ?2",
            params![planning_period, version],
        )?;
        Ok(removed)
    }

    /// Replace-on-conflict upsert of many rows in a single statement.
    pub fn upsert_forecast_batch(&self, rows: &[ForecastRow]) -> PlanResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = format!("{UPSERT_FORECAST}{}", values_placeholders(rows.len(), FORECAST_COLUMNS));
        let values: Vec<Value> = rows
            .iter()
            .flat_map(|r| {
                [
                    Value::Integer(r.entity_id),
                    Value::Integer(i64::from(r.planning_period)),
                    Value::Integer(i64::from(r.month)),
                    Value::Integer(i64::from(r.version)),
                    Value::Integer(r.volume),
                    r.created_by.clone().map_or(Value::Null, Value::Text),
                ]
            })
            .collect();
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn upsert_forecast_row(&self, row: &ForecastRow) -> PlanResult<()> {
        self.conn.execute(
            &format!("{UPSERT_FORECAST}(?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                row.entity_id,
                row.planning_period,
                row.month,
                row.version,
                row.volume,
                row.created_by,
            ],
        )?;
        Ok(())
    }

    /// Forecast rows of one version, ordered by entity then month.
    pub fn forecast_rows(
        &self,
        planning_period: PlanningPeriod,
        version: ForecastVersion,
    ) -> PlanResult<Vec<ForecastRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, planning_period, month, version, volume, created_by
             FROM forecast
             WHERE planning_period = ?1 AND version = ?2
             ORDER BY entity_id ASC, month ASC",
        )?;
        let rows = stmt
            .query_map(params![planning_period, version], |row| {
                Ok(ForecastRow {
                    entity_id: row.get(0)?,
                    planning_period: row.get(1)?,
                    month: row.get(2)?,
                    version: row.get(3)?,
                    volume: row.get(4)?,
                    created_by: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
