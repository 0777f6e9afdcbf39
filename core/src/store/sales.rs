use super::{values_placeholders, PlanStore, SalesLedgerRow, SALES_LEDGER_COLUMNS};
use crate::{
    error::{PlanError, PlanResult},
    numeric::decimal_from_f64,
    types::{CalendarMonth, CalendarYear, EntityId},
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};
use rust_decimal::Decimal;
use std::ops::RangeInclusive;

const UPSERT_SALES: &str = "INSERT INTO sales_ledger (entity_id, year, month, volume) VALUES ";
const ON_CONFLICT_SALES: &str =
    " ON CONFLICT(entity_id, year, month) DO UPDATE SET volume = excluded.volume";

impl PlanStore {
    /// Upsert many ledger rows in a single statement (all or nothing).
    pub fn upsert_sales_batch(&self, rows: &[SalesLedgerRow]) -> PlanResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "{UPSERT_SALES}{}{ON_CONFLICT_SALES}",
            values_placeholders(rows.len(), SALES_LEDGER_COLUMNS)
        );
        let values: Vec<Value> = rows
            .iter()
            .flat_map(|r| {
                [
                    Value::Integer(r.entity_id),
                    Value::Integer(i64::from(r.year)),
                    Value::Integer(i64::from(r.month)),
                    Value::Real(r.volume),
                ]
            })
            .collect();
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn upsert_sales_row(&self, row: &SalesLedgerRow) -> PlanResult<()> {
        self.conn.execute(
            &format!("{UPSERT_SALES}(?1, ?2, ?3, ?4){ON_CONFLICT_SALES}"),
            params![row.entity_id, row.year, row.month, row.volume],
        )?;
        Ok(())
    }

    pub fn sales_ledger_row(
        &self,
        entity_id: EntityId,
        year: CalendarYear,
        month: CalendarMonth,
    ) -> PlanResult<Option<SalesLedgerRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_id, year, month, volume FROM sales_ledger
                 WHERE entity_id = ?1 AND year = ?2 AND month = ?3",
                params![entity_id, year, month],
                |row| {
                    Ok(SalesLedgerRow {
                        entity_id: row.get(0)?,
                        year: row.get(1)?,
                        month: row.get(2)?,
                        volume: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn sales_ledger_rows(&self) -> PlanResult<Vec<SalesLedgerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, year, month, volume FROM sales_ledger
             ORDER BY entity_id ASC, year ASC, month ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SalesLedgerRow {
                    entity_id: row.get(0)?,
                    year: row.get(1)?,
                    month: row.get(2)?,
                    volume: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn sales_ledger_count(&self) -> PlanResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sales_ledger", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Total ledger volume of one entity over a month range of one year,
    /// summed as decimals. An empty range is zero. A sum beyond the
    /// decimal range is `PlanError::Overflow`.
    pub fn sales_volume(
        &self,
        entity_id: EntityId,
        year: CalendarYear,
        months: RangeInclusive<CalendarMonth>,
    ) -> PlanResult<Decimal> {
        if months.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let mut stmt = self.conn.prepare_cached(
            "SELECT volume FROM sales_ledger
             WHERE entity_id = ?1 AND year = ?2 AND month BETWEEN ?3 AND ?4",
        )?;
        let volumes = stmt
            .query_map(
                params![entity_id, year, months.start(), months.end()],
                |row| row.get::<_, f64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        let mut total = Decimal::ZERO;
        for volume in volumes {
            total = total
                .checked_add(decimal_from_f64(volume)?)
                .ok_or(PlanError::Overflow("ledger volume sum"))?;
        }
        Ok(total)
    }
}
