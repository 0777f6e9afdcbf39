//! The external sales fact feed.
//!
//! A feed yields raw rows exactly as the source system has them; key
//! normalization and validation happen in the aggregator. Records a feed
//! cannot even place in time come back separately as unreadable, so one
//! bad line never costs the rest of the feed.

use crate::{
    error::{PlanError, PlanResult},
    keys::RejectReason,
    types::{CalendarMonth, CalendarYear},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quantity columns of a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityColumn {
    Uom,
    Cubic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFactRow {
    pub client_group: String,
    pub profit_center: String,
    #[serde(default)]
    pub product_group: String,
    pub year: CalendarYear,
    pub month: CalendarMonth,
    /// Quantity in the sales unit of measure.
    pub uom_quantity: Option<f64>,
    /// Quantity in cubic meters.
    pub cubic_quantity: Option<f64>,
    /// Still-open order rather than a realized transaction.
    #[serde(default)]
    pub open_order: bool,
    /// Quantity cells present in the feed but not numbers. Only the
    /// column the profit center measures in decides whether the row is
    /// rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable_quantities: Vec<QuantityColumn>,
}

/// A feed record that could not be turned into a `RawFactRow`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreadableFact {
    /// 1-based line in the feed, when the feed has lines.
    pub line: Option<u64>,
    pub reason: RejectReason,
    pub error: String,
    pub fields: Vec<String>,
}

/// Everything one fetch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactFeed {
    /// Rows inside the window.
    pub rows: Vec<RawFactRow>,
    /// Records with no usable period. They cannot be windowed, so every
    /// one of them is reported.
    pub unreadable: Vec<UnreadableFact>,
}

/// Which rows a run pulls: realized transactions from `start` through
/// `as_of`, plus open orders dated in the `as_of` month or later.
///
/// The ledger is monthly, so the window works at month granularity:
/// the day of `start`, of `as_of` and of a dated fact never matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FactWindow {
    pub start: NaiveDate,
    pub as_of: NaiveDate,
}

impl FactWindow {
    pub fn new(start: NaiveDate, as_of: NaiveDate) -> Self {
        Self { start, as_of }
    }

    pub fn includes(&self, row: &RawFactRow) -> bool {
        let period = (row.year, row.month);
        let start = (self.start.year(), self.start.month());
        let as_of = (self.as_of.year(), self.as_of.month());
        if row.open_order {
            period >= start && period >= as_of
        } else {
            period >= start && period <= as_of
        }
    }
}

pub trait FactSource {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Realized and open-order rows inside `window`, in one pass.
    ///
    /// Errors only when the feed as a whole cannot be read. A bad record
    /// lands in `FactFeed::unreadable` instead.
    fn fetch(&mut self, window: &FactWindow) -> PlanResult<FactFeed>;
}

/// A feed held in memory. Used by tests and by callers that already
/// queried the source system themselves.
#[derive(Debug, Clone, Default)]
pub struct VecFactSource {
    rows: Vec<RawFactRow>,
}

impl VecFactSource {
    pub fn new(rows: Vec<RawFactRow>) -> Self {
        Self { rows }
    }
}

impl FactSource for VecFactSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&mut self, window: &FactWindow) -> PlanResult<FactFeed> {
        Ok(FactFeed {
            rows: self
                .rows
                .iter()
                .filter(|row| window.includes(row))
                .cloned()
                .collect(),
            unreadable: Vec::new(),
        })
    }
}

/// One CSV line, every cell still text.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvFactRecord {
    client_group: String,
    profit_center: String,
    product_group: String,
    date: String,
    year: String,
    month: String,
    uom_quantity: String,
    cubic_quantity: String,
    open_order: String,
}

impl CsvFactRecord {
    /// Year and month of the fact: from `date` (YYYY-MM-DD) when the
    /// cell is filled, otherwise from the `year` and `month` columns.
    fn period(&self) -> PlanResult<(CalendarYear, CalendarMonth)> {
        let date = self.date.trim();
        if !date.is_empty() {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("date {date:?}: {e}"))?;
            return Ok((parsed.year(), parsed.month()));
        }
        let year = self
            .year
            .trim()
            .parse::<CalendarYear>()
            .map_err(|e| anyhow::anyhow!("year {:?}: {e}", self.year))?;
        let month = self
            .month
            .trim()
            .parse::<CalendarMonth>()
            .map_err(|e| anyhow::anyhow!("month {:?}: {e}", self.month))?;
        Ok((year, month))
    }

    fn open_order(&self) -> PlanResult<bool> {
        match self.open_order.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "n" | "no" => Ok(false),
            "true" | "1" | "y" | "yes" => Ok(true),
            other => Err(anyhow::anyhow!("open_order {other:?} is not a flag").into()),
        }
    }

    fn into_row(self) -> Result<RawFactRow, (RejectReason, PlanError)> {
        let (year, month) = self.period().map_err(|e| (RejectReason::InvalidDate, e))?;
        let open_order = self
            .open_order()
            .map_err(|e| (RejectReason::UnreadableRecord, e))?;

        let mut unreadable_quantities = Vec::new();
        let mut quantity = |cell: &str, column| match cell.trim() {
            "" => None,
            text => match text.parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    unreadable_quantities.push(column);
                    None
                }
            },
        };
        let uom_quantity = quantity(&self.uom_quantity, QuantityColumn::Uom);
        let cubic_quantity = quantity(&self.cubic_quantity, QuantityColumn::Cubic);

        Ok(RawFactRow {
            client_group: self.client_group,
            profit_center: self.profit_center,
            product_group: self.product_group,
            year,
            month,
            uom_quantity,
            cubic_quantity,
            open_order,
            unreadable_quantities,
        })
    }
}

/// A CSV export of the source feed, one fact per line, with a header
/// naming the columns. The period comes from a `date` column
/// (YYYY-MM-DD) or from `year` and `month` columns. Empty quantity
/// cells read as absent.
#[derive(Debug, Clone)]
pub struct CsvFactSource {
    path: PathBuf,
    label: String,
}

impl CsvFactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

impl FactSource for CsvFactSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch(&mut self, window: &FactWindow) -> PlanResult<FactFeed> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut feed = FactFeed::default();

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    feed.unreadable.push(UnreadableFact {
                        line: e.position().map(|p| p.line()),
                        reason: RejectReason::UnreadableRecord,
                        error: e.to_string(),
                        fields: Vec::new(),
                    });
                    continue;
                }
            };
            let line = record.position().map(|p| p.line());
            let fields: Vec<String> = record.iter().map(str::to_string).collect();

            let parsed = record
                .deserialize::<CsvFactRecord>(Some(&headers))
                .map_err(|e| (RejectReason::UnreadableRecord, PlanError::from(e)))
                .and_then(CsvFactRecord::into_row);
            match parsed {
                Ok(row) => {
                    if window.includes(&row) {
                        feed.rows.push(row);
                    }
                }
                Err((reason, error)) => {
                    log::debug!("{}: line {line:?} unreadable: {error}", self.label);
                    feed.unreadable.push(UnreadableFact {
                        line,
                        reason,
                        error: error.to_string(),
                        fields,
                    });
                }
            }
        }
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(year: &str, month: &str, uom: &str) -> CsvFactRecord {
        CsvFactRecord {
            client_group: "AC001".into(),
            profit_center: "130".into(),
            year: year.into(),
            month: month.into(),
            uom_quantity: uom.into(),
            ..CsvFactRecord::default()
        }
    }

    #[test]
    fn date_column_wins_over_year_and_month() {
        let mut dated = record("", "", "4");
        dated.date = "2026-05-31".into();
        let row = dated.into_row().unwrap();
        assert_eq!((row.year, row.month), (2026, 5));
    }

    #[test]
    fn unparseable_period_cells_reject_the_record() {
        for (year, month) in [("2026", ""), ("2026", "-1"), ("20x6", "5")] {
            let err = record(year, month, "1").into_row().unwrap_err();
            assert_eq!(err.0, RejectReason::InvalidDate, "{year}-{month}");
        }
        let mut bad_date = record("2026", "5", "1");
        bad_date.date = "2026-02-30".into();
        assert_eq!(bad_date.into_row().unwrap_err().0, RejectReason::InvalidDate);
    }

    #[test]
    fn unparseable_quantity_is_kept_as_a_marker() {
        let row = record("2026", "5", "n/a").into_row().unwrap();
        assert_eq!(row.uom_quantity, None);
        assert_eq!(row.unreadable_quantities, vec![QuantityColumn::Uom]);

        let blank = record("2026", "5", " ").into_row().unwrap();
        assert!(blank.unreadable_quantities.is_empty());
    }

    #[test]
    fn window_ignores_the_day() {
        let window = FactWindow::new(
            NaiveDate::from_ymd_opt(2026, 5, 31).unwrap(),
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        );
        let mut row = record("2026", "5", "1").into_row().unwrap();
        assert!(window.includes(&row));
        row.month = 7;
        assert!(window.includes(&row));
        row.month = 8;
        assert!(!window.includes(&row));
    }
}
