//! Key normalization for raw fact rows.
//!
//! Turns a raw row into (client group, profit center, year, month,
//! quantity) or a rejection reason. CPC resolution is left to the
//! caller, which owns the index.

use crate::{
    config::SalesConfig,
    numeric::decimal_from_f64,
    source::{QuantityColumn, RawFactRow},
    types::{CalendarMonth, CalendarYear},
};
use rust_decimal::Decimal;
use serde::Serialize;

pub const CLIENT_GROUP_LEN: usize = 5;
pub const PROFIT_CENTER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    ClientGroupShape,
    ProfitCenterShape,
    MonthOutOfRange,
    MissingQuantity,
    NonFiniteQuantity,
    /// The quantity cell is not a number.
    InvalidQuantity,
    /// The quantity, or the running total it feeds, does not fit a decimal.
    QuantityOutOfRange,
    /// No usable date, year or month cell.
    InvalidDate,
    /// The feed could not decode the record at all.
    UnreadableRecord,
    UnknownCpc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFact {
    pub client_group: String,
    pub profit_center: String,
    pub year: CalendarYear,
    pub month: CalendarMonth,
    pub quantity: Decimal,
}

pub struct KeyNormalizer<'a> {
    config: &'a SalesConfig,
}

impl<'a> KeyNormalizer<'a> {
    pub fn new(config: &'a SalesConfig) -> Self {
        Self { config }
    }

    /// Three-character profit center for a raw code, after the
    /// reclassification and merge rules.
    pub fn profit_center(&self, raw_code: &str, product_group: &str) -> String {
        let trimmed = raw_code.trim();
        let code: String = trimmed.chars().take(PROFIT_CENTER_LEN).collect();
        let product_group = product_group.trim();

        if let Some(rule) = self.config.reclassifications.iter().find(|r| {
            r.profit_center == code && r.product_groups.iter().any(|g| g == product_group)
        }) {
            return rule.target.clone();
        }
        if let Some(rule) = self
            .config
            .merges
            .iter()
            .find(|r| r.profit_centers.iter().any(|pc| *pc == code))
        {
            return rule.target.clone();
        }
        code
    }

    pub fn measures_cubic_meters(&self, profit_center: &str) -> bool {
        self.config
            .cubic_meter_profit_centers
            .iter()
            .any(|pc| pc == profit_center)
    }

    pub fn normalize(&self, row: &RawFactRow) -> Result<NormalizedFact, RejectReason> {
        let client_group = row.client_group.trim();
        if client_group.is_empty() || client_group.chars().count() != CLIENT_GROUP_LEN {
            return Err(RejectReason::ClientGroupShape);
        }

        let profit_center = self.profit_center(&row.profit_center, &row.product_group);
        if profit_center.chars().count() != PROFIT_CENTER_LEN {
            return Err(RejectReason::ProfitCenterShape);
        }

        if !(1..=12).contains(&row.month) {
            return Err(RejectReason::MonthOutOfRange);
        }

        let (column, raw_quantity) = if self.measures_cubic_meters(&profit_center) {
            (QuantityColumn::Cubic, row.cubic_quantity)
        } else {
            (QuantityColumn::Uom, row.uom_quantity)
        };
        if row.unreadable_quantities.contains(&column) {
            return Err(RejectReason::InvalidQuantity);
        }
        let quantity = match raw_quantity {
            None => return Err(RejectReason::MissingQuantity),
            Some(q) => decimal_from_f64(q).map_err(|e| {
                if e.is_out_of_range() {
                    RejectReason::QuantityOutOfRange
                } else {
                    RejectReason::NonFiniteQuantity
                }
            })?,
        };

        Ok(NormalizedFact {
            client_group: client_group.to_string(),
            profit_center,
            year: row.year,
            month: row.month,
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(client_group: &str, profit_center: &str, product_group: &str) -> RawFactRow {
        RawFactRow {
            client_group: client_group.into(),
            profit_center: profit_center.into(),
            product_group: product_group.into(),
            year: 2025,
            month: 5,
            uom_quantity: Some(12.5),
            cubic_quantity: Some(3.25),
            open_order: false,
            unreadable_quantities: Vec::new(),
        }
    }

    #[test]
    fn profit_center_rules_apply() {
        let config = SalesConfig::default();
        let keys = KeyNormalizer::new(&config);
        assert_eq!(keys.profit_center("1901", "P130"), "130");
        assert_eq!(keys.profit_center("190", "P160"), "160");
        assert_eq!(keys.profit_center("190", "OTHER"), "190");
        assert_eq!(keys.profit_center("172", ""), "170");
        assert_eq!(keys.profit_center(" 170 ", ""), "170");
        assert_eq!(keys.profit_center("14", ""), "14");
    }

    #[test]
    fn quantity_follows_profit_center_category() {
        let config = SalesConfig::default();
        let keys = KeyNormalizer::new(&config);
        let cubic = keys.normalize(&row("AB123", "110", "")).unwrap();
        assert_eq!(cubic.quantity, dec!(3.25));
        let units = keys.normalize(&row("AB123", "140", "")).unwrap();
        assert_eq!(units.quantity, dec!(12.5));
    }

    #[test]
    fn shape_violations_are_rejected() {
        let config = SalesConfig::default();
        let keys = KeyNormalizer::new(&config);
        assert_eq!(keys.normalize(&row("AB12", "140", "")), Err(RejectReason::ClientGroupShape));
        assert_eq!(keys.normalize(&row("   ", "140", "")), Err(RejectReason::ClientGroupShape));
        assert_eq!(keys.normalize(&row("AB123", "14", "")), Err(RejectReason::ProfitCenterShape));

        let mut bad_month = row("AB123", "140", "");
        bad_month.month = 13;
        assert_eq!(keys.normalize(&bad_month), Err(RejectReason::MonthOutOfRange));

        let mut nan = row("AB123", "140", "");
        nan.uom_quantity = Some(f64::NAN);
        assert_eq!(keys.normalize(&nan), Err(RejectReason::NonFiniteQuantity));

        let mut missing = row("AB123", "140", "");
        missing.uom_quantity = None;
        assert_eq!(keys.normalize(&missing), Err(RejectReason::MissingQuantity));

        let mut huge = row("AB123", "140", "");
        huge.uom_quantity = Some(1e30);
        assert_eq!(keys.normalize(&huge), Err(RejectReason::QuantityOutOfRange));
    }

    #[test]
    fn only_the_measured_column_must_be_readable() {
        let config = SalesConfig::default();
        let keys = KeyNormalizer::new(&config);

        let mut garbled_cubic = row("AB123", "140", "");
        garbled_cubic.cubic_quantity = None;
        garbled_cubic.unreadable_quantities = vec![QuantityColumn::Cubic];
        assert_eq!(keys.normalize(&garbled_cubic).unwrap().quantity, dec!(12.5));

        let mut garbled_uom = row("AB123", "140", "");
        garbled_uom.uom_quantity = None;
        garbled_uom.unreadable_quantities = vec![QuantityColumn::Uom];
        assert_eq!(keys.normalize(&garbled_uom), Err(RejectReason::InvalidQuantity));
    }
}
