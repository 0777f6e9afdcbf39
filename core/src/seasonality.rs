//! Seasonality curves: twelve monthly percentages per profit center and
//! planning period.
//!
//! A planning period runs April..March, so its curve is expected to sum
//! to ~100 across that layout. Values are stored per calendar month.

use crate::{
    error::{PlanError, PlanResult},
    numeric::decimal_from_f64,
    types::{CalendarMonth, PlanningPeriod},
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Calendar months in planning-period order: April first, March last.
pub const PLANNING_ORDER: [CalendarMonth; 12] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3];

/// Accepts full English month names or their three-letter abbreviations,
/// case-insensitive.
pub fn month_from_name(name: &str) -> PlanResult<CalendarMonth> {
    let needle = name.trim().to_ascii_lowercase();
    MONTH_NAMES
        .iter()
        .position(|full| *full == needle || (needle.len() == 3 && full.starts_with(&needle)))
        .map(|i| i as CalendarMonth + 1)
        .ok_or_else(|| PlanError::UnknownMonthName(name.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalityCurve {
    pub profit_center: String,
    pub planning_period: PlanningPeriod,
    /// Indexed by calendar month - 1.
    percentages: [Decimal; 12],
}

impl SeasonalityCurve {
    pub fn new(
        profit_center: impl Into<String>,
        planning_period: PlanningPeriod,
        percentages: [Decimal; 12],
    ) -> Self {
        Self {
            profit_center: profit_center.into(),
            planning_period,
            percentages,
        }
    }

    /// Build from a month-name keyed map. Every month must be present.
    pub fn from_named(
        profit_center: &str,
        planning_period: PlanningPeriod,
        named: &BTreeMap<String, f64>,
    ) -> PlanResult<Self> {
        let mut slots: [Option<Decimal>; 12] = [None; 12];
        for (name, value) in named {
            let month = month_from_name(name)?;
            slots[(month - 1) as usize] = Some(decimal_from_f64(*value)?);
        }
        let mut percentages = [Decimal::ZERO; 12];
        for (i, slot) in slots.iter().enumerate() {
            percentages[i] = slot.ok_or_else(|| PlanError::IncompleteCurve {
                profit_center: profit_center.to_string(),
                planning_period,
                month: MONTH_NAMES[i],
            })?;
        }
        Ok(Self::new(profit_center, planning_period, percentages))
    }

    /// Percentage for a calendar month. Months outside 1..=12 have no share.
    pub fn percentage(&self, month: CalendarMonth) -> Decimal {
        match month {
            1..=12 => self.percentages[(month - 1) as usize],
            _ => Decimal::ZERO,
        }
    }

    /// Sum of the percentages of the given calendar months. An empty
    /// range sums to zero. Saturates rather than overflowing.
    pub fn cumulative(&self, months: RangeInclusive<CalendarMonth>) -> Decimal {
        months.fold(Decimal::ZERO, |acc, m| acc.saturating_add(self.percentage(m)))
    }

    pub fn total(&self) -> Decimal {
        self.percentages
            .iter()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(*p))
    }

    pub fn percentages(&self) -> &[Decimal; 12] {
        &self.percentages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn named(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn month_names_resolve_both_forms() {
        assert_eq!(month_from_name("April").unwrap(), 4);
        assert_eq!(month_from_name("apr").unwrap(), 4);
        assert_eq!(month_from_name(" DECEMBER ").unwrap(), 12);
        assert!(month_from_name("ma").is_err());
        assert!(month_from_name("smarch").is_err());
    }

    #[test]
    fn planning_order_starts_in_april() {
        assert_eq!(PLANNING_ORDER[0], 4);
        assert_eq!(PLANNING_ORDER[11], 3);
        let mut sorted = PLANNING_ORDER;
        sorted.sort_unstable();
        assert_eq!(sorted, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn curve_from_names_requires_every_month() {
        let mut values: Vec<(&str, f64)> = MONTH_NAMES.iter().map(|m| (*m, 8.0)).collect();
        values[3].1 = 12.0; // april
        let curve = SeasonalityCurve::from_named("130", 2027, &named(&values)).unwrap();
        assert_eq!(curve.percentage(4), dec!(12));
        assert_eq!(curve.total(), dec!(100));
        assert_eq!(curve.cumulative(1..=3), dec!(24));
        assert_eq!(curve.cumulative(4..=3), Decimal::ZERO);

        values.pop();
        let err = SeasonalityCurve::from_named("130", 2027, &named(&values)).unwrap_err();
        assert!(matches!(err, PlanError::IncompleteCurve { month: "december", .. }));
    }
}
