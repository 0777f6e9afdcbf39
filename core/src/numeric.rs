//! Decimal helpers. Volumes and percentages are carried as `Decimal`
//! in memory and as REAL columns at rest.

use crate::error::{PlanError, PlanResult};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Convert a stored or fed float into a decimal, dropping binary noise
/// (so `0.1_f64` becomes exactly `0.1`). Finite values beyond roughly
/// ±7.9e28 do not fit and are reported as out of range.
pub fn decimal_from_f64(value: f64) -> PlanResult<Decimal> {
    if !value.is_finite() {
        return Err(PlanError::NonFinite(value));
    }
    Decimal::from_f64(value).ok_or(PlanError::DecimalRange(value))
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to whole units. Saturates on values outside the i64 range.
pub fn round_to_units(value: Decimal) -> i64 {
    round_to(value, 0).to_i64().unwrap_or(if value.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// `percent` of `amount`, e.g. `percent_of(8, 11000) == Some(880)`.
/// `None` on overflow.
pub fn percent_of(percent: Decimal, amount: Decimal) -> Option<Decimal> {
    (percent / HUNDRED).checked_mul(amount)
}
