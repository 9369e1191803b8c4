use crate::model::DateRange;

/// Stays at least this long qualify for the monthly discount.
pub(crate) const MONTHLY_STAY_MIN_DAYS: i64 = 28;

/// Total price for a stay, in the smallest currency unit.
///
/// Inclusive day count times the daily rate. Stays of a month or longer get
/// the resource's discount subtracted once, floored by integer division;
/// everything stays in integers so repeated quoting never drifts.
pub(crate) fn quote(range: &DateRange, daily_rate: i64, discount_percent: u8) -> i64 {
    let days = range.days();
    let raw = days * daily_rate;
    if days >= MONTHLY_STAY_MIN_DAYS && discount_percent > 0 {
        raw - raw * i64::from(discount_percent) / 100
    } else {
        raw
    }
}
