use chrono::{NaiveDate, Utc};

use crate::limits::MAX_STAY_DAYS;
use crate::model::DateRange;

use super::store::ReservationStore;
use super::EngineError;
use ulid::Ulid;

/// Cancellations need more than this many whole days of lead time.
pub(crate) const CANCEL_CUTOFF_DAYS: i64 = 1;

/// Current calendar day in UTC. The engine's only clock read.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Validate booking dates and build the range: strictly forward, strictly in
/// the future, within the stay cap. The minimum accepted booking is the 2-day
/// span `start + 1 = end`.
pub(crate) fn validate_booking_dates(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<DateRange, EngineError> {
    if start >= end {
        return Err(EngineError::Validation {
            field: "end_date",
            message: "end date must be after start date",
        });
    }
    if start <= today {
        return Err(EngineError::Validation {
            field: "start_date",
            message: "start date must be after today",
        });
    }
    let range = DateRange::new(start, end);
    if range.days() > MAX_STAY_DAYS {
        return Err(EngineError::Validation {
            field: "end_date",
            message: "stay too long",
        });
    }
    Ok(range)
}

/// Whole days between `today` and `start`. Non-positive once the stay has
/// begun.
pub(crate) fn days_until(today: NaiveDate, start: NaiveDate) -> i64 {
    (start - today).num_days()
}

/// Reject a range that overlaps any active reservation on the resource.
/// Only authoritative inside the resource's critical section; outside it the
/// answer is stale by the time it is read.
pub(crate) fn check_no_conflict(
    store: &ReservationStore,
    resource_id: &Ulid,
    range: &DateRange,
) -> Result<(), EngineError> {
    match store.first_active_conflict(resource_id, range) {
        Some(blocking) => Err(EngineError::Overlap(blocking)),
        None => Ok(()),
    }
}
