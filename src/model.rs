use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Inclusive calendar-day range `[start, end]`. No time-of-day anywhere in the
/// model; a booking owns whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    /// Number of days covered, both endpoints counted. `[d, d]` is 1 day.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Two inclusive ranges overlap iff each starts no later than the other
    /// ends. Ranges sharing a single day overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Catalog approval state. Only approved resources accept bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

/// A bookable listing. Owned by the directory, read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub owner_id: Ulid,
    /// Smallest currency unit per day.
    pub daily_price: i64,
    /// Percent off when a stay reaches the monthly threshold (0–90).
    pub monthly_discount: u8,
    pub hidden: bool,
    pub approval: ApprovalState,
}

impl Resource {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.daily_price < 0 {
            return Err("daily_price must not be negative");
        }
        if self.daily_price > crate::limits::MAX_DAILY_PRICE {
            return Err("daily_price out of range");
        }
        if self.monthly_discount > crate::limits::MAX_DISCOUNT_PERCENT {
            return Err("monthly_discount out of range");
        }
        Ok(())
    }

    /// Visible to visitors and open for booking.
    pub fn bookable(&self) -> bool {
        !self.hidden && self.approval == ApprovalState::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

/// One booked date range on one resource. Rows are never deleted; cancellation
/// flips status and keeps the row for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub requester_id: Ulid,
    pub range: DateRange,
    pub status: ReservationStatus,
    /// Total price in the smallest currency unit, fixed at booking time.
    pub price: i64,
    /// Shared secret for the booking period, generated at creation.
    pub access_token: String,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// The event types, flat with no nesting. This is the ledger record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Booked { reservation: Reservation },
    Cancelled { reservation_id: Ulid },
}

// ── Query types ──────────────────────────────────────────────────

/// Filter for reservation listing. All fields conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub requester_id: Option<Ulid>,
    /// Host view: reservations on any resource owned by this user.
    pub owner_id: Option<Ulid>,
    pub resource_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    /// Overlap semantics, same inclusive rule as the conflict check.
    pub window: Option<DateRange>,
    pub limit: Option<usize>,
}
