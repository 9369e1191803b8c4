use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// All reservation rows, held per resource and sorted by start date. The only
/// mutable shared state in the engine; every write goes through booking or
/// cancellation, and rows are never removed.
pub struct ReservationStore {
    /// Per-resource rows sorted by `range.start`.
    calendars: DashMap<Ulid, Vec<Reservation>>,
    /// Reverse lookup: reservation id → resource id.
    reservation_to_resource: DashMap<Ulid, Ulid>,
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            reservation_to_resource: DashMap::new(),
        }
    }

    /// Insert a row, keeping the resource's calendar sorted by start date.
    /// An existing row with the same id is replaced; ledger replay can
    /// deliver a snapshot of the same reservation more than once.
    pub fn upsert(&self, reservation: Reservation) {
        self.reservation_to_resource
            .insert(reservation.id, reservation.resource_id);
        let mut calendar = self
            .calendars
            .entry(reservation.resource_id)
            .or_default();
        if let Some(pos) = calendar.iter().position(|r| r.id == reservation.id) {
            calendar.remove(pos);
        }
        let pos = calendar
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        calendar.insert(pos, reservation);
    }

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        let resource_id = self.reservation_to_resource.get(id).map(|e| *e.value())?;
        let calendar = self.calendars.get(&resource_id)?;
        calendar.iter().find(|r| r.id == *id).cloned()
    }

    /// First active row whose range overlaps `range`, if any. Calendar order
    /// lets the scan skip every row starting after `range.end`.
    pub fn first_active_conflict(&self, resource_id: &Ulid, range: &DateRange) -> Option<Ulid> {
        let entry = self.calendars.get(resource_id)?;
        let calendar = entry.value();
        // Everything at index >= right_bound starts after range.end → can't overlap.
        let right_bound = calendar.partition_point(|r| r.range.start <= range.end);
        calendar[..right_bound]
            .iter()
            .find(|r| r.is_active() && r.range.end >= range.start)
            .map(|r| r.id)
    }

    /// Flip an active row to Cancelled. Returns `None` when the row is
    /// missing or already cancelled; the flip happens under the calendar's
    /// entry guard, so exactly one of two racing cancels wins.
    pub fn mark_cancelled(&self, id: &Ulid) -> Option<Reservation> {
        let resource_id = self.reservation_to_resource.get(id).map(|e| *e.value())?;
        let mut calendar = self.calendars.get_mut(&resource_id)?;
        let row = calendar.iter_mut().find(|r| r.id == *id)?;
        if !row.is_active() {
            return None;
        }
        row.status = ReservationStatus::Cancelled;
        Some(row.clone())
    }

    /// Rows matching `pred`, up to `limit`, optionally narrowed to one
    /// resource. Within a resource the scan runs in start-date order.
    pub fn collect(
        &self,
        resource_id: Option<Ulid>,
        limit: usize,
        mut pred: impl FnMut(&Reservation) -> bool,
    ) -> Vec<Reservation> {
        let mut out = Vec::new();
        match resource_id {
            Some(rid) => {
                if let Some(calendar) = self.calendars.get(&rid) {
                    for r in calendar.iter() {
                        if out.len() >= limit {
                            break;
                        }
                        if pred(r) {
                            out.push(r.clone());
                        }
                    }
                }
            }
            None => {
                for entry in self.calendars.iter() {
                    for r in entry.value().iter() {
                        if out.len() >= limit {
                            return out;
                        }
                        if pred(r) {
                            out.push(r.clone());
                        }
                    }
                }
            }
        }
        out
    }

    /// Any active row on the candidate's resource, other than the candidate
    /// itself, sharing a day with it.
    fn conflicts_with_other(&self, candidate: &Reservation) -> bool {
        self.calendars
            .get(&candidate.resource_id)
            .is_some_and(|calendar| {
                calendar.iter().any(|r| {
                    r.id != candidate.id && r.is_active() && r.range.overlaps(&candidate.range)
                })
            })
    }

    /// Apply one ledger event. Used for replay and by the write paths.
    ///
    /// A booking abandoned at its hold deadline can leave a durable `Booked`
    /// frame behind without ever reaching the store, and the freed dates may
    /// then be booked again. Replaying both frames would rebuild two
    /// overlapping active rows, so the later one is dropped here instead.
    pub fn apply(&self, event: &Event) {
        match event {
            Event::Booked { reservation } => {
                if reservation.is_active() && self.conflicts_with_other(reservation) {
                    tracing::warn!(
                        "dropping replayed booking {} on {}: dates overlap an active row",
                        reservation.id,
                        reservation.resource_id
                    );
                    return;
                }
                self.upsert(reservation.clone());
            }
            Event::Cancelled { reservation_id } => {
                // Replay may carry a duplicate cancel; losing the flip is fine.
                let _ = self.mark_cancelled(reservation_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.reservation_to_resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservation_to_resource.is_empty()
    }
}
