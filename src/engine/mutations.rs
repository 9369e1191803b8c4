use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::ACCESS_TOKEN_LEN;
use crate::model::*;
use crate::notify::NoticeKind;

use super::conflict::{self, check_no_conflict, today};
use super::pricing;
use super::{Engine, EngineError, LedgerCommand};

/// Shared secret handed to the requester for the booking period.
fn generate_access_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_TOKEN_LEN)
        .map(char::from)
        .collect()
}

impl Engine {
    /// Book `resource_id` for the inclusive `[start, end]` days on behalf of
    /// `requester_id`.
    ///
    /// Date and catalog checks run up front; the overlap check, pricing, and
    /// commit run inside the resource's critical section so check-and-insert
    /// is atomic against every other booking attempt on the same resource.
    /// Notices go out after the lock is released.
    pub async fn book(
        &self,
        requester_id: Ulid,
        resource_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Reservation, EngineError> {
        let range = conflict::validate_booking_dates(start, end, today())?;
        let resource = self
            .directory
            .get(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        if resource.owner_id == requester_id {
            return Err(EngineError::Ownership(resource_id));
        }
        if !resource.bookable() {
            return Err(EngineError::Visibility(resource_id));
        }

        let owner_id = resource.owner_id;
        let daily_price = resource.daily_price;
        let discount = resource.monthly_discount;

        let reservation = self
            .locks
            .with_lock(resource_id, |lease| async move {
                check_no_conflict(&self.store, &resource_id, &range)?;
                let reservation = Reservation {
                    id: Ulid::new(),
                    resource_id,
                    requester_id,
                    range,
                    status: ReservationStatus::Active,
                    price: pricing::quote(&range, daily_price, discount),
                    access_token: generate_access_token(),
                };
                lease.ensure_live()?;
                self.ledger_append(&Event::Booked {
                    reservation: reservation.clone(),
                })
                .await?;
                // No awaits between the append ack and the insert: the row is
                // visible before the lock drops.
                self.store.upsert(reservation.clone());
                Ok(reservation)
            })
            .await?;

        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        tracing::debug!(
            "booked {} on {resource_id} for {}..={}",
            reservation.id,
            range.start,
            range.end
        );
        self.send_notice(requester_id, NoticeKind::ReservationPlaced, &reservation)
            .await;
        self.send_notice(owner_id, NoticeKind::ReservationReceived, &reservation)
            .await;
        Ok(reservation)
    }

    /// Cancel a reservation on behalf of its requester. Lock-free: flipping a
    /// row to Cancelled can only shrink the active set, so it never contends
    /// with the overlap invariant.
    pub async fn cancel(
        &self,
        requester_id: Ulid,
        reservation_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let current = self
            .store
            .get(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;
        if current.requester_id != requester_id {
            return Err(EngineError::Forbidden(reservation_id));
        }
        if !current.is_active() {
            return Err(EngineError::AlreadyCancelled(reservation_id));
        }
        let days_left = conflict::days_until(today(), current.range.start);
        if days_left <= conflict::CANCEL_CUTOFF_DAYS {
            return Err(EngineError::CutoffWindow { days_left });
        }

        self.ledger_append(&Event::Cancelled { reservation_id }).await?;
        // A concurrent cancel may have slipped in since the pre-check; the
        // store's flip is the tie-breaker, and a duplicate Cancelled event in
        // the ledger replays harmlessly.
        let updated = self
            .store
            .mark_cancelled(&reservation_id)
            .ok_or(EngineError::AlreadyCancelled(reservation_id))?;

        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        tracing::debug!("cancelled {reservation_id}, {days_left} day(s) before start");
        if let Some(resource) = self.directory.get(&updated.resource_id) {
            self.send_notice(resource.owner_id, NoticeKind::ReservationCancelled, &updated)
                .await;
        }
        Ok(updated)
    }

    /// One reminder pass for stays starting on `on`: the requester and the
    /// resource owner each get a notice per active reservation. Returns how
    /// many reservations were due.
    pub async fn send_start_reminders(&self, on: NaiveDate) -> usize {
        let due = self
            .store
            .collect(None, usize::MAX, |r| r.is_active() && r.range.start == on);
        for reservation in &due {
            self.send_notice(reservation.requester_id, NoticeKind::StartingSoon, reservation)
                .await;
            if let Some(resource) = self.directory.get(&reservation.resource_id) {
                self.send_notice(resource.owner_id, NoticeKind::ArrivingSoon, reservation)
                    .await;
            }
        }
        if !due.is_empty() {
            metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL)
                .increment(due.len() as u64);
        }
        due.len()
    }

    /// Rewrite the ledger as a snapshot of current rows. Cancelled rows carry
    /// their status inside the row, so one Booked frame per row restores
    /// everything on recovery.
    pub async fn compact_ledger(&self) -> Result<(), EngineError> {
        let events: Vec<Event> = self
            .store
            .collect(None, usize::MAX, |_| true)
            .into_iter()
            .map(|reservation| Event::Booked { reservation })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.ledger_tx
            .send(LedgerCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Ledger("ledger writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Ledger("ledger writer dropped response".into()))?
            .map_err(|e| EngineError::Ledger(e.to_string()))
    }

    pub async fn ledger_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .ledger_tx
            .send(LedgerCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
