use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use ulid::Ulid;

use super::EngineError;

/// Proof of a live lock hold. Carries the hold deadline so a long critical
/// section can confirm it still owns its slot before committing.
pub struct LockLease {
    resource_id: Ulid,
    deadline: Instant,
}

impl LockLease {
    /// Fails once the hold deadline has passed. Call immediately before any
    /// irreversible step; a section that overran between awaits must not
    /// commit.
    pub fn ensure_live(&self) -> Result<(), EngineError> {
        if Instant::now() >= self.deadline {
            return Err(EngineError::LockExpired(self.resource_id));
        }
        Ok(())
    }
}

/// Mutual exclusion keyed by resource id. Slots for distinct resources are
/// independent, so bookings on different resources never wait on each other.
/// Slots are created on demand and never reclaimed; the set is bounded by the
/// catalog.
pub struct ResourceLockManager {
    slots: DashMap<Ulid, Arc<Mutex<()>>>,
    acquire_timeout: Duration,
    hold_timeout: Duration,
}

impl ResourceLockManager {
    pub fn new(acquire_timeout: Duration, hold_timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            acquire_timeout,
            hold_timeout,
        }
    }

    /// Run `section` under the resource's exclusive lock.
    ///
    /// Waits up to the acquire timeout for the slot; expiry fails with
    /// `LockTimeout` (transient, safe to retry unchanged). The section then
    /// runs under the hold timeout; overrunning it drops the section's future,
    /// which releases the lock, and fails with `LockExpired`, so no work
    /// proceeds past an expired lock.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource_id: Ulid,
        section: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(LockLease) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let slot = self.slots.entry(resource_id).or_default().value().clone();

        let wait_start = Instant::now();
        let guard = match tokio::time::timeout(self.acquire_timeout, slot.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                return Err(EngineError::LockTimeout(resource_id));
            }
        };
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());

        let deadline = Instant::now() + self.hold_timeout;
        let lease = LockLease {
            resource_id,
            deadline,
        };
        let result = tokio::time::timeout_at(deadline, section(lease)).await;
        drop(guard);

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_EXPIRATIONS_TOTAL).increment(1);
                tracing::warn!("lock on {resource_id} expired, section abandoned");
                Err(EngineError::LockExpired(resource_id))
            }
        }
    }
}
