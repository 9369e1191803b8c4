use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or out-of-range request. `field` names the offending input.
    Validation {
        field: &'static str,
        message: &'static str,
    },
    NotFound(Ulid),
    /// Requester owns the resource they tried to book.
    Ownership(Ulid),
    /// Resource is hidden or not approved.
    Visibility(Ulid),
    /// Date conflict with an existing active reservation.
    Overlap(Ulid),
    /// Resource lock not acquired in time. Transient; safe to retry unchanged.
    LockTimeout(Ulid),
    /// The critical section outlived the hold timeout and was abandoned.
    LockExpired(Ulid),
    /// Too close to the start date to cancel.
    CutoffWindow { days_left: i64 },
    AlreadyCancelled(Ulid),
    /// Caller is not the reservation's requester.
    Forbidden(Ulid),
    Ledger(String),
}

impl EngineError {
    /// True for transient failures the caller may retry unchanged.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout(_) | EngineError::LockExpired(_) | EngineError::Ledger(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation { field, message } => {
                write!(f, "invalid {field}: {message}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Ownership(id) => write!(f, "cannot book own resource: {id}"),
            EngineError::Visibility(id) => write!(f, "resource not open for booking: {id}"),
            EngineError::Overlap(id) => write!(f, "dates overlap reservation: {id}"),
            EngineError::LockTimeout(id) => {
                write!(f, "timed out waiting for resource lock: {id}")
            }
            EngineError::LockExpired(id) => {
                write!(f, "resource lock expired mid-operation: {id}")
            }
            EngineError::CutoffWindow { days_left } => {
                write!(f, "too close to start to cancel: {days_left} day(s) left")
            }
            EngineError::AlreadyCancelled(id) => write!(f, "already cancelled: {id}"),
            EngineError::Forbidden(id) => write!(f, "not the requester of reservation: {id}"),
            EngineError::Ledger(e) => write!(f, "ledger error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
