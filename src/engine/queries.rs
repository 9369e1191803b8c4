use ulid::Ulid;

use crate::limits::{MAX_LIST_LIMIT, MAX_QUERY_WINDOW_DAYS};
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        self.store.get(id).ok_or(EngineError::NotFound(*id))
    }

    /// Filtered reservation listing. Reads take no locks; the snapshot is
    /// whatever committed before the scan reached each row.
    pub fn list_reservations(&self, filter: &ListFilter) -> Result<Vec<Reservation>, EngineError> {
        if let Some(window) = &filter.window
            && window.days() > MAX_QUERY_WINDOW_DAYS {
                return Err(EngineError::Validation {
                    field: "to_date",
                    message: "query window too wide",
                });
            }
        let limit = filter.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT);
        // The host view resolves to the owner's resource ids up front.
        let owned = filter.owner_id.map(|o| self.directory.owned_by(&o));

        Ok(self.store.collect(filter.resource_id, limit, |r| {
            if let Some(requester) = filter.requester_id
                && r.requester_id != requester {
                    return false;
                }
            if let Some(ids) = &owned
                && !ids.contains(&r.resource_id) {
                    return false;
                }
            if let Some(status) = filter.status
                && r.status != status {
                    return false;
                }
            if let Some(window) = &filter.window
                && !r.range.overlaps(window) {
                    return false;
                }
            true
        }))
    }
}
