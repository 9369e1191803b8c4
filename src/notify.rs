use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Reservation;

const CHANNEL_CAPACITY: usize = 256;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// To the requester: their booking is confirmed.
    ReservationPlaced,
    /// To the owner: their resource was booked.
    ReservationReceived,
    /// To the owner: a booking on their resource was cancelled.
    ReservationCancelled,
    /// To the requester: the stay starts today.
    StartingSoon,
    /// To the owner: a guest arrives today.
    ArrivingSoon,
}

/// One notification to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub user_id: Ulid,
    pub kind: NoticeKind,
    pub reservation: Reservation,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notify error: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification capability. Delivery is best-effort: the engine logs
/// failures and never lets them change an operation's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: Notice) -> Result<(), NotifyError>;
}

/// In-process hub: one broadcast channel per user.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's notices. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Remove a user's channel (e.g. when their session ends).
    pub fn remove(&self, user_id: &Ulid) {
        self.channels.remove(user_id);
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    /// No-op if nobody is listening.
    async fn send(&self, notice: Notice) -> Result<(), NotifyError> {
        if let Some(sender) = self.channels.get(&notice.user_id) {
            let _ = sender.send(notice);
        }
        Ok(())
    }
}
