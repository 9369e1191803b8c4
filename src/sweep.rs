use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::engine::Engine;

/// Wake-up period for the reminder sweep. Sends are additionally gated to
/// once per calendar day.
const REMINDER_PERIOD: Duration = Duration::from_secs(300);

const COMPACT_PERIOD: Duration = Duration::from_secs(60);

/// Background task that notifies both sides of every reservation whose stay
/// starts today.
pub async fn run_reminders(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(REMINDER_PERIOD);
    let mut last_run: Option<NaiveDate> = None;
    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        if last_run == Some(today) {
            continue;
        }
        last_run = Some(today);
        let sent = engine.send_start_reminders(today).await;
        if sent > 0 {
            info!("sent start-day reminders for {sent} reservation(s)");
        }
    }
}

/// Background task that rewrites the ledger once enough appends have piled
/// up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_PERIOD);
    loop {
        interval.tick().await;
        let appends = engine.ledger_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_ledger().await {
            Ok(()) => info!("compacted ledger after {appends} append(s)"),
            Err(e) => warn!("ledger compaction failed: {e}"),
        }
    }
}
