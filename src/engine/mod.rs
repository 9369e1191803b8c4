mod conflict;
mod error;
mod locks;
mod mutations;
mod pricing;
mod queries;
mod store;

pub use error::EngineError;
pub use locks::{LockLease, ResourceLockManager};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use ulid::Ulid;

use crate::directory::ResourceDirectory;
use crate::ledger::Ledger;
use crate::model::*;
use crate::notify::{Notice, NoticeKind, Notifier};

use store::ReservationStore;

// ── Group-commit ledger channel ──────────────────────────

pub(super) enum LedgerCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the ledger and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn ledger_writer_loop(mut ledger: Ledger, mut rx: mpsc::Receiver<LedgerCommand>) {
    // Every event flushed since the last compaction. A compaction snapshot is
    // collected from the store on the caller's task and can miss rows acked
    // after its scan; re-appending the tail behind the snapshot restores them.
    // Cleared on compaction, so it holds at most one threshold's worth.
    let mut flushed_tail: Vec<Event> = Vec::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            LedgerCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(LedgerCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut ledger, &mut batch, &mut flushed_tail);
                            handle_non_append(&mut ledger, other, &mut flushed_tail);
                            break;
                        }
                        Err(_) => break, // channel empty, flush the batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut ledger, &mut batch, &mut flushed_tail);
                }
            }
            other => handle_non_append(&mut ledger, other, &mut flushed_tail),
        }
    }
}

fn flush_and_respond(
    ledger: &mut Ledger,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    flushed_tail: &mut Vec<Event>,
) {
    metrics::histogram!(crate::observability::LEDGER_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(ledger, batch);
    metrics::histogram!(crate::observability::LEDGER_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (event, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => {
                // Only acked events enter the tail; a failed batch must not
                // resurface through a later compaction.
                flushed_tail.push(event);
                Ok(())
            }
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    ledger: &mut Ledger,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = ledger.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = ledger.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(ledger: &mut Ledger, cmd: LedgerCommand, flushed_tail: &mut Vec<Event>) {
    match cmd {
        LedgerCommand::Compact { events, response } => {
            // Snapshot first, then the tail in append order. Replay is
            // idempotent for rows present in both, and the tail carries any
            // row the snapshot scan missed.
            let mut frames = events;
            frames.extend(flushed_tail.iter().cloned());
            let result = Ledger::write_compact_file(ledger.path(), &frames)
                .and_then(|()| ledger.swap_compact_file());
            if result.is_ok() {
                flushed_tail.clear();
            }
            let _ = response.send(result);
        }
        LedgerCommand::AppendsSinceCompact { response } => {
            let _ = response.send(ledger.appends_since_compact());
        }
        LedgerCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub(super) store: ReservationStore,
    pub(super) directory: Arc<ResourceDirectory>,
    pub(super) locks: ResourceLockManager,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) ledger_tx: mpsc::Sender<LedgerCommand>,
}

impl Engine {
    /// Recover the store from the ledger and start the group-commit writer.
    /// Must run inside a tokio runtime.
    pub fn new(
        ledger_path: PathBuf,
        directory: Arc<ResourceDirectory>,
        notifier: Arc<dyn Notifier>,
        acquire_timeout: Duration,
        hold_timeout: Duration,
    ) -> io::Result<Self> {
        let events = Ledger::recover(&ledger_path)?;
        let ledger = Ledger::open(&ledger_path)?;
        let (ledger_tx, ledger_rx) = mpsc::channel(4096);
        tokio::spawn(ledger_writer_loop(ledger, ledger_rx));

        let engine = Self {
            store: ReservationStore::new(),
            directory,
            locks: ResourceLockManager::new(acquire_timeout, hold_timeout),
            notifier,
            ledger_tx,
        };
        for event in &events {
            engine.store.apply(event);
        }
        if !engine.store.is_empty() {
            tracing::info!("recovered {} reservation(s) from the ledger", engine.store.len());
        }

        Ok(engine)
    }

    /// Write an event to the ledger via the background group-commit writer.
    async fn ledger_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.ledger_tx
            .send(LedgerCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Ledger("ledger writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Ledger("ledger writer dropped response".into()))?
            .map_err(|e| EngineError::Ledger(e.to_string()))
    }

    /// Deliver one notice. Best-effort: failures are logged, never surfaced.
    pub(super) async fn send_notice(
        &self,
        user_id: Ulid,
        kind: NoticeKind,
        reservation: &Reservation,
    ) {
        let notice = Notice {
            user_id,
            kind,
            reservation: reservation.clone(),
        };
        if let Err(e) = self.notifier.send(notice).await {
            metrics::counter!(crate::observability::NOTICES_FAILED_TOTAL).increment(1);
            tracing::warn!("notice delivery to {user_id} failed: {e}");
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.store.len()
    }
}
