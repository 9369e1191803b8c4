use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total wire requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "daybook_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "daybook_request_duration_seconds";

/// Counter: reservations created.
pub const BOOKINGS_TOTAL: &str = "daybook_bookings_total";

/// Counter: reservations cancelled.
pub const CANCELLATIONS_TOTAL: &str = "daybook_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "daybook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "daybook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "daybook_connections_rejected_total";

/// Histogram: time spent waiting for a resource lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "daybook_lock_wait_seconds";

/// Counter: lock acquisitions that timed out.
pub const LOCK_TIMEOUTS_TOTAL: &str = "daybook_lock_timeouts_total";

/// Counter: critical sections abandoned at the hold deadline.
pub const LOCK_EXPIRATIONS_TOTAL: &str = "daybook_lock_expirations_total";

/// Histogram: ledger group-commit flush duration in seconds.
pub const LEDGER_FLUSH_DURATION_SECONDS: &str = "daybook_ledger_flush_duration_seconds";

/// Histogram: ledger group-commit batch size (events per flush).
pub const LEDGER_FLUSH_BATCH_SIZE: &str = "daybook_ledger_flush_batch_size";

/// Counter: notices that failed to deliver (logged, never surfaced).
pub const NOTICES_FAILED_TOTAL: &str = "daybook_notices_failed_total";

/// Counter: start-day reminder notices sent.
pub const REMINDERS_SENT_TOTAL: &str = "daybook_reminders_sent_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(request: &Request) -> &'static str {
    match request {
        Request::Book { .. } => "book",
        Request::Cancel { .. } => "cancel",
        Request::Get { .. } => "get",
        Request::List { .. } => "list",
    }
}
