use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use daybook::directory::ResourceDirectory;
use daybook::engine::Engine;
use daybook::limits::{DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_HOLD_TIMEOUT_MS};
use daybook::notify::NotifyHub;
use daybook::{observability, sweep, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("DAYBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    observability::init(metrics_port);

    let port = std::env::var("DAYBOOK_PORT").unwrap_or_else(|_| "7444".into());
    let bind = std::env::var("DAYBOOK_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("DAYBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let resources_path = std::env::var("DAYBOOK_RESOURCES")
        .unwrap_or_else(|_| format!("{data_dir}/resources.json"));
    let max_connections: usize = std::env::var("DAYBOOK_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("DAYBOOK_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let acquire_timeout_ms: u64 = std::env::var("DAYBOOK_ACQUIRE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS);
    let hold_timeout_ms: u64 = std::env::var("DAYBOOK_HOLD_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_HOLD_TIMEOUT_MS);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let directory = if Path::new(&resources_path).exists() {
        let directory = ResourceDirectory::load(Path::new(&resources_path))?;
        info!("loaded {} resource(s) from {resources_path}", directory.len());
        Arc::new(directory)
    } else {
        tracing::warn!("resource file {resources_path} missing, starting with an empty directory");
        Arc::new(ResourceDirectory::new())
    };

    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        PathBuf::from(&data_dir).join("daybook.ledger"),
        directory,
        hub,
        Duration::from_millis(acquire_timeout_ms),
        Duration::from_millis(hold_timeout_ms),
    )?);
    let semaphore = Arc::new(Semaphore::new(max_connections));

    tokio::spawn(sweep::run_reminders(engine.clone()));
    tokio::spawn(sweep::run_compactor(engine.clone(), compact_threshold));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("daybook listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(observability::CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, engine).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("daybook stopped");
    Ok(())
}
