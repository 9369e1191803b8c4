use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use ulid::Ulid;

use daybook::directory::ResourceDirectory;
use daybook::engine::Engine;
use daybook::model::{ApprovalState, Resource};
use daybook::notify::NotifyHub;
use daybook::wire;

/// The whole catalog is loaded at boot, so the bench runs its own server
/// instance with a fresh ledger instead of targeting a live one.
async fn start_server(resources: Vec<Resource>) -> SocketAddr {
    let directory = Arc::new(ResourceDirectory::new());
    for resource in resources {
        directory.insert(resource).expect("invalid bench resource");
    }

    let dir = std::env::temp_dir().join(format!("daybook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    println!("  ledger dir: {}", dir.display());

    let engine = Arc::new(
        Engine::new(
            dir.join("bench.ledger"),
            directory,
            Arc::new(NotifyHub::new()),
            Duration::from_secs(3),
            Duration::from_secs(10),
        )
        .expect("engine start failed"),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.expect("connect failed");
        let (read_half, writer) = socket.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn request(&mut self, body: Value) -> Value {
        let mut line = body.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.expect("write");
        let mut reply = String::new();
        self.reader.read_line(&mut reply).await.expect("read");
        serde_json::from_str(&reply).expect("reply is not json")
    }

    async fn book(&mut self, user: Ulid, resource: Ulid, start: NaiveDate, end: NaiveDate) -> Value {
        self.request(json!({
            "op": "book",
            "user_id": user.to_string(),
            "resource_id": resource.to_string(),
            "start_date": start.to_string(),
            "end_date": end.to_string(),
        }))
        .await
    }
}

fn day(offset: i64) -> NaiveDate {
    chrono::Utc::now().date_naive() + chrono::Duration::days(offset)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn make_resources(n: usize) -> Vec<Resource> {
    (0..n)
        .map(|i| Resource {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            daily_price: 100 + (i as i64) * 10,
            monthly_discount: if i % 2 == 0 { 0 } else { 10 },
            hidden: false,
            approval: ApprovalState::Approved,
        })
        .collect()
}

/// Phase 1: one client, one resource, disjoint one-day stays back to back.
async fn phase1_sequential(addr: SocketAddr, resource: Ulid) {
    let mut client = Client::connect(addr).await;
    let user = Ulid::new();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let d = day(2 + 2 * i as i64);
        let t = Instant::now();
        let reply = client.book(user, resource, d, d.succ_opt().unwrap()).await;
        assert_eq!(reply["status"], "created", "booking failed: {reply}");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} bookings in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("booking latency", &mut latencies);
}

/// Phase 2: tasks on disjoint resources never contend on a date lock, so
/// this measures ledger group-commit throughput.
async fn phase2_disjoint_parallel(addr: SocketAddr, resources: &[Resource]) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for task in 0..n_tasks {
        let resource = resources[task % resources.len()].id;
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let user = Ulid::new();
            for i in 0..n_per_task {
                let d = day(6000 + 2 * i as i64);
                let reply = client.book(user, resource, d, d.succ_opt().unwrap()).await;
                assert_eq!(reply["status"], "created", "booking failed: {reply}");
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Phase 3: every task races for the same date range, so each range has
/// exactly one winner and the rest trip over the conflict check or the
/// resource lock.
async fn phase3_contention(addr: SocketAddr, resource: Ulid) {
    let n_tasks = 8;
    let rounds = 50;

    let created = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let lock_timeouts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let created = created.clone();
        let conflicts = conflicts.clone();
        let lock_timeouts = lock_timeouts.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let user = Ulid::new();
            for round in 0..rounds {
                let d = day(12000 + 2 * round as i64);
                let reply = client.book(user, resource, d, d.succ_opt().unwrap()).await;
                if reply["status"] == "created" {
                    created.fetch_add(1, Ordering::Relaxed);
                } else if reply["error"]["code"] == "lock_timeout" {
                    lock_timeouts.fetch_add(1, Ordering::Relaxed);
                } else {
                    conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * rounds;
    println!(
        "  {n_tasks} tasks x {rounds} rounds = {total} attempts in {:.2}s",
        elapsed.as_secs_f64()
    );
    println!(
        "  created={}, conflicts={}, lock_timeouts={}",
        created.load(Ordering::Relaxed),
        conflicts.load(Ordering::Relaxed),
        lock_timeouts.load(Ordering::Relaxed),
    );
}

/// Phase 4: readers list a busy resource while writers keep booking others.
async fn phase4_read_under_load(addr: SocketAddr, resources: &[Resource]) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();

    for w in 0..4 {
        let stop = stop.clone();
        let resource = resources[1 + w % 4].id;
        writer_handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let user = Ulid::new();
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let d = day(20000 + (w as i64) * 4000 + 2 * i);
                let _ = client.book(user, resource, d, d.succ_opt().unwrap()).await;
                i += 1;
            }
        }));
    }

    // Phase 1 left a few thousand rows on resources[0], so the listing
    // has something to scan.
    let busy = resources[0].id;
    let n_readers = 8;
    let reads_per_reader = 300;
    let mut reader_handles = Vec::new();

    for _ in 0..n_readers {
        reader_handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let reply = client
                    .request(json!({
                        "op": "list",
                        "resource_id": busy.to_string(),
                        "limit": 50,
                    }))
                    .await;
                assert_eq!(reply["status"], "ok", "list failed: {reply}");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("list latency", &mut all_latencies);
}

/// Phase 5: many short-lived connections, a handful of bookings each.
async fn phase5_connection_storm(addr: SocketAddr, resources: &[Resource]) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let success = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for c in 0..n_conns {
        let resource = resources[c % resources.len()].id;
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let user = Ulid::new();
            let band = 40000 + (c / N_RESOURCES) as i64 * 1000;
            for i in 0..ops_per_conn {
                let d = day(band + 2 * i as i64);
                let reply = client.book(user, resource, d, d.succ_opt().unwrap()).await;
                assert_eq!(reply["status"], "created", "booking failed: {reply}");
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} bookings each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

const N_RESOURCES: usize = 10;

#[tokio::main]
async fn main() {
    println!("=== daybook stress benchmark ===");

    println!("[setup]");
    let resources = make_resources(N_RESOURCES);
    let addr = start_server(resources.clone()).await;
    println!("  server on {addr}, {} resources\n", resources.len());

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(addr, resources[0].id).await;

    println!("\n[phase 2] parallel bookings on disjoint resources");
    phase2_disjoint_parallel(addr, &resources).await;

    println!("\n[phase 3] same-range contention");
    phase3_contention(addr, resources[5].id).await;

    println!("\n[phase 4] list latency under write load");
    phase4_read_under_load(addr, &resources).await;

    println!("\n[phase 5] connection storm");
    phase5_connection_storm(addr, &resources).await;

    println!("\n=== benchmark complete ===");
}
