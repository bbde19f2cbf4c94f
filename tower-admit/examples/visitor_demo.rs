use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use admit_limit::BucketConfig;
use admit_limit::LimiterRegistry;
use chrono::DateTime;
use chrono::Local;
use clap::Parser;
use hdrhistogram::Histogram;
use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tower::service_fn;
use tower_admit::AdmissionLayer;
use tower_admit::AdmitError;
use tower_admit::spawn_sweeper;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fire concurrent requests from several client IPs through the admission layer.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Client addresses to simulate
    #[arg(long, value_delimiter = ',', default_values = ["127.0.0.1", "127.0.0.2", "127.0.0.3"])]
    ips: Vec<String>,

    /// Requests issued concurrently by each client
    #[arg(long, default_value_t = 10)]
    requests_per_ip: usize,

    /// Burst size of each client's bucket
    #[arg(long, default_value_t = 3.0)]
    capacity: f64,

    /// Tokens per second added to each client's bucket
    #[arg(long, default_value_t = 1.0)]
    refill_rate: f64,

    /// Spread request start times randomly over this window (e.g. "2s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    spread: Duration,

    /// Evict clients idle for longer than this (e.g. "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    idle_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
struct VisitorRequest {
    ip: String,
}

struct RequestResult {
    ip: String,
    req_num: usize,
    status: u16,
    duration: Duration,
    timestamp: DateTime<Local>,
    error: Option<String>,
}

impl RequestResult {
    fn format(&self) -> String {
        let stamp = self.timestamp.format("%H:%M:%S%.3f");
        if let Some(error) = &self.error {
            return format!(
                "[{stamp}] IP: {} | Req #{} | ERROR: {error} | Duration: {:?}",
                self.ip, self.req_num, self.duration
            );
        }

        let mark = if self.status == 200 { "✅" } else { "❌" };
        format!(
            "[{stamp}] IP: {} | Req #{} | Status: {} {mark} | Duration: {:.2}ms",
            self.ip,
            self.req_num,
            self.status,
            self.duration.as_micros() as f64 / 1000.0
        )
    }
}

async fn hello(_req: VisitorRequest) -> Result<&'static str, BoxError> {
    Ok("Hello, World!")
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = BucketConfig::new(args.capacity, args.refill_rate)?;

    let mut registry = LimiterRegistry::new(config);
    if let Some(ttl) = args.idle_ttl {
        registry = registry.with_idle_ttl(ttl);
    }
    let registry = Arc::new(registry);
    let _sweeper = args.idle_ttl.map(|ttl| spawn_sweeper(&registry, ttl));

    let layer = AdmissionLayer::new(registry.clone(), |req: &VisitorRequest| {
        Some(req.ip.clone())
    })
    .with_observer(|ip, allowed| {
        if allowed {
            info!("Request from IP {ip} was allowed");
        } else {
            info!("Request from IP {ip} was denied");
        }
    });
    let service = layer.layer(service_fn(hello));

    println!("=== Starting tests with different IPs ===");

    let spread_ms = args.spread.as_millis() as u64;
    let mut tasks = JoinSet::new();
    for ip in &args.ips {
        for req_num in 1..=args.requests_per_ip {
            let mut svc = service.clone();
            let ip = ip.clone();
            tasks.spawn(async move {
                if spread_ms > 0 {
                    let delay = rand::rng().random_range(0..=spread_ms);
                    sleep(Duration::from_millis(delay)).await;
                }

                let timestamp = Local::now();
                let start = Instant::now();
                let req = VisitorRequest { ip: ip.clone() };
                let outcome = match ServiceExt::<VisitorRequest>::ready(&mut svc).await {
                    Ok(ready) => ready.call(req).await,
                    Err(e) => Err(e),
                };

                let (status, error) = match outcome {
                    Ok(_) => (200, None),
                    Err(e) => match e.downcast_ref::<AdmitError>() {
                        Some(rejection) => (rejection.status(), None),
                        None => (500, Some(e.to_string())),
                    },
                };

                RequestResult {
                    ip,
                    req_num,
                    status,
                    duration: start.elapsed(),
                    timestamp,
                    error,
                }
            });
        }
    }

    let mut by_ip: BTreeMap<String, Vec<RequestResult>> = BTreeMap::new();
    let mut latency = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;
    while let Some(task) = tasks.join_next().await {
        let result = task?;
        latency.record((result.duration.as_micros() as u64).max(1))?;
        by_ip.entry(result.ip.clone()).or_default().push(result);
    }

    println!("\nRequest Results:");
    println!("----------------------------------------");
    for ip in &args.ips {
        println!("\nResults for IP {ip}:");
        println!("----------------------------------------");
        if let Some(results) = by_ip.get_mut(ip) {
            results.sort_by_key(|r| r.req_num);
            for result in results.iter() {
                println!("{}", result.format());
            }
        }
    }

    println!("\n=== Summary ===");
    println!("----------------------------------------");
    for ip in &args.ips {
        let successes = by_ip
            .get(ip)
            .map(|results| results.iter().filter(|r| r.status == 200).count())
            .unwrap_or(0);
        println!(
            "IP {ip}: {successes} successful / {} total requests (Rate limit: {} requests)",
            args.requests_per_ip, args.capacity
        );
    }
    println!(
        "\nTotal requests processed: {}",
        args.ips.len() * args.requests_per_ip
    );
    println!("Tracked clients:         {}", registry.len());
    println!("P50 (Elapsed):           {}µs", latency.value_at_quantile(0.5));
    println!("P99 (Elapsed):           {}µs", latency.value_at_quantile(0.99));

    Ok(())
}
