//! Load generator for the broker: N concurrent workers post grant requests
//! with unique keys for a fixed duration, with a once-a-second progress line
//! and a final RPS/latency summary.

use clap::Parser;
use pkg_types::lease::LeaseRequest;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "shared-lock-loadgen", about = "shared-lock load generator")]
struct Cli {
    /// Base URL of the broker
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// API endpoint to test
    #[arg(long, default_value = "/lease")]
    endpoint: String,

    /// Number of concurrent clients
    #[arg(long, default_value_t = 150)]
    concurrency: usize,

    /// Duration of the load test
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Request body (JSON)
    #[arg(
        long,
        default_value = r#"{"key":"test-key","value":"test-value","labels":{"test":"load-test"}}"#
    )]
    body: String,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

#[derive(Default)]
struct Stats {
    total: AtomicI64,
    success: AtomicI64,
    failed: AtomicI64,
    latency_ms: AtomicI64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Arc::new(Cli::parse());
    let template: LeaseRequest = serde_json::from_str(&cli.body)?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let stats = Arc::new(Stats::default());
    let stop = Arc::new(AtomicBool::new(false));
    let started = Instant::now();

    let reporter = {
        let stats = Arc::clone(&stats);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            while !stop.load(Ordering::Relaxed) {
                interval.tick().await;
                let total = stats.total.load(Ordering::Relaxed);
                let elapsed = started.elapsed().as_secs_f64();
                let avg_latency = if total > 0 {
                    stats.latency_ms.load(Ordering::Relaxed) as f64 / total as f64
                } else {
                    0.0
                };
                print!(
                    "\rRequests: {}, Success: {}, Failed: {}, RPS: {:.2}, Avg Latency: {:.2} ms",
                    total,
                    stats.success.load(Ordering::Relaxed),
                    stats.failed.load(Ordering::Relaxed),
                    total as f64 / elapsed,
                    avg_latency
                );
            }
        })
    };

    let mut workers = Vec::with_capacity(cli.concurrency);
    for worker_id in 0..cli.concurrency {
        let cli = Arc::clone(&cli);
        let client = client.clone();
        let stats = Arc::clone(&stats);
        let stop = Arc::clone(&stop);
        let template = template.clone();

        workers.push(tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                let mut request = template.clone();
                request.key = format!(
                    "{}-{}-{}",
                    template.key,
                    worker_id,
                    stats.total.load(Ordering::Relaxed)
                );

                let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.endpoint);
                let start = Instant::now();
                let result = client.post(&url).json(&request).send().await;
                stats
                    .latency_ms
                    .fetch_add(start.elapsed().as_millis() as i64, Ordering::Relaxed);
                stats.total.fetch_add(1, Ordering::Relaxed);

                match result {
                    Ok(response) if response.status().is_success() => {
                        stats.success.fetch_add(1, Ordering::Relaxed);
                        if cli.verbose {
                            let body = response.text().await.unwrap_or_default();
                            println!("Request successful: {}", body);
                        }
                    }
                    Ok(response) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        if cli.verbose {
                            println!("Request failed with status {}", response.status());
                        }
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        if cli.verbose {
                            println!("Request failed: {}", e);
                        }
                    }
                }
            }
        }));
    }

    tokio::time::sleep(cli.duration).await;
    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        let _ = worker.await;
    }
    let _ = reporter.await;

    let elapsed = started.elapsed().as_secs_f64();
    let total = stats.total.load(Ordering::Relaxed);
    println!("\n\nLoad test completed in {:.2} seconds", elapsed);
    println!("Total requests: {}", total);
    println!("Successful requests: {}", stats.success.load(Ordering::Relaxed));
    println!("Failed requests: {}", stats.failed.load(Ordering::Relaxed));
    println!("Requests per second: {:.2}", total as f64 / elapsed);
    if total > 0 {
        println!(
            "Average latency: {:.2} ms",
            stats.latency_ms.load(Ordering::Relaxed) as f64 / total as f64
        );
    }

    Ok(())
}
