//! Example broker client: compete for a lease, then heartbeat it until the
//! broker reports the lease gone (204), at which point the client stops.

use anyhow::{anyhow, bail};
use chrono::Utc;
use clap::Parser;
use pkg_types::lease::LeaseRequest;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

const RETRY_INTERVAL: Duration = Duration::from_secs(2);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "shared-lock-client", about = "shared-lock example client")]
struct Cli {
    /// Broker base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Lease key to compete for
    #[arg(long, default_value = "example-key")]
    key: String,

    /// Lease TTL sent in the x-lease-ttl header
    #[arg(long, default_value = "3s")]
    ttl: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let request = LeaseRequest {
        key: cli.key.clone(),
        value: "example-value".to_string(),
        labels: HashMap::from([("env".to_string(), "production".to_string())]),
        created_at: Some(Utc::now()),
    };

    let lease_id = loop {
        match obtain_lease(&client, &cli, &request).await {
            Ok(lease_id) => {
                info!("Lease obtained successfully, starting application");
                break lease_id;
            }
            Err(e) => {
                warn!("Failed to obtain lease: {}. Retrying in {:?}", e, RETRY_INTERVAL);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    };

    run_with_lease(&client, &cli, &lease_id).await
}

async fn obtain_lease(
    client: &reqwest::Client,
    cli: &Cli,
    request: &LeaseRequest,
) -> anyhow::Result<String> {
    let response = client
        .post(format!("{}/lease", cli.url.trim_end_matches('/')))
        .header("x-lease-ttl", &cli.ttl)
        .json(request)
        .send()
        .await?;

    match response.status() {
        StatusCode::CREATED => {
            let lease_id = response.text().await?;
            info!("Lease created successfully with ID: {}", lease_id);
            Ok(lease_id)
        }
        StatusCode::ACCEPTED => Err(anyhow!("lease already exists")),
        other => Err(anyhow!("unexpected response status: {}", other)),
    }
}

/// Heartbeat on a fixed interval until the broker reports the lease gone.
async fn run_with_lease(client: &reqwest::Client, cli: &Cli, lease_id: &str) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;
        match send_keepalive(client, cli, lease_id).await {
            Ok(()) => info!("Keepalive sent successfully"),
            Err(e) if e.to_string() == "lease is expired" => {
                error!("Lease is expired, stopping application");
                return Ok(());
            }
            Err(e) => warn!("Failed to send keepalive: {}", e),
        }
    }
}

async fn send_keepalive(client: &reqwest::Client, cli: &Cli, lease_id: &str) -> anyhow::Result<()> {
    let response = client
        .post(format!("{}/keepalive", cli.url.trim_end_matches('/')))
        .body(lease_id.to_string())
        .send()
        .await?;

    match response.status() {
        StatusCode::OK => Ok(()),
        StatusCode::NO_CONTENT => bail!("lease is expired"),
        other => bail!("unexpected response status: {}", other),
    }
}
