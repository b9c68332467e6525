use clap::{Parser, Subcommand};
use pkg_api::server::start_server;
use pkg_config::Config;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shared-lock", about = "shared-lock server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start HTTP server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;

    let level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting shared-lock");
    info!("  Port:    {}", cfg.server.port);
    info!("  Storage: {:?}", cfg.storage.storage_type);
    info!("  Cache:   {}", if cfg.cache.enabled { "enabled" } else { "disabled" });

    start_server(cfg).await
}
