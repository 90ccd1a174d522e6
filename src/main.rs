//! Void Collector economy service binary

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use void_collector::{
    api::ApiServer,
    config::{generate_sample_config, ConfigLoader},
    payout::BatchOutcome,
    AppConfig, ServiceContainer, VoidResult,
};

/// Void Collector CLI
#[derive(Parser)]
#[command(name = "void-collector")]
#[command(about = "Economy backend for the Void Collector idle game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,

    /// Process one batch of pending withdrawals and exit.
    /// Offline only: `serve` holds the ledger lock, use `POST /api/payout/process` while it runs.
    ProcessPayouts,

    /// Write a sample configuration file
    SampleConfig {
        /// Output path
        path: PathBuf,
    },

    /// Recompute the conversion rate from a token price.
    /// Offline only: use `POST /api/admin/conversion-rate` while `serve` runs.
    SetRate {
        /// Token price in USD
        #[arg(short, long)]
        price: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::SampleConfig { path } => {
            generate_sample_config(&path.to_string_lossy())?;
            info!(path = %path.display(), "sample configuration written");
        }
        Commands::Serve => {
            let services = Arc::new(open_services(cli.config)?);
            ApiServer::new(services).run().await?;
        }
        Commands::ProcessPayouts => {
            let services = open_offline(cli.config, "process-payouts")?;
            match services.payouts.process_batch(Utc::now()).await? {
                BatchOutcome::NoPending => info!("no pending withdrawals"),
                BatchOutcome::Aborted(abort) => info!(?abort, "payout batch aborted"),
                BatchOutcome::Completed(report) => info!(
                    processed = report.processed,
                    successful = report.successful,
                    remaining_budget = %report.remaining_daily_budget,
                    "payout batch completed"
                ),
            }
        }
        Commands::SetRate { price } => {
            let services = open_offline(cli.config, "set-rate")?;
            let rate = services.conversion.update_rate(price, Utc::now())?;
            info!(
                particles_per_step = rate.particles_per_step,
                price = rate.token_price_usd,
                "conversion rate updated"
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "void_collector=debug,tower_http=debug"
    } else {
        "void_collector=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

fn load_config(path: Option<PathBuf>) -> VoidResult<AppConfig> {
    let loader = match path {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    loader.load()
}

fn open_services(path: Option<PathBuf>) -> VoidResult<ServiceContainer> {
    let config = load_config(path)?;
    let rail = ServiceContainer::simulated_rail(&config);
    ServiceContainer::open(config, rail)
}

/// Open the ledger for a one-shot command. RocksDB locks the data directory, so
/// this fails while a server is running against it.
fn open_offline(path: Option<PathBuf>, command: &str) -> VoidResult<ServiceContainer> {
    open_services(path).map_err(|e| {
        error!(
            command,
            error = %e,
            "ledger unavailable; stop the server or use the admin API instead"
        );
        e
    })
}
