//! Task dispatcher daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     DISPATCHER                        │
//!                      │                                                       │
//!   caller ───────────▶│  facade ──▶ circuit breaker ──▶ retry ──▶ pool       │
//!                      │     │                                     ┌────────┐  │
//!                      │     ├──▶ pipelines (batch / backpressure /│generic │  │
//!                      │     │    rate limit / fan-out) ──────────▶│audio   │  │
//!                      │     │                                     │transcr.│  │
//!                      │     └──▶ scoped resource / memory budget ▶│ai      │  │
//!                      │                                           └────────┘  │
//!                      │  ┌─────────────────────────────────────────────────┐ │
//!                      │  │ config · observability · lifecycle              │ │
//!                      │  └─────────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use task_dispatcher::config::{load_config, DispatcherConfig};
use task_dispatcher::lifecycle::{drain_with_deadline, wait_for_signal, Shutdown};
use task_dispatcher::observability::{logging, metrics};
use task_dispatcher::Dispatcher;

const STATS_INTERVAL: Duration = Duration::from_secs(30);
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "task-dispatcher")]
#[command(about = "Background task dispatcher for meeting processing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the effective pool table
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the dispatcher until SIGINT/SIGTERM
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn read_config(path: Option<&PathBuf>) -> Result<DispatcherConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(DispatcherConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = read_config(config.as_ref())?;
            let dispatcher = Dispatcher::new(config)?;
            println!("{}", serde_json::to_string_pretty(&dispatcher.pool_stats())?);
        }
        Commands::Run { config } => {
            let config = read_config(config.as_ref())?;
            logging::init_logging(&config.observability);

            tracing::info!("task-dispatcher v{} starting", env!("CARGO_PKG_VERSION"));

            if config.observability.metrics_enabled {
                if let Ok(addr) = config.observability.metrics_address.parse() {
                    metrics::init_metrics(addr);
                } else {
                    tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    );
                }
            }

            let dispatcher = Dispatcher::new(config)?;
            for stats in dispatcher.pool_stats() {
                tracing::info!(
                    pool = %stats.name,
                    max_concurrency = stats.max_concurrency,
                    queue_capacity = stats.queue_capacity,
                    "Pool ready"
                );
            }

            let shutdown = Shutdown::new();
            let reporter = tokio::spawn(report_stats(dispatcher.clone(), shutdown.subscribe()));

            wait_for_signal().await;
            shutdown.trigger();
            let _ = reporter.await;

            if !drain_with_deadline(&dispatcher, DRAIN_DEADLINE).await {
                tracing::warn!("Shutdown deadline reached with work still pending");
            }
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}

async fn report_stats(dispatcher: Dispatcher, mut stop: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for stats in dispatcher.pool_stats() {
                    tracing::info!(
                        pool = %stats.name,
                        active = stats.active,
                        pending = stats.pending,
                        "Pool stats"
                    );
                }
                for circuit in dispatcher.circuit_snapshots() {
                    tracing::info!(
                        operation = %circuit.operation,
                        state = ?circuit.state,
                        failures = circuit.consecutive_failures,
                        "Circuit stats"
                    );
                }
            }
            _ = stop.recv() => break,
        }
    }
}
