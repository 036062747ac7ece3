//! CreditLedger Simulator
//!
//! Drives concurrent credits, debits and statement reads against an in-memory
//! ledger, then audits every client.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use controller::{SimulationConfig, SimulationController};
use scenario::Scenario;

/// CreditLedger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "CreditLedger concurrent load simulator")]
struct Args {
    /// Number of clients to create
    #[arg(short, long, default_value = "5")]
    clients: usize,

    /// Credit limit of every client
    #[arg(short, long, default_value = "100000")]
    limit: i64,

    /// Concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Operations per worker
    #[arg(short, long, default_value = "1000")]
    operations: usize,

    /// Largest entry amount
    #[arg(long, default_value = "10000")]
    max_amount: i64,

    /// Scenario to run (balanced, debit-heavy, hot-client, read-mostly)
    #[arg(short, long, default_value = "balanced")]
    scenario: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,creditledger_ledger=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting CreditLedger Simulator");

    let scenario = Scenario::load(&args.scenario)?;
    let controller = SimulationController::new(SimulationConfig {
        clients: args.clients,
        limit: args.limit,
        workers: args.workers,
        operations: args.operations,
        max_amount: args.max_amount,
        seed: args.seed,
    })?;

    let report = controller.run(&scenario).await?;
    let metrics = &report.metrics;

    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Accepted entries: {}", metrics.accepted_entries);
    info!("Limit rejections: {}", metrics.limit_rejections);
    info!("Statements: {}", metrics.statements);
    info!("Failures: {}", metrics.failures);
    info!("Acceptance rate: {:.1}%", metrics.acceptance_rate() * 100.0);
    info!(
        "Latency avg/p50/p99: {}/{}/{} µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!(
        "Throughput: {:.0} ops/s",
        metrics.throughput(report.elapsed.as_secs_f64())
    );

    if !report.inconsistent_clients.is_empty() {
        error!(clients = ?report.inconsistent_clients, "Ledger audit failed");
        anyhow::bail!(
            "{} client(s) failed the ledger audit",
            report.inconsistent_clients.len()
        );
    }

    info!("All {} clients passed the ledger audit", args.clients);
    Ok(())
}
