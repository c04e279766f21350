//! # Queue Throughput Bench - Main Entry Point
//!
//! 1. **Parse arguments**: Processes command-line configuration
//! 2. **Initialize logging**: Colourised console output, optional log file
//! 3. **Create run config**: Validates the CLI values
//! 4. **Initialize clients**: Credential chain plus the three service bindings
//! 5. **Run**: Executes the benchmark phases; Ctrl-C cancels the drain wait
//! 6. **Report**: Prints the measurement and optionally writes JSON
//!
//! Any error ends the process with a diagnostic and exit status 1.

use anyhow::{Context, Result};
use clap::Parser;
use queue_throughput_bench::{logging, Args, BenchmarkDriver, RunConfig, ServiceClients};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = match logging::init_logging(args.verbose, args.quiet, args.log_file.as_deref())
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        error!("Benchmark aborted: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting Queue Throughput Bench {}", queue_throughput_bench::VERSION);

    let config = RunConfig::from_args(&args)?;
    let clients =
        ServiceClients::from_config(&config).context("Failed to initialize service clients")?;
    let driver = BenchmarkDriver::new(config, clients);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping (press Ctrl-C again to exit immediately)");
            let _ = shutdown_tx.send(true);
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let report = driver.run(shutdown_rx).await?;
    report.print_summary();

    if let Some(path) = &args.output_file {
        report.write_json(path)?;
    }

    info!("Benchmark completed");
    Ok(())
}
