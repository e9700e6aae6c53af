mod aggregate;
mod benchmark;
mod config;
mod ramp;
mod report;
mod session;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::benchmark::run_benchmark;
use crate::config::Config;
use crate::ramp::{run_ramp, RampSchedule};
use crate::report::Reporter;
use crate::session::HttpFetcher;
use crate::worker::WorkerContext;

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    let targets = config.targets()?;
    let fetcher = HttpFetcher::new(config.request_timeout(), config.fail_on_status)
        .context("Failed to build HTTP client")?;

    // Print banner
    info!("════════════════════════════════════════════════════════════");
    info!("                HTTP LOAD TESTING TOOL");
    info!("════════════════════════════════════════════════════════════");
    info!("Mode: {}", targets.mode_description());
    for url in targets.urls() {
        info!("Target: {}", url);
    }
    info!("Sessions per test: {}", config.sessions);
    if config.ramp {
        info!(
            "Ramp: start={} step={} cooldown={}s",
            config.ramp_start, config.ramp_step, config.cooldown_secs
        );
    } else {
        info!("Concurrency: {}", config.concurrency);
        if config.concurrency > config.sessions {
            warn!(
                "Concurrency {} exceeds sessions {}, only {} workers will run",
                config.concurrency, config.sessions, config.sessions
            );
        }
    }
    info!("Request timeout: {}s", config.timeout_secs);
    info!("════════════════════════════════════════════════════════════");

    let reporter = Reporter::new(targets.mode_description(), config.json);
    let ctx = WorkerContext {
        fetcher: Arc::new(fetcher),
        targets: Arc::new(targets),
        request_timeout: config.request_timeout(),
    };

    // Ctrl+C reaches every worker and the ramp loop
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                signal_tx.send(()).ok();
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    if config.ramp {
        let schedule = RampSchedule {
            start: config.ramp_start,
            step: config.ramp_step,
            sessions: config.sessions,
            cooldown: config.cooldown(),
        };
        run_ramp(&ctx, schedule, &reporter, &shutdown_tx).await;
    } else {
        info!("Running single test: {}", ctx.targets.mode_description());
        let result = run_benchmark(&ctx, config.concurrency, config.sessions, &shutdown_tx).await;
        reporter.print(&result, config.concurrency, false);
    }

    info!("════════════════════════════════════════════════════════════");
    info!("                 BENCHMARK COMPLETE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
