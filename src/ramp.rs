use crate::aggregate::BenchmarkResult;
use crate::benchmark::run_benchmark;
use crate::report::Reporter;
use crate::session::Fetcher;
use crate::worker::WorkerContext;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

/// Average above this multiple of the best session counts as latency spread.
const LATENCY_SPREAD_FACTOR: u32 = 5;

/// Throughput below this fraction of the previous level counts as a drop.
const THROUGHPUT_DROP_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    LatencySpread,
    ThroughputDrop,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::LatencySpread => {
                write!(f, "avg latency above {}x min", LATENCY_SPREAD_FACTOR)
            }
            Degradation::ThroughputDrop => write!(f, "throughput dropped more than 20%"),
        }
    }
}

/// Carried from one ramp iteration to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RampState {
    pub previous_rps: Option<f64>,
}

impl RampState {
    /// Reasons `result` looks unstable compared to this state. Empty when healthy.
    pub fn assess(&self, result: &BenchmarkResult) -> Vec<Degradation> {
        let mut reasons = Vec::new();

        if result.min > Duration::ZERO && result.avg > result.min * LATENCY_SPREAD_FACTOR {
            reasons.push(Degradation::LatencySpread);
        }

        if let Some(previous) = self.previous_rps {
            if previous > 0.0 && result.rps < previous * THROUGHPUT_DROP_RATIO {
                reasons.push(Degradation::ThroughputDrop);
            }
        }

        reasons
    }

    /// The next state always tracks the latest throughput, flagged or not.
    pub fn advance(self, result: &BenchmarkResult) -> Self {
        Self {
            previous_rps: Some(result.rps),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RampSchedule {
    pub start: usize,
    pub step: usize,
    pub sessions: usize,
    pub cooldown: Duration,
}

impl RampSchedule {
    pub fn concurrency_at(&self, iteration: usize) -> usize {
        self.start.saturating_add(self.step.saturating_mul(iteration))
    }
}

/// Raises concurrency every iteration until `shutdown` fires. Returns the
/// number of completed iterations.
pub async fn run_ramp<F: Fetcher>(
    ctx: &WorkerContext<F>,
    schedule: RampSchedule,
    reporter: &Reporter,
    shutdown: &broadcast::Sender<()>,
) -> usize {
    let mut stop = shutdown.subscribe();
    let mut state = RampState::default();
    let mut iteration = 0;

    info!("Starting ramp-up test: {}", ctx.targets.mode_description());
    info!(
        "Starting concurrency: {}, Step: {}, Sessions per test: {}",
        schedule.start, schedule.step, schedule.sessions
    );

    loop {
        let concurrency = schedule.concurrency_at(iteration);
        info!("Testing concurrency {}...", concurrency);

        let result = tokio::select! {
            _ = stop.recv() => break,
            result = run_benchmark(ctx, concurrency, schedule.sessions, shutdown) => result,
        };

        let reasons = state.assess(&result);
        for reason in &reasons {
            warn!("Concurrency {} degraded: {}", concurrency, reason);
        }

        reporter.print(&result, concurrency, !reasons.is_empty());
        state = state.advance(&result);
        iteration += 1;

        tokio::select! {
            _ = stop.recv() => break,
            _ = sleep(schedule.cooldown) => {}
        }
    }

    info!(
        "Ramp-up stopped after {} completed levels (last concurrency {})",
        iteration,
        if iteration > 0 {
            schedule.concurrency_at(iteration - 1)
        } else {
            0
        }
    );
    iteration
}
