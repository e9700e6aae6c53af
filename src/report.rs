use crate::aggregate::BenchmarkResult;
use serde::Serialize;
use std::time::Duration;
use tracing::error;

const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const NO_DATA: &str = "n/a";

// =============================================================================
// JSON Record
// =============================================================================

#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    mode: &'a str,
    concurrency: usize,
    sessions: usize,
    dropped: usize,
    sessions_per_sec: f64,
    elapsed_ms: f64,
    min_ms: Option<f64>,
    avg_ms: Option<f64>,
    max_ms: Option<f64>,
    p50_ms: Option<f64>,
    p95_ms: Option<f64>,
    p99_ms: Option<f64>,
    warning: bool,
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

// =============================================================================
// Reporter
// =============================================================================

pub struct Reporter {
    mode: &'static str,
    json: bool,
}

impl Reporter {
    pub fn new(mode: &'static str, json: bool) -> Self {
        Self { mode, json }
    }

    /// Human readable summary. Warnings are wrapped in red.
    pub fn render(&self, result: &BenchmarkResult, concurrency: usize, warn: bool) -> String {
        let latency = |d: Duration| {
            if result.has_samples() {
                format!("{:.2?}", d)
            } else {
                NO_DATA.to_string()
            }
        };

        let (color, reset) = if warn { (RED, RESET) } else { ("", "") };

        format!(
            "{color}Mode: {}\n\
             Concurrency: {} | Sessions: {} | Sessions/s: {:.2}\n\
             Session latency min/avg/max: {} / {} / {}\n\
             Session latency p50/p95/p99: {} / {} / {} | Dropped: {} | Elapsed: {:.2?}{reset}\n",
            self.mode,
            concurrency,
            result.count,
            result.rps,
            latency(result.min),
            latency(result.avg),
            latency(result.max),
            latency(result.p50),
            latency(result.p95),
            latency(result.p99),
            result.dropped,
            result.elapsed,
        )
    }

    pub fn to_json(
        &self,
        result: &BenchmarkResult,
        concurrency: usize,
        warn: bool,
    ) -> Result<String, sonic_rs::Error> {
        let sample = |d: Duration| result.has_samples().then(|| millis(d));

        let record = ResultRecord {
            mode: self.mode,
            concurrency,
            sessions: result.count,
            dropped: result.dropped,
            sessions_per_sec: result.rps,
            elapsed_ms: millis(result.elapsed),
            min_ms: sample(result.min),
            avg_ms: sample(result.avg),
            max_ms: sample(result.max),
            p50_ms: sample(result.p50),
            p95_ms: sample(result.p95),
            p99_ms: sample(result.p99),
            warning: warn,
        };

        sonic_rs::to_string(&record)
    }

    pub fn print(&self, result: &BenchmarkResult, concurrency: usize, warn: bool) {
        println!("{}", self.render(result, concurrency, warn));

        if self.json {
            match self.to_json(result, concurrency, warn) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize result: {}", e),
            }
        }
    }
}
