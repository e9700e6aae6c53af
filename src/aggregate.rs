use hdrhistogram::Histogram;
use std::time::Duration;
use tracing::warn;

/// Starting minimum; larger than any session we expect to observe.
pub const MIN_SENTINEL: Duration = Duration::from_secs(3600);

const HISTOGRAM_MAX_MICROS: u64 = 3_600_000_000;

/// Summary of one benchmark invocation. Only `count`, `dropped` and `elapsed`
/// are meaningful when `count == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub count: usize,
    pub dropped: usize,
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub total: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub elapsed: Duration,
    pub rps: f64,
}

impl BenchmarkResult {
    pub fn has_samples(&self) -> bool {
        self.count > 0
    }
}

/// Running reduction over session durations.
pub struct Aggregator {
    min: Duration,
    max: Duration,
    total: Duration,
    count: usize,
    histogram: Option<Histogram<u64>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        let histogram = match Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_MICROS, 3) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("Percentiles disabled, histogram creation failed: {}", e);
                None
            }
        };

        Self {
            min: MIN_SENTINEL,
            max: Duration::ZERO,
            total: Duration::ZERO,
            count: 0,
            histogram,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        if elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.total += elapsed;
        self.count += 1;

        if let Some(histogram) = &mut self.histogram {
            let micros = (elapsed.as_micros() as u64).clamp(1, HISTOGRAM_MAX_MICROS);
            histogram.saturating_record(micros);
        }
    }

    /// Closes the reduction. `elapsed` is the invocation's wall-clock span and
    /// `assigned` the number of sessions handed to workers.
    pub fn finish(self, elapsed: Duration, assigned: usize) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            count: self.count,
            dropped: assigned.saturating_sub(self.count),
            min: self.min,
            max: self.max,
            avg: Duration::ZERO,
            total: self.total,
            p50: Duration::ZERO,
            p95: Duration::ZERO,
            p99: Duration::ZERO,
            elapsed,
            rps: 0.0,
        };

        if self.count == 0 {
            return result;
        }

        let avg_nanos = self.total.as_nanos() / self.count as u128;
        result.avg = Duration::from_nanos(avg_nanos as u64);
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            result.rps = self.count as f64 / secs;
        }

        if let Some(histogram) = &self.histogram {
            let quantile = |q: f64| Duration::from_micros(histogram.value_at_quantile(q));
            // Histogram buckets are approximate; keep percentiles inside the exact range
            result.p50 = quantile(0.50).clamp(self.min, self.max);
            result.p95 = quantile(0.95).clamp(self.min, self.max);
            result.p99 = quantile(0.99).clamp(self.min, self.max);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn empty_stream_keeps_sentinels() {
        let result = Aggregator::new().finish(ms(1500), 10);

        assert_eq!(result.count, 0);
        assert_eq!(result.dropped, 10);
        assert_eq!(result.min, MIN_SENTINEL);
        assert_eq!(result.max, Duration::ZERO);
        assert_eq!(result.avg, Duration::ZERO);
        assert_eq!(result.rps, 0.0);
        assert!(!result.has_samples());
    }

    #[test]
    fn min_avg_max_are_ordered() {
        let mut agg = Aggregator::new();
        for v in [120, 80, 300, 95, 101, 87] {
            agg.record(ms(v));
        }

        let result = agg.finish(ms(1000), 6);

        assert_eq!(result.count, 6);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.min, ms(80));
        assert_eq!(result.max, ms(300));
        assert_eq!(result.total, ms(783));
        assert_eq!(result.avg, ms(783) / 6);
        assert!(result.min <= result.avg && result.avg <= result.max);
        assert!(result.min <= result.p50 && result.p50 <= result.p99);
        assert!(result.p99 <= result.max);
    }

    #[test]
    fn throughput_uses_wall_clock_span() {
        let mut agg = Aggregator::new();
        for _ in 0..100 {
            agg.record(ms(100));
        }

        // 100 sessions of 100ms each run ten-wide finish in one second
        let result = agg.finish(ms(1000), 100);

        assert_eq!(result.total, Duration::from_secs(10));
        assert!((result.rps - 100.0).abs() < 1e-9);
    }

    #[test]
    fn average_holds_past_u32_counts() {
        let mut agg = Aggregator::new();
        agg.record(Duration::from_secs(1));
        let count = 1usize << 32;
        agg.count = count;
        agg.total = Duration::from_secs(1u64 << 32);

        let result = agg.finish(Duration::from_secs(1u64 << 32), count);

        assert_eq!(result.avg, Duration::from_secs(1));
    }

    #[test]
    fn order_of_arrival_does_not_matter() {
        let values = [5, 42, 17, 3, 99];

        let mut forward = Aggregator::new();
        values.iter().for_each(|v| forward.record(ms(*v)));
        let mut backward = Aggregator::new();
        values.iter().rev().for_each(|v| backward.record(ms(*v)));

        assert_eq!(forward.finish(ms(10), 5), backward.finish(ms(10), 5));
    }
}
