use crate::aggregate::{Aggregator, BenchmarkResult};
use crate::session::Fetcher;
use crate::worker::{run_worker, WorkerContext};
use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error};

/// Upper bound on sessions per invocation; keeps the result sink within
/// tokio's channel capacity limit.
pub const MAX_SESSIONS: usize = 100_000_000;

/// Number of workers actually started. Lanes beyond `total` would get no work.
pub fn worker_count(total: usize, concurrency: usize) -> usize {
    concurrency.min(total).max(1)
}

/// Share of lane `index` when `total` sessions are split over `workers` lanes.
/// The first `total % workers` lanes take one extra session, so shares sum to
/// `total` and differ by at most one. `workers` must be non-zero.
pub fn session_share(total: usize, workers: usize, index: usize) -> usize {
    total / workers + usize::from(index < total % workers)
}

/// Runs `total_sessions` sessions across `concurrency` workers and reduces
/// their durations into one result.
pub async fn run_benchmark<F: Fetcher>(
    ctx: &WorkerContext<F>,
    concurrency: usize,
    total_sessions: usize,
    shutdown: &broadcast::Sender<()>,
) -> BenchmarkResult {
    let workers = worker_count(total_sessions, concurrency);

    // Sized for every possible result, so workers never wait on the sink
    let (tx, mut rx) = mpsc::channel(total_sessions.clamp(1, MAX_SESSIONS));

    let start = Instant::now();

    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let share = session_share(total_sessions, workers, id);
            let worker_ctx = ctx.clone();
            let worker_tx = tx.clone();
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(run_worker(id, worker_ctx, share, worker_tx, shutdown_rx))
        })
        .collect();

    debug!(
        "Spawned {} workers for {} sessions (concurrency {})",
        handles.len(),
        total_sessions,
        concurrency
    );

    // The sink closes once every worker has dropped its sender
    drop(tx);

    for (id, joined) in join_all(handles).await.into_iter().enumerate() {
        if let Err(e) = joined {
            error!("Worker task {} failed: {}", id, e);
        }
    }

    let mut aggregator = Aggregator::new();
    while let Some(elapsed) = rx.recv().await {
        aggregator.record(elapsed);
    }

    aggregator.finish(start.elapsed(), total_sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{targets, MockFetcher};
    use std::sync::Arc;
    use std::time::Duration;

    fn context(fetcher: MockFetcher, staggered: bool) -> WorkerContext<MockFetcher> {
        WorkerContext {
            fetcher: Arc::new(fetcher),
            targets: Arc::new(targets(staggered)),
            request_timeout: Duration::from_secs(30),
        }
    }

    fn shares(total: usize, concurrency: usize) -> Vec<usize> {
        let workers = worker_count(total, concurrency);
        (0..workers).map(|i| session_share(total, workers, i)).collect()
    }

    #[test]
    fn shares_sum_to_total_and_differ_by_at_most_one() {
        for total in [1, 7, 99, 100, 101, 10_000] {
            for concurrency in [1, 2, 3, 7, 10, 64, 1000] {
                let shares = shares(total, concurrency);
                assert_eq!(shares.len(), concurrency.min(total));
                assert_eq!(shares.iter().sum::<usize>(), total);

                let max = *shares.iter().max().unwrap();
                let min = *shares.iter().min().unwrap();
                assert!(max - min <= 1, "total={total} concurrency={concurrency}");
            }
        }
    }

    #[test]
    fn remainder_goes_to_the_first_workers() {
        assert_eq!(shares(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(shares(3, 5), vec![1, 1, 1]);
    }

    #[test]
    fn worker_count_never_exceeds_sessions() {
        assert_eq!(worker_count(10, 1usize << 40), 10);
        assert_eq!(worker_count(10, usize::MAX), 10);
        assert_eq!(worker_count(10_000, 1000), 1000);
        assert_eq!(session_share(10, 10, 9), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_concurrency_spawns_one_worker_per_session() {
        let ctx = context(MockFetcher::new(Duration::from_millis(10)), false);
        let (shutdown, _) = broadcast::channel(1);

        let result = run_benchmark(&ctx, 1usize << 40, 10, &shutdown).await;

        assert_eq!(result.count, 10);
        assert_eq!(result.dropped, 0);
        assert_eq!(ctx.fetcher.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn ten_workers_hundred_sessions_at_hundred_millis() {
        let ctx = context(MockFetcher::new(Duration::from_millis(100)), false);
        let (shutdown, _) = broadcast::channel(1);

        let result = run_benchmark(&ctx, 10, 100, &shutdown).await;

        assert_eq!(result.count, 100);
        assert_eq!(result.dropped, 0);
        assert_eq!(ctx.fetcher.calls(), 100);
        for latency in [result.min, result.avg, result.max] {
            assert!(latency >= Duration::from_millis(100));
            assert!(latency < Duration::from_millis(110));
        }
        assert!(result.elapsed >= Duration::from_secs(1));
        assert!(result.elapsed < Duration::from_millis(1100));
        assert!((result.rps - 100.0).abs() < 10.0, "rps = {}", result.rps);
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_split_still_runs_every_session() {
        let ctx = context(MockFetcher::new(Duration::from_millis(10)), false);
        let (shutdown, _) = broadcast::channel(1);

        let result = run_benchmark(&ctx, 7, 89, &shutdown).await;

        assert_eq!(result.count, 89);
        assert!(result.min <= result.avg && result.avg <= result.max);
    }

    #[tokio::test(start_paused = true)]
    async fn more_workers_than_sessions() {
        let ctx = context(MockFetcher::new(Duration::from_millis(10)), false);
        let (shutdown, _) = broadcast::channel(1);

        let result = run_benchmark(&ctx, 50, 20, &shutdown).await;

        assert_eq!(result.count, 20);
        assert_eq!(ctx.fetcher.calls(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_staggered_call_drops_every_session() {
        let ctx = context(
            MockFetcher::new(Duration::from_millis(10)).failing_on("/api/item"),
            true,
        );
        let (shutdown, _) = broadcast::channel(1);

        let result = run_benchmark(&ctx, 4, 40, &shutdown).await;

        assert_eq!(result.count, 0);
        assert_eq!(result.dropped, 40);
        assert_eq!(result.rps, 0.0);
        assert_eq!(result.avg, Duration::ZERO);
    }
}
