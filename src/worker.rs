use crate::config::TargetSet;
use crate::session::{run_session, Fetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Everything a worker needs besides its share and the result sink.
pub struct WorkerContext<F> {
    pub fetcher: Arc<F>,
    pub targets: Arc<TargetSet>,
    pub request_timeout: Duration,
}

impl<F> Clone for WorkerContext<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            targets: Arc::clone(&self.targets),
            request_timeout: self.request_timeout,
        }
    }
}

/// Runs `sessions` sessions one after another and forwards each successful
/// duration to `results`. Failed sessions are dropped without retry.
/// Returns the number of sessions completed.
pub async fn run_worker<F: Fetcher>(
    id: usize,
    ctx: WorkerContext<F>,
    sessions: usize,
    results: mpsc::Sender<Duration>,
    mut shutdown: broadcast::Receiver<()>,
) -> usize {
    let mut completed = 0;

    for _ in 0..sessions {
        let outcome = tokio::select! {
            _ = shutdown.recv() => {
                debug!("Worker {} received shutdown signal", id);
                break;
            }
            outcome = run_session(ctx.fetcher.as_ref(), &ctx.targets, ctx.request_timeout) => outcome,
        };

        match outcome {
            Ok(elapsed) => {
                if results.send(elapsed).await.is_err() {
                    debug!("Worker {} result sink closed", id);
                    break;
                }
                completed += 1;
            }
            Err(e) => {
                debug!("Worker {} dropped session: {}", id, e);
            }
        }
    }

    debug!("Worker {} finished: {}/{} sessions", id, completed, sessions);
    completed
}
