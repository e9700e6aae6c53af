use crate::config::TargetSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use url::Url;

// =============================================================================
// Fetcher
// =============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One GET against the target service. Returns the number of body bytes read.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<u64, FetchError>> + Send;
}

/// Shares one connection pool across every worker.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    fail_on_status: bool,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration, fail_on_status: bool) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            fail_on_status,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<u64, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if self.fail_on_status && !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Drain the body so the connection goes back to the pool
        let body = response.bytes().await?;
        Ok(body.len() as u64)
    }
}

// =============================================================================
// Session Runner
// =============================================================================

#[derive(Debug, Error)]
#[error("session aborted at {url}: {source}")]
pub struct SessionError {
    pub url: Url,
    #[source]
    pub source: FetchError,
}

/// Fetches every target in order and returns the time from session start to
/// the last byte of the last URL. The first failure aborts the session.
pub async fn run_session<F: Fetcher>(
    fetcher: &F,
    targets: &TargetSet,
    request_timeout: Duration,
) -> Result<Duration, SessionError> {
    let session_start = Instant::now();

    for url in targets.urls() {
        let outcome = match timeout(request_timeout, fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(request_timeout)),
        };

        if let Err(source) = outcome {
            return Err(SessionError {
                url: url.clone(),
                source,
            });
        }
    }

    Ok(session_start.elapsed())
}
