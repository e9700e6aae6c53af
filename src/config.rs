use crate::benchmark::MAX_SESSIONS;
use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "http-session-bench")]
#[command(about = "HTTP session load generator and ramp-up saturation finder", long_about = None)]
pub struct Config {
    /// Fetch /item then /api/item per session (page load + API call)
    #[arg(long, env = "STAGGERED_MODE")]
    pub staggered_mode: bool,

    /// Increase concurrency step by step until stopped (Ctrl+C)
    #[arg(long, env = "RAMP")]
    pub ramp: bool,

    /// Total sessions per test (per ramp iteration in ramp mode)
    #[arg(long, env = "SESSIONS", default_value = "10000")]
    pub sessions: usize,

    /// Concurrent workers (fixed mode only)
    #[arg(long, env = "CONCURRENCY", default_value = "1000")]
    pub concurrency: usize,

    /// Initial concurrency in ramp mode
    #[arg(long, env = "RAMP_START", default_value = "10")]
    pub ramp_start: usize,

    /// Concurrency added per ramp iteration
    #[arg(long, env = "RAMP_STEP", default_value = "100")]
    pub ramp_step: usize,

    /// Pause between ramp iterations in seconds
    #[arg(long, env = "COOLDOWN_SECS", default_value = "2")]
    pub cooldown_secs: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Base URL of the target service
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8888")]
    pub base_url: String,

    /// Value of the `id` query parameter
    #[arg(long, env = "ITEM_ID", default_value = "44")]
    pub item_id: u64,

    /// Treat a non-2xx response as a failed session
    #[arg(long, env = "FAIL_ON_STATUS")]
    pub fail_on_status: bool,

    /// Also print every result as a JSON line
    #[arg(long, env = "JSON")]
    pub json: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--sessions must be at least 1")]
    ZeroSessions,

    #[error("--sessions must be at most {max}, got {got}")]
    TooManySessions { got: usize, max: usize },

    #[error("--concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("--ramp-start must be at least 1")]
    ZeroRampStart,

    #[error("--ramp-step must be at least 1")]
    ZeroRampStep,

    #[error("--timeout-secs must be at least 1")]
    ZeroTimeout,

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl Config {
    /// Rejects values that would corrupt the load distribution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions == 0 {
            return Err(ConfigError::ZeroSessions);
        }
        if self.sessions > MAX_SESSIONS {
            return Err(ConfigError::TooManySessions {
                got: self.sessions,
                max: MAX_SESSIONS,
            });
        }
        if self.ramp {
            if self.ramp_start == 0 {
                return Err(ConfigError::ZeroRampStart);
            }
            if self.ramp_step == 0 {
                return Err(ConfigError::ZeroRampStep);
            }
        } else if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.targets()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn targets(&self) -> Result<TargetSet, ConfigError> {
        TargetSet::build(&self.base_url, self.item_id, self.staggered_mode)
    }
}

// =============================================================================
// Target Set
// =============================================================================

/// Ordered URLs fetched by every session. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    urls: Vec<Url>,
}

impl TargetSet {
    /// Normal mode fetches `/item`; staggered mode follows it with `/api/item`.
    pub fn build(base_url: &str, item_id: u64, staggered: bool) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }

        let endpoint = |path: &str| -> Result<Url, ConfigError> {
            let mut url = base.join(path).map_err(|e| invalid(e.to_string()))?;
            url.query_pairs_mut()
                .clear()
                .append_pair("id", &item_id.to_string());
            Ok(url)
        };

        let mut urls = vec![endpoint("/item")?];
        if staggered {
            urls.push(endpoint("/api/item")?);
        }

        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn is_staggered(&self) -> bool {
        self.urls.len() > 1
    }

    pub fn mode_description(&self) -> &'static str {
        if self.is_staggered() {
            "Staggered (page load + API call)"
        } else {
            "Normal (page load only)"
        }
    }
}
