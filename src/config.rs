use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use url::Url;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "transiter-loadtest")]
#[command(about = "Randomized traversal load test for a Transiter API", long_about = None)]
pub struct Config {
    /// Root URL of the API under test
    #[arg(long, env = "BASE_URL", default_value = "https://demo.transiter.dev")]
    pub base_url: Url,

    /// Total test duration in seconds; no walkers are spawned after it elapses
    #[arg(long, env = "DURATION_SECS", default_value = "50")]
    pub duration_secs: u64,

    /// Maximum number of concurrently running walkers
    #[arg(long, env = "MAX_CONCURRENCY", default_value = "50")]
    pub max_concurrency: usize,

    /// Lower bound of the delay before each spawn, in milliseconds
    #[arg(long, env = "MIN_SPAWN_DELAY_MS", default_value = "50")]
    pub min_spawn_delay_ms: u64,

    /// Upper bound of the delay before each spawn, in milliseconds
    #[arg(long, env = "MAX_SPAWN_DELAY_MS", default_value = "50")]
    pub max_spawn_delay_ms: u64,

    /// Lower bound of the pause between walker steps, in milliseconds
    #[arg(long, env = "MIN_ACTION_PAUSE_MS", default_value = "500")]
    pub min_action_pause_ms: u64,

    /// Upper bound of the pause between walker steps, in milliseconds
    #[arg(long, env = "MAX_ACTION_PAUSE_MS", default_value = "500")]
    pub max_action_pause_ms: u64,

    /// Seed for every random choice made during the run
    #[arg(long, env = "SEED", default_value = "303")]
    pub seed: u64,

    /// Per-request HTTP timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Interval between in-use reports, in milliseconds
    #[arg(long, env = "TICK_INTERVAL_MS", default_value = "1000")]
    pub tick_interval_ms: u64,

    /// Write a JSON report to this path
    #[arg(long, env = "OUTPUT")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("test duration must be at least 1 second")]
    ZeroDuration,

    #[error("tick interval must be at least 1 millisecond")]
    ZeroTickInterval,

    #[error("max concurrency {requested} exceeds the limit of {limit}")]
    ConcurrencyTooHigh { requested: usize, limit: usize },

    #[error("test duration of {secs}s cannot be scheduled")]
    DurationTooLong { secs: u64 },

    #[error("{name} range is inverted: min {min}ms > max {max}ms")]
    InvertedRange {
        name: &'static str,
        min: u64,
        max: u64,
    },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::ConcurrencyTooHigh {
                requested: self.max_concurrency,
                limit: Semaphore::MAX_PERMITS,
            });
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        if Instant::now().checked_add(self.duration()).is_none() {
            return Err(ConfigError::DurationTooLong {
                secs: self.duration_secs,
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        check_range("spawn delay", self.min_spawn_delay_ms, self.max_spawn_delay_ms)?;
        check_range(
            "action pause",
            self.min_action_pause_ms,
            self.max_action_pause_ms,
        )?;
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn spawn_delay(&self) -> DelayRange {
        DelayRange::from_millis(self.min_spawn_delay_ms, self.max_spawn_delay_ms)
    }

    pub fn action_pause(&self) -> DelayRange {
        DelayRange::from_millis(self.min_action_pause_ms, self.max_action_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn check_range(name: &'static str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedRange { name, min, max });
    }
    Ok(())
}

// =============================================================================
// Delay Ranges
// =============================================================================

/// Closed-open interval a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draws `min + (max - min) * u` with `u` uniform in `[0, 1)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let spread = self.max.saturating_sub(self.min);
        if spread.is_zero() {
            return self.min;
        }
        self.min + spread.mul_f64(rng.random::<f64>())
    }
}
