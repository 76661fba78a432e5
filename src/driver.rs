use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::scheduler::Scheduler;
use crate::stats::{StatsCollector, StatsReport};
use crate::walker::{Ending, WalkContext, WalkOutcome, Walker};

// =============================================================================
// Run Summary
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub walkers_spawned: usize,
    pub walks_completed: usize,
    pub walks_aborted: usize,
    pub walks_panicked: usize,
    pub max_concurrency: usize,
    pub peak_concurrency: usize,
    pub elapsed_ms: u64,
    pub stats: StatsReport,
    #[serde(skip)]
    pub outcomes: Vec<WalkOutcome>,
}

// =============================================================================
// Driver
// =============================================================================

/// Runs walkers under the scheduler for the configured duration, then drains.
pub struct Driver {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    stats: Arc<StatsCollector>,
}

impl Driver {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            stats: Arc::new(StatsCollector::new()),
        }
    }

    pub async fn run(self) -> Result<RunSummary> {
        self.config.validate().context("Invalid configuration")?;

        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.duration())
            .context("Test duration overflows the clock")?;
        let scheduler = Scheduler::new(self.config.max_concurrency, deadline);
        let spawn_delay = self.config.spawn_delay();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let ctx = Arc::new(WalkContext {
            base_url: self.config.base_url.clone(),
            fetcher: Arc::clone(&self.fetcher),
            stats: Arc::clone(&self.stats),
            action_pause: self.config.action_pause(),
        });

        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut handles: Vec<JoinHandle<WalkOutcome>> = Vec::new();

        info!(
            "Spawning walkers for {}s (max {} concurrent)",
            self.config.duration_secs, self.config.max_concurrency
        );

        loop {
            tokio::select! {
                biased;

                _ = ticker.tick() => {
                    info!(
                        "In use: {}/{}, spawned: {}",
                        scheduler.in_use(),
                        scheduler.max_concurrency(),
                        handles.len()
                    );
                }

                slot = scheduler.acquire() => {
                    let Some(slot) = slot else {
                        break;
                    };

                    sleep(spawn_delay.sample(&mut rng)).await;
                    if scheduler.is_expired() {
                        slot.release();
                        break;
                    }

                    let walker = Walker::new(
                        handles.len(),
                        Arc::clone(&ctx),
                        StdRng::seed_from_u64(rng.random()),
                    );
                    handles.push(tokio::spawn(async move {
                        let outcome = walker.run().await;
                        slot.release();
                        outcome
                    }));
                }
            }
        }

        let walkers_spawned = handles.len();
        info!(
            "Deadline reached after {} walkers, draining {} in flight",
            walkers_spawned,
            scheduler.in_use()
        );

        let mut outcomes = Vec::with_capacity(walkers_spawned);
        let mut walks_panicked = 0;
        for joined in futures_util::future::join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Walker task failed: {}", e);
                    walks_panicked += 1;
                }
            }
        }

        let walks_completed = outcomes
            .iter()
            .filter(|o| o.ending == Ending::Completed)
            .count();

        Ok(RunSummary {
            walkers_spawned,
            walks_completed,
            walks_aborted: outcomes.len() - walks_completed,
            walks_panicked,
            max_concurrency: scheduler.max_concurrency(),
            peak_concurrency: scheduler.peak_in_use(),
            elapsed_ms: duration_ms(started.elapsed()),
            stats: self.stats.report().await?,
            outcomes,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
