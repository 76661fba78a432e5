//! Load-testing harness for a Transiter transit-data API.
//!
//! Simulated clients walk the system → route → stop hierarchy at random under a
//! bounded-concurrency scheduler, and per-resource latencies are collected for
//! a final report.

pub mod config;
pub mod driver;
pub mod fetcher;
pub mod report;
pub mod resource;
pub mod scheduler;
pub mod stats;
pub mod walker;

pub use config::{Config, ConfigError, DelayRange};
pub use driver::{Driver, RunSummary};
pub use fetcher::{fetch, FetchError, Fetched, Fetcher, FixtureFetcher, HttpFetcher};
pub use resource::ResourceKind;
pub use scheduler::{Scheduler, Slot};
pub use stats::{LabelReport, StatsCollector, StatsReport};
pub use walker::{
    select_service_map, Ending, WalkContext, WalkError, WalkOutcome, WalkState, Walker,
};
