use anyhow::{Context, Result};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::resource::ResourceKind;

// Microsecond resolution, up to one minute per request.
const HISTOGRAM_MAX_US: u64 = 60_000_000;

// =============================================================================
// Stats Collector
// =============================================================================

/// Latencies per resource kind plus a global failure count, shared by all walkers.
///
/// Every mutation is append-only; nothing is ever removed during a run.
#[derive(Default)]
pub struct StatsCollector {
    latencies: Mutex<HashMap<ResourceKind, Vec<Duration>>>,
    failures: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, kind: ResourceKind, latency: Duration) {
        self.latencies
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push(latency);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Snapshot of the samples recorded for `kind`, in recording order.
    pub async fn samples(&self, kind: ResourceKind) -> Vec<Duration> {
        self.latencies
            .lock()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Builds the final report. Call only after every walker has finished.
    pub async fn report(&self) -> Result<StatsReport> {
        let latencies = self.latencies.lock().await;
        let mut labels = BTreeMap::new();

        for (kind, samples) in latencies.iter() {
            labels.insert(kind.as_str().to_string(), LabelReport::build(samples)?);
        }

        Ok(StatsReport {
            labels,
            failures: self.failures(),
        })
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub labels: BTreeMap<String, LabelReport>,
    pub failures: u64,
}

impl StatsReport {
    pub fn label(&self, kind: ResourceKind) -> Option<&LabelReport> {
        self.labels.get(kind.as_str())
    }
}

/// Latency summary for one label. Values are in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct LabelReport {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub samples_ms: Vec<f64>,
}

impl LabelReport {
    fn build(samples: &[Duration]) -> Result<Self> {
        let mut histogram = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_US, 3)
            .context("Failed to create latency histogram")?;

        for sample in samples {
            let micros = u64::try_from(sample.as_micros()).unwrap_or(u64::MAX);
            histogram.saturating_record(micros);
        }

        let to_ms = |micros: u64| micros as f64 / 1_000.0;

        Ok(Self {
            count: histogram.len(),
            min_ms: to_ms(histogram.min()),
            mean_ms: histogram.mean() / 1_000.0,
            p50_ms: to_ms(histogram.value_at_quantile(0.50)),
            p95_ms: to_ms(histogram.value_at_quantile(0.95)),
            p99_ms: to_ms(histogram.value_at_quantile(0.99)),
            max_ms: to_ms(histogram.max()),
            samples_ms: samples.iter().map(|d| d.as_secs_f64() * 1_000.0).collect(),
        })
    }
}
