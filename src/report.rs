use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::driver::RunSummary;

// =============================================================================
// Summary Output
// =============================================================================

pub fn print_summary(summary: &RunSummary) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║                    LOAD TEST SUMMARY                       ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    info!("");
    info!("Walker Metrics:");
    info!("  Spawned:             {}", summary.walkers_spawned);
    info!("  Completed:           {}", summary.walks_completed);
    info!("  Aborted:             {}", summary.walks_aborted);
    info!("  Panicked:            {}", summary.walks_panicked);
    info!(
        "  Peak Concurrency:    {}/{}",
        summary.peak_concurrency, summary.max_concurrency
    );
    info!("  Elapsed:             {}ms", summary.elapsed_ms);
    info!("  Failed Requests:     {}", summary.stats.failures);

    if summary.stats.labels.is_empty() {
        info!("");
        info!("Latency: no data");
    }

    for (label, report) in &summary.stats.labels {
        info!("");
        info!("{} Latency (ms, {} samples):", label, report.count);
        info!("  Min:    {:.2}", report.min_ms);
        info!("  Mean:   {:.2}", report.mean_ms);
        info!("  p50:    {:.2}", report.p50_ms);
        info!("  p95:    {:.2}", report.p95_ms);
        info!("  p99:    {:.2}", report.p99_ms);
        info!("  Max:    {:.2}", report.max_ms);
    }

    info!("");
    info!("═══════════════════════════════════════════════════════════");

    // Raw sequences go to stdout regardless of the log filter.
    for (label, report) in &summary.stats.labels {
        let samples: Vec<String> = report
            .samples_ms
            .iter()
            .map(|ms| format!("{:.3}ms", ms))
            .collect();
        println!("{} [{}]", label, samples.join(" "));
    }
    println!("failures {}", summary.stats.failures);
}

pub fn write_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = sonic_rs::to_string_pretty(summary).context("Failed to serialize run summary")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;

    info!("Report written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use crate::stats::StatsCollector;
    use sonic_rs::JsonValueTrait;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_json_contains_labels_and_counts() {
        let stats = StatsCollector::new();
        stats.record(ResourceKind::Stop, Duration::from_millis(12)).await;
        stats.record_failure();

        let summary = RunSummary {
            walkers_spawned: 3,
            walks_completed: 2,
            walks_aborted: 1,
            walks_panicked: 0,
            max_concurrency: 5,
            peak_concurrency: 2,
            elapsed_ms: 1_500,
            stats: stats.report().await.unwrap(),
            outcomes: Vec::new(),
        };

        let path = std::env::temp_dir()
            .join(format!("transiter-loadtest-{}", std::process::id()))
            .join("report.json");
        write_json(&summary, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let value: sonic_rs::Value = sonic_rs::from_str(&written).unwrap();
        assert_eq!(value["walkers_spawned"].as_u64(), Some(3));
        assert_eq!(value["stats"]["failures"].as_u64(), Some(1));
        assert_eq!(value["stats"]["labels"]["stop"]["count"].as_u64(), Some(1));
        assert!(value.get("outcomes").is_none());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
