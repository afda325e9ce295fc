// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::config::{RetentionConfig, SchedulerConfig};
use crate::ingest::Ingestor;
use crate::reclassify::Reclassifier;

/// Spawn the periodic ingest loop. Each tick:
/// 1) ingest the configured symbols, 2) general headlines,
/// 3) retention sweep, 4) reclassification of general headlines.
///
/// Sweep and reclassify failures are logged and swallowed; the next tick
/// simply tries again.
pub fn spawn_ingest_scheduler(
    cfg: SchedulerConfig,
    retention: RetentionConfig,
    ingestor: Arc<Ingestor>,
    reclassifier: Arc<Reclassifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_tick(&cfg, &retention, &ingestor, &reclassifier).await;
        }
    })
}

pub async fn run_tick(
    cfg: &SchedulerConfig,
    retention: &RetentionConfig,
    ingestor: &Ingestor,
    reclassifier: &Reclassifier,
) {
    counter!("ingest_runs_total").increment(1);

    let report = ingestor.run(&cfg.symbols).await;

    if cfg.include_general {
        match ingestor.ingest_general().await {
            Ok(r) => tracing::info!(target: "ingest", stored = r.stored, "general headlines ingested"),
            Err(e) => tracing::warn!(target: "ingest", error = %e, "general headline fetch failed"),
        }
    }

    if let Err(e) = ingestor.sweep_general(retention.general_max_age_days).await {
        tracing::warn!(target: "ingest", error = %e, "retention sweep failed");
    }

    match reclassifier.run().await {
        Ok(r) => tracing::info!(target: "ingest", updated = r.updated_count, "reclassify pass done"),
        Err(e) => tracing::warn!(target: "ingest", error = %e, "reclassify pass failed"),
    }

    tracing::info!(
        target: "ingest",
        stored = report.total_stored,
        failed = report.failed.len(),
        "scheduled ingest tick"
    );
}
