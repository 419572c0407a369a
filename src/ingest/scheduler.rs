// src/ingest/scheduler.rs
use metrics::counter;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::types::FetchPolicy;
use super::IngestWorkerPool;
use crate::cache::now_ms;

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
    pub concurrency: usize,
}

/// Periodically ingest enabled sources, skipping those still inside their
/// freshness interval. Returns `None` when `interval_secs` is 0.
pub fn spawn_ingest_scheduler(
    pool: IngestWorkerPool,
    cfg: IngestSchedulerCfg,
) -> Option<JoinHandle<()>> {
    if cfg.interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            counter!("ingest_scheduler_ticks_total").increment(1);

            match pool
                .ingest_enabled(cfg.concurrency, FetchPolicy::RespectFreshness)
                .await
            {
                Ok(summary) => tracing::info!(
                    target: "ingest",
                    signals = summary.signals,
                    duplicates = summary.duplicates,
                    skipped = summary.skipped,
                    errors = summary.errors.len(),
                    "scheduled ingest tick"
                ),
                Err(e) => tracing::warn!(target: "ingest", error = %format!("{e:#}"), "scheduled ingest failed"),
            }

            let evicted = pool.cache().purge_expired(now_ms());
            if evicted > 0 {
                tracing::debug!(target: "ingest", evicted, "freshness cache purged");
            }
        }
    }))
}
