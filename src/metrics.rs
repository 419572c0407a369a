use anyhow::Context;
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shuttle_axum::axum::{routing::get, Router};

use crate::config::AppConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder, register descriptions and publish the
    /// static cache settings. Must run before anything records a metric.
    pub fn init(cfg: &AppConfig) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_all();
        publish_settings(cfg);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Descriptions for every series the crate emits.
pub fn describe_all() {
    crate::ingest::describe_metrics();
    crate::digest::describe_metrics();
    crate::jobs::describe_metrics();
    describe_gauge!("freshness_cache_ttl_ms", "Configured freshness cache TTL.");
    describe_gauge!(
        "freshness_source_interval_ms",
        "Configured per-source fetch interval."
    );
}

fn publish_settings(cfg: &AppConfig) {
    gauge!("freshness_cache_ttl_ms").set(cfg.cache_ttl_ms as f64);
    gauge!("freshness_source_interval_ms").set(cfg.source_interval_ms as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_reach_the_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_all();
            publish_settings(&AppConfig::default());
            metrics::counter!("ingest_runs_total").increment(1);
            metrics::counter!("jobs_dispatched_total").increment(1);
        });

        let out = handle.render();
        assert!(out.contains("# HELP ingest_runs_total Ingest pool runs."), "{out}");
        assert!(out.contains("# HELP jobs_dispatched_total"), "{out}");
        assert!(out.contains("# HELP freshness_cache_ttl_ms"), "{out}");
    }
}
