// src/ingest/mod.rs
pub mod classify;
pub mod fixture;
pub mod rss;
pub mod scheduler;
pub mod types;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::cache::{now_ms, Freshness, FreshnessCache};
use crate::dedupe::{content_hash, fingerprint_text, normalize_url, DedupeIndex, Fingerprint};
use crate::models::{NewSignal, Source};
use crate::store::{CreateOutcome, Store};
use classify::classify;
use types::{FeedFetcher, FeedItem, FetchError, FetchPolicy, FetchStamp, IngestSummary, SourceError};

pub const MAX_CONCURRENCY: usize = 8;

/// Registers HELP text; call after the recorder is installed.
pub(crate) fn describe_metrics() {
    describe_counter!("ingest_runs_total", "Ingest pool runs.");
    describe_counter!("ingest_signals_total", "Signals created by ingest.");
    describe_counter!(
        "ingest_duplicates_total",
        "Items dropped as duplicates (in-fetch or already stored)."
    );
    describe_counter!(
        "ingest_source_errors_total",
        "Source-level failures by classified code."
    );
    describe_counter!(
        "ingest_sources_skipped_total",
        "Sources skipped because their last fetch is still fresh."
    );
    describe_counter!("ingest_items_parsed_total", "Items parsed from feed bodies.");
    describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
    describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    describe_gauge!(
        "ingest_pipeline_last_run_ts",
        "Unix ts when the ingest pool last finished."
    );
}

/// Normalize feed text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(s);
    let out = RE_TAGS.replace_all(&decoded, "");
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// Workers actually spawned for `requested` over `sources` sources.
pub fn effective_concurrency(requested: usize, sources: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY).min(sources)
}

/// Key the item is unique on within its source.
pub fn canonical_url(item: &FeedItem, hash: &str) -> String {
    if let Some(u) = normalize_url(&item.url) {
        return u;
    }
    let url = item.url.trim();
    if !url.is_empty() {
        return url.to_string();
    }
    let guid = item.guid.trim();
    if !guid.is_empty() {
        return guid.to_string();
    }
    format!("urn:content:{hash}")
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub fetch_timeout: Duration,
    pub source_interval_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(10_000),
            source_interval_ms: 900_000,
            cache_ttl_ms: 3_600_000,
        }
    }
}

struct PoolInner {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FeedFetcher>,
    dedupe: DedupeIndex,
    cache: FreshnessCache<FetchStamp>,
    settings: PoolSettings,
}

/// Bounded-concurrency fetch-and-persist over a list of sources.
///
/// Cloning is cheap; clones share the dedupe chain and freshness cache.
#[derive(Clone)]
pub struct IngestWorkerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug, Default)]
struct SourceReport {
    index: usize,
    signals: usize,
    duplicates: usize,
    skipped: bool,
    error: Option<SourceError>,
}

impl IngestWorkerPool {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn FeedFetcher>, settings: PoolSettings) -> Self {
        let dedupe = DedupeIndex::new(store.clone());
        Self::with_dedupe(store, fetcher, dedupe, settings)
    }

    pub fn with_dedupe(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn FeedFetcher>,
        dedupe: DedupeIndex,
        settings: PoolSettings,
    ) -> Self {
        let cache = FreshnessCache::new(settings.cache_ttl_ms);
        Self {
            inner: Arc::new(PoolInner {
                store,
                fetcher,
                dedupe,
                cache,
                settings,
            }),
        }
    }

    pub fn cache(&self) -> &FreshnessCache<FetchStamp> {
        &self.inner.cache
    }

    pub fn fetcher_name(&self) -> &'static str {
        self.inner.fetcher.name()
    }

    /// Ingest every enabled source from the store.
    pub async fn ingest_enabled(&self, concurrency: usize, policy: FetchPolicy) -> Result<IngestSummary> {
        let sources = self
            .inner
            .store
            .list_enabled_sources()
            .await
            .context("listing enabled sources")?;
        Ok(self.ingest(sources, concurrency, policy).await)
    }

    /// Fetch `sources` with at most `concurrency` workers. Never fails as a
    /// whole: per-source failures land in [`IngestSummary::errors`].
    pub async fn ingest(
        &self,
        sources: Vec<Source>,
        concurrency: usize,
        policy: FetchPolicy,
    ) -> IngestSummary {
        let t0 = Instant::now();
        let total = sources.len();
        let workers = effective_concurrency(concurrency, total);
        let sources = Arc::new(sources);
        let cursor = Arc::new(AtomicUsize::new(0));

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let inner = self.inner.clone();
            let sources = sources.clone();
            let cursor = cursor.clone();
            set.spawn(async move {
                let mut reports = Vec::new();
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(source) = sources.get(index) else {
                        break;
                    };
                    reports.push(inner.process_source(index, source, policy).await);
                }
                reports
            });
        }

        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(mut r) => reports.append(&mut r),
                Err(e) => tracing::error!(target: "ingest", error = %e, "ingest worker aborted"),
            }
        }
        reports.sort_by_key(|r| r.index);

        let mut summary = IngestSummary {
            sources: total,
            ..Default::default()
        };
        for r in reports {
            summary.signals += r.signals;
            summary.duplicates += r.duplicates;
            if r.skipped {
                summary.skipped += 1;
            }
            if let Some(err) = r.error {
                summary.errors.push(err);
            }
        }

        counter!("ingest_runs_total").increment(1);
        counter!("ingest_signals_total").increment(summary.signals as u64);
        counter!("ingest_duplicates_total").increment(summary.duplicates as u64);
        counter!("ingest_sources_skipped_total").increment(summary.skipped as u64);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            target: "ingest",
            sources = summary.sources,
            workers,
            signals = summary.signals,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "ingest run finished"
        );
        summary
    }
}

impl PoolInner {
    async fn process_source(&self, index: usize, source: &Source, policy: FetchPolicy) -> SourceReport {
        let mut report = SourceReport {
            index,
            ..Default::default()
        };

        if policy == FetchPolicy::RespectFreshness {
            if let Some(hit) = self.cache.get(&source.id, now_ms()) {
                if hit.status == Freshness::Interval {
                    tracing::debug!(target: "ingest", source_id = %source.id, "source still fresh, skipping");
                    report.skipped = true;
                    return report;
                }
            }
        }

        if let Err(err) = self.fetch_and_store(source, &mut report).await {
            let code = classify(&err);
            counter!("ingest_source_errors_total", "code" => code.as_str()).increment(1);
            tracing::warn!(
                target: "ingest",
                source_id = %source.id,
                feed_url = %source.feed_url,
                code = code.as_str(),
                error = %format!("{err:#}"),
                "source failed"
            );
            report.error = Some(SourceError {
                source_id: source.id.clone(),
                source_name: source.display_name.clone(),
                feed_url: source.feed_url.clone(),
                code,
                message: format!("{err:#}"),
            });
        }
        report
    }

    async fn fetch_and_store(&self, source: &Source, report: &mut SourceReport) -> Result<()> {
        let t0 = Instant::now();
        let items = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.fetcher.fetch_items(&source.feed_url),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => return Err(FetchError::Timeout.into()),
        };
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let fetched = items.len();
        let mut seen_urls: HashSet<String> = HashSet::with_capacity(fetched);
        for item in items {
            let hash = content_hash(&fingerprint_text(&item.title, item.summary.as_deref()));
            let canonical = canonical_url(&item, &hash);
            if !seen_urls.insert(canonical.clone()) {
                report.duplicates += 1;
                continue;
            }

            let fp = Fingerprint {
                source_id: source.id.clone(),
                normalized_url: Some(canonical.clone()),
                content_hash: hash.clone(),
            };
            if self.dedupe.find_existing(&fp).await?.is_some() {
                report.duplicates += 1;
                continue;
            }

            let outcome = self
                .store
                .create_signal(NewSignal {
                    source_id: source.id.clone(),
                    title: item.title,
                    canonical_url: canonical,
                    guid: item.guid,
                    published_at: item.published_at,
                    summary: item.summary,
                    raw_payload: item.raw_payload,
                    content_hash: hash,
                })
                .await
                .with_context(|| format!("storing signal for source {}", source.id))?;
            match outcome {
                CreateOutcome::Created(_) => report.signals += 1,
                // another ingest stored it between the lookup and the insert
                CreateOutcome::Exists(_) => report.duplicates += 1,
            }
        }

        self.cache.set(
            source.id.clone(),
            FetchStamp {
                item_count: fetched,
                fetched_at_ms: now_ms(),
            },
            self.settings.source_interval_ms,
            now_ms(),
        );
        tracing::debug!(
            target: "ingest",
            source_id = %source.id,
            fetched,
            signals = report.signals,
            duplicates = report.duplicates,
            "source ingested"
        );
        Ok(())
    }
}
