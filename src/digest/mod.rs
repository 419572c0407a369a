// src/digest/mod.rs
//! Per-day digest snapshots.
//!
//! A snapshot freezes the ranked signal ids for one `(date_key, window_days)`
//! pair. It is created by the first refresh and only replaced when the
//! caller explicitly asks to overwrite it; with `RESET_DISPOSITIONS` the
//! dispositions of every signal in the new snapshot are deleted in the same
//! store write.

pub mod snapshot;

use chrono::Utc;
use metrics::{counter, describe_counter};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ingest::types::FetchPolicy;
use crate::ingest::IngestWorkerPool;
use crate::models::{Disposition, Label, WindowDays};
use crate::ranking::provider::{rank_with_provider, RankingProvider};
use crate::ranking::{base_score, Candidate, Role};
use crate::store::{ReplaceOutcome, SnapshotWrite, Store};
use crate::timezone::{lookback_window, parse_date_key, parse_timezone};
pub use snapshot::{
    DigestCounts, DigestError, DigestItem, DigestStatus, DigestView, RankedEntry, RefreshMeta,
    RefreshOptions, ResetMode, Trigger,
};
use snapshot::{decode_signal_ids, decode_snapshot, encode_snapshot};

/// Registers HELP text; call after the recorder is installed.
pub(crate) fn describe_metrics() {
    describe_counter!(
        "digest_refresh_total",
        "Manual digest refreshes by outcome (created, overwritten, conflict, failed)."
    );
}

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub timezone: String,
    pub default_window: WindowDays,
    pub default_role: Role,
    pub default_limit: usize,
    pub ingest_concurrency: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            default_window: WindowDays::One,
            default_role: Role::General,
            default_limit: 30,
            ingest_concurrency: 4,
        }
    }
}

pub struct DigestSnapshotManager {
    store: Arc<dyn Store>,
    pool: IngestWorkerPool,
    ranking: Option<Arc<dyn RankingProvider>>,
    settings: DigestSettings,
    refresh_lock: Mutex<()>,
}

impl DigestSnapshotManager {
    pub fn new(store: Arc<dyn Store>, pool: IngestWorkerPool, settings: DigestSettings) -> Self {
        Self {
            store,
            pool,
            ranking: None,
            settings,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_ranking_provider(mut self, provider: Arc<dyn RankingProvider>) -> Self {
        self.ranking = Some(provider);
        self
    }

    pub fn settings(&self) -> &DigestSettings {
        &self.settings
    }

    pub async fn get_view(
        &self,
        date_key: &str,
        window_days: Option<WindowDays>,
    ) -> Result<DigestView, DigestError> {
        parse_date_key(date_key)?;
        let window = window_days.unwrap_or(self.settings.default_window);

        let Some(snap) = self.store.find_digest_snapshot(date_key, window).await? else {
            let legacy = self.store.has_legacy_run(date_key).await?;
            return Ok(DigestView::empty(date_key, window, legacy));
        };
        let (ids, meta) = decode_snapshot(&snap)?;

        let mut counts = DigestCounts::default();
        let mut items = Vec::with_capacity(ids.len());
        for (id, ranked) in ids.iter().zip(meta.ranked.iter()) {
            let Some(signal) = self.store.get_signal(id).await? else {
                tracing::warn!(target: "digest", signal_id = %id, date_key, "snapshot references a missing signal");
                continue;
            };
            let disposition = self.store.find_disposition(id).await?;
            counts.add(disposition.as_ref().map(|d| d.label));
            items.push(DigestItem {
                id: signal.id,
                source_id: signal.source_id,
                title: signal.title,
                canonical_url: signal.canonical_url,
                published_at: signal.published_at,
                summary: signal.summary,
                label: ranked.label,
                rank_score: ranked.rank_score,
                disposition: disposition.as_ref().map(|d| d.label),
                is_override: disposition.as_ref().is_some_and(|d| d.is_override),
            });
        }

        Ok(DigestView {
            date_key: date_key.to_string(),
            window_days: window,
            has_snapshot: true,
            legacy_run: self.store.has_legacy_run(date_key).await?,
            generated_at: Some(snap.updated_at),
            counts,
            items,
            refresh: Some(meta),
        })
    }

    pub async fn get_status(
        &self,
        date_key: &str,
        window_days: Option<WindowDays>,
    ) -> Result<DigestStatus, DigestError> {
        parse_date_key(date_key)?;
        let window = window_days.unwrap_or(self.settings.default_window);
        let Some(snap) = self.store.find_digest_snapshot(date_key, window).await? else {
            return Ok(DigestStatus {
                has_digest: false,
                generated_at: None,
                signal_count: 0,
                processed_count: 0,
            });
        };
        let ids = decode_signal_ids(&snap)?;
        let mut processed = 0;
        for id in &ids {
            if self.store.find_disposition(id).await?.is_some() {
                processed += 1;
            }
        }
        Ok(DigestStatus {
            has_digest: true,
            generated_at: Some(snap.updated_at),
            signal_count: ids.len(),
            processed_count: processed,
        })
    }

    /// Re-ingest, rank the window and replace the snapshot.
    ///
    /// Refuses with [`DigestError::AlreadyExists`] when a snapshot exists and
    /// `overwrite` is false; that check runs before any fetching.
    pub async fn manual_refresh(
        &self,
        date_key: &str,
        opts: RefreshOptions,
    ) -> Result<DigestView, DigestError> {
        let _guard = self.refresh_lock.lock().await;

        let window_days = opts.window_days.unwrap_or(self.settings.default_window);
        let timezone = opts
            .timezone
            .clone()
            .unwrap_or_else(|| self.settings.timezone.clone());
        parse_timezone(&timezone)?;
        let window = lookback_window(date_key, window_days.days(), &timezone)?;
        let role = opts.role.unwrap_or(self.settings.default_role);
        let limit = opts.limit.unwrap_or(self.settings.default_limit);

        let existing = self.store.find_digest_snapshot(date_key, window_days).await?;
        if existing.is_some() && !opts.overwrite {
            counter!("digest_refresh_total", "outcome" => "conflict").increment(1);
            return Err(conflict(date_key, window_days));
        }

        let ingest = match self
            .pool
            .ingest_enabled(self.settings.ingest_concurrency, FetchPolicy::Force)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                counter!("digest_refresh_total", "outcome" => "failed").increment(1);
                return Err(e.context("ingest before digest refresh").into());
            }
        };

        let signals = self.store.list_signals_between(&window).await?;
        let candidates: Vec<Candidate> = signals
            .iter()
            .map(|s| Candidate {
                id: s.id.clone(),
                title: s.title.clone(),
                summary: s.summary.clone(),
                base_score: base_score(s, window.end_exclusive, window_days.days()),
            })
            .collect();
        let (routed, ranking_source) =
            rank_with_provider(self.ranking.as_deref(), role, limit, &candidates).await;

        let ranked: Vec<RankedEntry> = routed
            .items
            .iter()
            .filter_map(|item| {
                let info = routed.by_id.get(&item.id)?;
                Some(RankedEntry {
                    id: item.id.clone(),
                    label: info.label,
                    rank_score: item.rank_score,
                })
            })
            .collect();

        let trigger = match existing {
            Some(_) => Trigger::ManualOverwrite {
                reset_mode: opts.reset_mode,
            },
            None => Trigger::Initial,
        };
        let reset_ids: Vec<String> = match trigger {
            Trigger::ManualOverwrite {
                reset_mode: ResetMode::ResetDispositions,
            } => ranked.iter().map(|r| r.id.clone()).collect(),
            _ => Vec::new(),
        };

        let meta = RefreshMeta {
            trigger,
            role,
            limit: crate::ranking::clamp_limit(limit),
            timezone,
            window_start: window.start,
            window_end: window.end_exclusive,
            ingest,
            ranked,
            ranking_source,
        };
        let snap = encode_snapshot(date_key, window_days, &meta, Utc::now())?;
        let mode = if opts.overwrite {
            SnapshotWrite::Overwrite
        } else {
            SnapshotWrite::CreateOnly
        };

        match self
            .store
            .replace_digest_snapshot(snap, mode, &reset_ids)
            .await?
        {
            ReplaceOutcome::Conflict => {
                counter!("digest_refresh_total", "outcome" => "conflict").increment(1);
                return Err(conflict(date_key, window_days));
            }
            ReplaceOutcome::Written => {}
        }

        let outcome = if matches!(trigger, Trigger::Initial) {
            "created"
        } else {
            "overwritten"
        };
        counter!("digest_refresh_total", "outcome" => outcome).increment(1);
        tracing::info!(
            target: "digest",
            date_key,
            window_days = window_days.days(),
            role = role.as_str(),
            outcome,
            signals = meta.ranked.len(),
            reset = reset_ids.len(),
            "digest refreshed"
        );

        drop(_guard);
        self.get_view(date_key, Some(window_days)).await
    }

    /// User override of a signal's label.
    pub async fn set_disposition(
        &self,
        signal_id: &str,
        label: Label,
    ) -> Result<Disposition, DigestError> {
        if self.store.get_signal(signal_id).await?.is_none() {
            return Err(DigestError::SignalNotFound(signal_id.to_string()));
        }
        let disposition = Disposition {
            signal_id: signal_id.to_string(),
            label,
            is_override: true,
            updated_at: Utc::now(),
        };
        self.store.upsert_disposition(disposition.clone()).await?;
        tracing::debug!(target: "digest", signal_id, label = label.as_str(), "disposition set");
        Ok(disposition)
    }
}

fn conflict(date_key: &str, window_days: WindowDays) -> DigestError {
    DigestError::AlreadyExists {
        date_key: date_key.to_string(),
        window_days: window_days.days(),
    }
}
