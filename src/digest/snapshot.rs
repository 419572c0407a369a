// src/digest/snapshot.rs
//! Wire shapes of a stored digest and the views built from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::ingest::types::IngestSummary;
use crate::models::{DigestSnapshot, Label, WindowDays};
use crate::ranking::provider::RankingSource;
use crate::ranking::Role;
use crate::timezone::WindowError;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("digest for {date_key} ({window_days}d) already exists; pass overwrite=true to replace it")]
    AlreadyExists { date_key: String, window_days: u8 },
    #[error("signal {0} not found")]
    SignalNotFound(String),
    #[error("stored digest snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetMode {
    #[default]
    PreserveDispositions,
    ResetDispositions,
}

impl FromStr for ResetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PRESERVE_DISPOSITIONS" => Ok(ResetMode::PreserveDispositions),
            "RESET_DISPOSITIONS" => Ok(ResetMode::ResetDispositions),
            other => Err(format!(
                "resetMode must be PRESERVE_DISPOSITIONS or RESET_DISPOSITIONS (got '{other}')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefreshOptions {
    pub overwrite: bool,
    pub reset_mode: ResetMode,
    pub role: Option<Role>,
    pub window_days: Option<WindowDays>,
    pub limit: Option<usize>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    Initial,
    ManualOverwrite {
        #[serde(rename = "resetMode")]
        reset_mode: ResetMode,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RankedEntry {
    pub id: String,
    pub label: Label,
    pub rank_score: i64,
}

/// Everything recorded about how a snapshot was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshMeta {
    pub trigger: Trigger,
    pub role: Role,
    pub limit: usize,
    pub timezone: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub ingest: IngestSummary,
    pub ranked: Vec<RankedEntry>,
    pub ranking_source: RankingSource,
}

pub fn encode_snapshot(
    date_key: &str,
    window_days: WindowDays,
    meta: &RefreshMeta,
    updated_at: DateTime<Utc>,
) -> Result<DigestSnapshot, DigestError> {
    let ids: Vec<&str> = meta.ranked.iter().map(|r| r.id.as_str()).collect();
    let signal_ids_json = serde_json::to_string(&ids).map_err(anyhow::Error::from)?;
    let refresh_meta_json = serde_json::to_string(meta).map_err(anyhow::Error::from)?;
    Ok(DigestSnapshot {
        date_key: date_key.to_string(),
        window_days,
        signal_ids_json,
        refresh_meta_json,
        updated_at,
    })
}

/// Ordered signal ids of a snapshot. Duplicates mean corruption.
pub fn decode_signal_ids(snapshot: &DigestSnapshot) -> Result<Vec<String>, DigestError> {
    let ids: Vec<String> = serde_json::from_str(&snapshot.signal_ids_json)
        .map_err(|e| DigestError::SnapshotCorrupt(format!("signalIds: {e}")))?;
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(DigestError::SnapshotCorrupt(format!("duplicate signal id {dup}")));
    }
    Ok(ids)
}

/// Decode both JSON columns and check they describe the same ids.
pub fn decode_snapshot(snapshot: &DigestSnapshot) -> Result<(Vec<String>, RefreshMeta), DigestError> {
    let ids = decode_signal_ids(snapshot)?;
    let meta: RefreshMeta = serde_json::from_str(&snapshot.refresh_meta_json)
        .map_err(|e| DigestError::SnapshotCorrupt(format!("refreshMeta: {e}")))?;
    let ranked_ids = meta.ranked.iter().map(|r| r.id.as_str());
    if !ranked_ids.eq(ids.iter().map(String::as_str)) {
        return Err(DigestError::SnapshotCorrupt(
            "refreshMeta.ranked does not match signalIds".into(),
        ));
    }
    Ok((ids, meta))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestCounts {
    pub total: usize,
    pub pending: usize,
    pub processed: usize,
    pub later: usize,
    #[serde(rename = "do")]
    pub do_: usize,
    pub drop: usize,
}

impl DigestCounts {
    /// Fold one snapshot entry given its current disposition label.
    pub fn add(&mut self, disposition: Option<Label>) {
        self.total += 1;
        match disposition {
            None => self.pending += 1,
            Some(label) => {
                self.processed += 1;
                match label {
                    Label::Fyi => self.later += 1,
                    Label::Do => self.do_ += 1,
                    Label::Drop => self.drop += 1,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestItem {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub canonical_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub label: Label,
    pub rank_score: i64,
    pub disposition: Option<Label>,
    pub is_override: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestView {
    pub date_key: String,
    pub window_days: WindowDays,
    pub has_snapshot: bool,
    /// A pre-snapshot run exists for this date.
    pub legacy_run: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub counts: DigestCounts,
    pub items: Vec<DigestItem>,
    pub refresh: Option<RefreshMeta>,
}

impl DigestView {
    pub fn empty(date_key: &str, window_days: WindowDays, legacy_run: bool) -> Self {
        Self {
            date_key: date_key.to_string(),
            window_days,
            has_snapshot: false,
            legacy_run,
            generated_at: None,
            counts: DigestCounts::default(),
            items: Vec::new(),
            refresh: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStatus {
    pub has_digest: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub signal_count: usize,
    pub processed_count: usize,
}
