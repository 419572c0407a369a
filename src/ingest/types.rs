// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::IngestErrorCode;

/// One entry as returned by a feed, before dedupe.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub guid: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
}

impl FeedItem {
    /// Minimal item; guid defaults to the url.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let title = title.into();
        let url = url.into();
        let raw_payload = serde_json::json!({ "title": title, "link": url });
        Self {
            guid: url.clone(),
            title,
            url,
            summary: None,
            published_at: None,
            raw_payload,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_items(&self, feed_url: &str) -> Result<Vec<FeedItem>>;
    fn name(&self) -> &'static str;
}

/// Typed fetch failures; anything else is classified from its message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,
    #[error("fetch blocked by upstream (HTTP {status})")]
    Blocked { status: u16 },
    #[error("feed body was empty or had no usable entries")]
    Empty,
    #[error("unsupported feed format: {0}")]
    UnsupportedFormat(String),
    #[error("http error: {0}")]
    Http(String),
}

/// Per-source failure reported in [`IngestSummary::errors`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceError {
    pub source_id: String,
    pub source_name: String,
    pub feed_url: String,
    pub code: IngestErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub sources: usize,
    pub signals: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub errors: Vec<SourceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Always fetch every source.
    Force,
    /// Skip sources fetched successfully within their interval.
    RespectFreshness,
}

/// What the freshness cache remembers about a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStamp {
    pub item_count: usize,
    pub fetched_at_ms: u64,
}
