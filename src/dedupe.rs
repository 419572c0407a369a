// src/dedupe.rs
//! Duplicate detection for ingested items.
//!
//! A [`Fingerprint`] carries the normalized URL (if the item had a parseable
//! one) and a SHA-256 of its trimmed text. [`DedupeIndex`] evaluates an
//! ordered list of [`FingerprintMatcher`]s and stops at the first hit:
//!
//! 1. [`UrlMatcher`]: same source, same normalized URL,
//! 2. [`ContentHashMatcher`]: same text hash, any source.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::Url;

use crate::models::SignalRef;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub source_id: String,
    pub normalized_url: Option<String>,
    pub content_hash: String,
}

impl Fingerprint {
    pub fn new(source_id: &str, url: &str, text: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            normalized_url: normalize_url(url),
            content_hash: content_hash(text),
        }
    }
}

/// Strip the fragment and lowercase the host. `None` for unparseable input.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = Url::parse(trimmed).ok()?;
    url.set_fragment(None);
    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower != host {
            url.set_host(Some(&lower)).ok()?;
        }
    }
    Some(url.to_string())
}

/// Hex SHA-256 of the trimmed text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Text an item is hashed on: title and summary, one per line.
pub fn fingerprint_text(title: &str, summary: Option<&str>) -> String {
    format!("{}\n{}", title.trim(), summary.unwrap_or_default().trim())
}

#[async_trait]
pub trait FingerprintMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn find(&self, fp: &Fingerprint, store: &dyn Store) -> Result<Option<SignalRef>>;
}

pub struct UrlMatcher;

#[async_trait]
impl FingerprintMatcher for UrlMatcher {
    fn name(&self) -> &'static str {
        "url"
    }

    async fn find(&self, fp: &Fingerprint, store: &dyn Store) -> Result<Option<SignalRef>> {
        let Some(url) = fp.normalized_url.as_deref() else {
            return Ok(None);
        };
        Ok(store
            .find_signal_by_source_and_url(&fp.source_id, url)
            .await?
            .as_ref()
            .map(SignalRef::from))
    }
}

pub struct ContentHashMatcher;

#[async_trait]
impl FingerprintMatcher for ContentHashMatcher {
    fn name(&self) -> &'static str {
        "content_hash"
    }

    async fn find(&self, fp: &Fingerprint, store: &dyn Store) -> Result<Option<SignalRef>> {
        Ok(store
            .find_signal_by_content_hash(&fp.content_hash)
            .await?
            .as_ref()
            .map(SignalRef::from))
    }
}

pub struct DedupeIndex {
    store: Arc<dyn Store>,
    matchers: Vec<Box<dyn FingerprintMatcher>>,
}

impl DedupeIndex {
    /// URL first, then content hash.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            matchers: vec![Box::new(UrlMatcher), Box::new(ContentHashMatcher)],
        }
    }

    /// Append a matcher evaluated after the existing ones.
    pub fn with_matcher(mut self, matcher: Box<dyn FingerprintMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    pub async fn find_existing(&self, fp: &Fingerprint) -> Result<Option<SignalRef>> {
        for matcher in &self.matchers {
            if let Some(hit) = matcher.find(fp, self.store.as_ref()).await? {
                tracing::trace!(target: "ingest", matcher = matcher.name(), signal_id = %hit.id, "dedupe hit");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}
