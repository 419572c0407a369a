// src/ingest/classify.rs
//! Maps source-level failures onto the upstream-transient error codes.

use serde::{Deserialize, Serialize};

use super::types::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestErrorCode {
    Timeout,
    FetchBlocked,
    ExtractEmpty,
    UnsupportedFormat,
    Unknown,
}

impl IngestErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestErrorCode::Timeout => "TIMEOUT",
            IngestErrorCode::FetchBlocked => "FETCH_BLOCKED",
            IngestErrorCode::ExtractEmpty => "EXTRACT_EMPTY",
            IngestErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            IngestErrorCode::Unknown => "UNKNOWN",
        }
    }
}

/// Typed [`FetchError`] anywhere in the chain wins; otherwise the
/// lowercased message chain is matched against known phrases.
pub fn classify(err: &anyhow::Error) -> IngestErrorCode {
    if let Some(fe) = err.chain().find_map(|e| e.downcast_ref::<FetchError>()) {
        return match fe {
            FetchError::Timeout => IngestErrorCode::Timeout,
            FetchError::Blocked { .. } => IngestErrorCode::FetchBlocked,
            FetchError::Empty => IngestErrorCode::ExtractEmpty,
            FetchError::UnsupportedFormat(_) => IngestErrorCode::UnsupportedFormat,
            FetchError::Http(msg) => classify_message(msg),
        };
    }
    classify_message(&format!("{err:#}"))
}

pub fn classify_message(message: &str) -> IngestErrorCode {
    let m = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

    if has(&["timed out", "timeout", "deadline"]) {
        IngestErrorCode::Timeout
    } else if has(&[
        "403",
        "401",
        "429",
        "forbidden",
        "unauthorized",
        "too many requests",
        "blocked",
        "access denied",
    ]) {
        IngestErrorCode::FetchBlocked
    } else if has(&["empty", "no entries", "no items", "no content"]) {
        IngestErrorCode::ExtractEmpty
    } else if has(&["unsupported", "content-type", "not an rss", "xml", "parse", "syntax"]) {
        IngestErrorCode::UnsupportedFormat
    } else {
        IngestErrorCode::Unknown
    }
}
