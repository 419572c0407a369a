// src/models.rs
//! Persisted entities shared by the ingest, digest and job pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A content feed configured by an operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub feed_url: String,
    pub display_name: String,
    pub enabled: bool,
}

/// One deduplicated item ingested from a source. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub canonical_url: String,
    pub guid: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub raw_payload: serde_json::Value,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Instant used to place the signal on the calendar.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// Insert payload for [`Signal`]; id and creation time are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub source_id: String,
    pub title: String,
    pub canonical_url: String,
    pub guid: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub raw_payload: serde_json::Value,
    pub content_hash: String,
}

/// Lightweight pointer returned by dedupe lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRef {
    pub id: String,
    pub source_id: String,
}

impl From<&Signal> for SignalRef {
    fn from(s: &Signal) -> Self {
        Self {
            id: s.id.clone(),
            source_id: s.source_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Label {
    #[serde(rename = "FYI")]
    Fyi,
    #[serde(rename = "DO")]
    Do,
    #[serde(rename = "DROP")]
    Drop,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Fyi => "FYI",
            Label::Do => "DO",
            Label::Drop => "DROP",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FYI" => Ok(Label::Fyi),
            "DO" => Ok(Label::Do),
            "DROP" => Ok(Label::Drop),
            other => Err(format!("unknown label '{other}'")),
        }
    }
}

/// User or system classification of a signal. At most one per signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    pub signal_id: String,
    pub label: Label,
    pub is_override: bool,
    pub updated_at: DateTime<Utc>,
}

/// Digest lookback length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum WindowDays {
    One,
    Three,
    Seven,
}

impl WindowDays {
    pub fn days(self) -> u8 {
        match self {
            WindowDays::One => 1,
            WindowDays::Three => 3,
            WindowDays::Seven => 7,
        }
    }
}

impl TryFrom<u8> for WindowDays {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(WindowDays::One),
            3 => Ok(WindowDays::Three),
            7 => Ok(WindowDays::Seven),
            other => Err(format!("windowDays must be 1, 3 or 7 (got {other})")),
        }
    }
}

impl From<WindowDays> for u8 {
    fn from(w: WindowDays) -> Self {
        w.days()
    }
}

impl FromStr for WindowDays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("windowDays must be 1, 3 or 7 (got '{s}')"))?;
        WindowDays::try_from(n)
    }
}

/// Stored digest row. The JSON columns are decoded (and validated) by
/// `digest::snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSnapshot {
    pub date_key: String,
    pub window_days: WindowDays,
    pub signal_ids_json: String,
    pub refresh_meta_json: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    InsightCard,
    EvidencePack,
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSIGHT_CARD" => Ok(JobType::InsightCard),
            "EVIDENCE_PACK" => Ok(JobType::EvidencePack),
            other => Err(format!("unknown job type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AsyncJob {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub error: Option<String>,
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Learning session handed to the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub signal_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_days_accepts_only_1_3_7() {
        assert_eq!("3".parse::<WindowDays>().unwrap(), WindowDays::Three);
        assert!("2".parse::<WindowDays>().is_err());
        assert!("x".parse::<WindowDays>().is_err());
        let w: WindowDays = serde_json::from_str("7").unwrap();
        assert_eq!(w, WindowDays::Seven);
        assert!(serde_json::from_str::<WindowDays>("5").is_err());
    }

    #[test]
    fn enums_serialize_in_wire_case() {
        assert_eq!(serde_json::to_string(&Label::Do).unwrap(), "\"DO\"");
        assert_eq!(
            serde_json::to_string(&JobType::EvidencePack).unwrap(),
            "\"EVIDENCE_PACK\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Queued).unwrap(),
            "\"QUEUED\""
        );
        assert_eq!("drop".parse::<Label>().unwrap(), Label::Drop);
    }
}
