// src/store/mod.rs
//! Storage contract consumed by the pipeline.
//!
//! The schema itself lives behind this trait; the pipeline only depends on
//! the narrow read/write operations below. Implementations must be
//! `Send + Sync` and apply [`Store::replace_digest_snapshot`] atomically
//! together with its disposition reset.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AsyncJob, DigestSnapshot, Disposition, JobStatus, JobType, NewSignal, Session, Signal, Source,
    WindowDays,
};
use crate::timezone::DayWindow;

pub use memory::MemoryStore;

/// Precondition for a snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// Fail with [`ReplaceOutcome::Conflict`] if a snapshot already exists.
    CreateOnly,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Written,
    Conflict,
}

/// Result of an insert-if-absent signal write.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Signal),
    /// `(source_id, canonical_url)` was already taken; carries the stored row.
    Exists(Signal),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>>;
    async fn list_enabled_sources(&self) -> Result<Vec<Source>>;
    async fn upsert_source(&self, source: &Source) -> Result<()>;
    /// Returns the updated source, or `None` if the id is unknown.
    async fn set_source_enabled(&self, id: &str, enabled: bool) -> Result<Option<Source>>;

    async fn get_signal(&self, id: &str) -> Result<Option<Signal>>;
    async fn find_signal_by_source_and_url(
        &self,
        source_id: &str,
        canonical_url: &str,
    ) -> Result<Option<Signal>>;
    async fn find_signal_by_content_hash(&self, content_hash: &str) -> Result<Option<Signal>>;
    /// Inserts unless `(source_id, canonical_url)` already exists. The check
    /// and the insert are one step, so concurrent ingests cannot both create.
    async fn create_signal(&self, new: NewSignal) -> Result<CreateOutcome>;
    /// Signals whose effective time falls inside `window`, newest first.
    async fn list_signals_between(&self, window: &DayWindow) -> Result<Vec<Signal>>;

    async fn find_digest_snapshot(
        &self,
        date_key: &str,
        window_days: WindowDays,
    ) -> Result<Option<DigestSnapshot>>;
    /// Write the snapshot and delete dispositions for `reset_dispositions_for`
    /// as one unit. On `Conflict` nothing is written.
    async fn replace_digest_snapshot(
        &self,
        snapshot: DigestSnapshot,
        mode: SnapshotWrite,
        reset_dispositions_for: &[String],
    ) -> Result<ReplaceOutcome>;
    async fn has_legacy_run(&self, date_key: &str) -> Result<bool>;
    async fn record_legacy_run(&self, date_key: &str) -> Result<()>;

    async fn find_disposition(&self, signal_id: &str) -> Result<Option<Disposition>>;
    async fn upsert_disposition(&self, disposition: Disposition) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<AsyncJob>>;
    async fn create_job(&self, session_id: &str, job_type: JobType) -> Result<AsyncJob>;
    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<AsyncJob>>;

    async fn find_session(&self, id: &str) -> Result<Option<Session>>;
    async fn create_session(&self, session: Session) -> Result<Session>;

    /// Persist a generated artifact and return its reference.
    async fn save_artifact(&self, job_id: &str, payload: serde_json::Value) -> Result<String>;
    async fn get_artifact(&self, result_ref: &str) -> Result<Option<serde_json::Value>>;
}
