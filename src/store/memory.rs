// src/store/memory.rs
//! In-memory [`Store`] used by the binary, tests and demos.
//!
//! All tables sit behind a single `RwLock`, so multi-table writes (snapshot +
//! disposition reset) are applied under one guard. No lock is held across
//! an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CreateOutcome, ReplaceOutcome, SnapshotWrite, Store};
use crate::models::{
    AsyncJob, DigestSnapshot, Disposition, JobStatus, JobType, NewSignal, Session, Signal, Source,
    WindowDays,
};
use crate::timezone::DayWindow;

#[derive(Default)]
struct Tables {
    sources: Vec<Source>,
    // insertion order doubles as a stable tie-breaker for listings
    signals: Vec<Signal>,
    by_source_url: HashMap<(String, String), usize>,
    by_hash: HashMap<String, usize>,
    snapshots: HashMap<(String, WindowDays), DigestSnapshot>,
    legacy_runs: HashSet<String>,
    dispositions: HashMap<String, Disposition>,
    jobs: HashMap<String, AsyncJob>,
    sessions: HashMap<String, Session>,
    artifacts: HashMap<String, serde_json::Value>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        let store = Self::new();
        store.write().sources = sources;
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.read().sources.clone())
    }

    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .read()
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn upsert_source(&self, source: &Source) -> Result<()> {
        let mut t = self.write();
        match t.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source.clone(),
            None => t.sources.push(source.clone()),
        }
        Ok(())
    }

    async fn set_source_enabled(&self, id: &str, enabled: bool) -> Result<Option<Source>> {
        let mut t = self.write();
        Ok(t.sources.iter_mut().find(|s| s.id == id).map(|s| {
            s.enabled = enabled;
            s.clone()
        }))
    }

    async fn get_signal(&self, id: &str) -> Result<Option<Signal>> {
        Ok(self.read().signals.iter().find(|s| s.id == id).cloned())
    }

    async fn find_signal_by_source_and_url(
        &self,
        source_id: &str,
        canonical_url: &str,
    ) -> Result<Option<Signal>> {
        let t = self.read();
        let key = (source_id.to_string(), canonical_url.to_string());
        Ok(t.by_source_url.get(&key).map(|&i| t.signals[i].clone()))
    }

    async fn find_signal_by_content_hash(&self, content_hash: &str) -> Result<Option<Signal>> {
        let t = self.read();
        Ok(t.by_hash.get(content_hash).map(|&i| t.signals[i].clone()))
    }

    async fn create_signal(&self, new: NewSignal) -> Result<CreateOutcome> {
        let mut t = self.write();
        let key = (new.source_id.clone(), new.canonical_url.clone());
        if let Some(&idx) = t.by_source_url.get(&key) {
            return Ok(CreateOutcome::Exists(t.signals[idx].clone()));
        }

        let signal = Signal {
            id: Uuid::new_v4().to_string(),
            source_id: new.source_id,
            title: new.title,
            canonical_url: new.canonical_url,
            guid: new.guid,
            published_at: new.published_at,
            summary: new.summary,
            raw_payload: new.raw_payload,
            content_hash: new.content_hash,
            created_at: Utc::now(),
        };

        let idx = t.signals.len();
        t.by_source_url.insert(key, idx);
        t.by_hash.entry(signal.content_hash.clone()).or_insert(idx);
        t.signals.push(signal.clone());
        Ok(CreateOutcome::Created(signal))
    }

    async fn list_signals_between(&self, window: &DayWindow) -> Result<Vec<Signal>> {
        let t = self.read();
        let mut out: Vec<Signal> = t
            .signals
            .iter()
            .filter(|s| window.contains(s.effective_at()))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.effective_at().cmp(&a.effective_at()));
        Ok(out)
    }

    async fn find_digest_snapshot(
        &self,
        date_key: &str,
        window_days: WindowDays,
    ) -> Result<Option<DigestSnapshot>> {
        Ok(self
            .read()
            .snapshots
            .get(&(date_key.to_string(), window_days))
            .cloned())
    }

    async fn replace_digest_snapshot(
        &self,
        snapshot: DigestSnapshot,
        mode: SnapshotWrite,
        reset_dispositions_for: &[String],
    ) -> Result<ReplaceOutcome> {
        let mut t = self.write();
        let key = (snapshot.date_key.clone(), snapshot.window_days);
        if mode == SnapshotWrite::CreateOnly && t.snapshots.contains_key(&key) {
            return Ok(ReplaceOutcome::Conflict);
        }
        for id in reset_dispositions_for {
            t.dispositions.remove(id);
        }
        t.snapshots.insert(key, snapshot);
        Ok(ReplaceOutcome::Written)
    }

    async fn has_legacy_run(&self, date_key: &str) -> Result<bool> {
        Ok(self.read().legacy_runs.contains(date_key))
    }

    async fn record_legacy_run(&self, date_key: &str) -> Result<()> {
        self.write().legacy_runs.insert(date_key.to_string());
        Ok(())
    }

    async fn find_disposition(&self, signal_id: &str) -> Result<Option<Disposition>> {
        Ok(self.read().dispositions.get(signal_id).cloned())
    }

    async fn upsert_disposition(&self, disposition: Disposition) -> Result<()> {
        self.write()
            .dispositions
            .insert(disposition.signal_id.clone(), disposition);
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<AsyncJob>> {
        Ok(self.read().jobs.get(id).cloned())
    }

    async fn create_job(&self, session_id: &str, job_type: JobType) -> Result<AsyncJob> {
        let now = Utc::now();
        let job = AsyncJob {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            job_type,
            status: JobStatus::Queued,
            error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
        };
        self.write().jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<AsyncJob>> {
        let mut t = self.write();
        Ok(t.jobs.get_mut(id).map(|job| {
            job.status = status;
            job.error = error;
            job.result_ref = result_ref;
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.read().sessions.get(id).cloned())
    }

    async fn create_session(&self, session: Session) -> Result<Session> {
        self.write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn save_artifact(&self, job_id: &str, payload: serde_json::Value) -> Result<String> {
        let result_ref = format!("artifact:{}", Uuid::new_v4());
        tracing::debug!(target: "jobs", job_id, %result_ref, "artifact stored");
        self.write().artifacts.insert(result_ref.clone(), payload);
        Ok(result_ref)
    }

    async fn get_artifact(&self, result_ref: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.read().artifacts.get(result_ref).cloned())
    }
}
