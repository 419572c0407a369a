// src/jobs/mod.rs
//! Background artifact jobs.
//!
//! [`JobQueue`] owns the set of job ids currently executing. `dispatch` is a
//! no-op for an id already in the set; the entry is removed by a drop guard
//! when the task ends, whether it finished, failed or panicked, so a failed
//! job can be dispatched again.

pub mod artifact;
pub mod provider;
pub mod worker;

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::models::{AsyncJob, JobStatus, JobType};
use crate::store::Store;

pub use worker::JobWorker;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(String),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("job {id} cannot start from {}", .from.as_str())]
    InvalidTransition { id: String, from: JobStatus },
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),
    #[error("job task aborted: {0}")]
    Aborted(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Registers HELP text; call after the recorder is installed.
pub(crate) fn describe_metrics() {
    describe_counter!("jobs_dispatched_total", "Jobs handed to a runner task.");
    describe_counter!(
        "jobs_deduplicated_total",
        "Dispatches ignored because the job was already in flight."
    );
    describe_counter!("jobs_finished_total", "Finished jobs by terminal status.");
}

#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job_id: &str) -> Result<AsyncJob, JobError>;
}

type InFlight = Arc<Mutex<HashSet<String>>>;

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    match set.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

struct InFlightGuard {
    set: InFlight,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.id);
    }
}

pub struct JobQueue {
    store: Arc<dyn Store>,
    runner: Arc<dyn JobRunner>,
    in_flight: InFlight,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            store,
            runner,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a QUEUED job for an existing session.
    pub async fn enqueue(&self, session_id: &str, job_type: JobType) -> Result<AsyncJob, JobError> {
        if self.store.find_session(session_id).await?.is_none() {
            return Err(JobError::SessionNotFound(session_id.to_string()));
        }
        let job = self.store.create_job(session_id, job_type).await?;
        tracing::info!(target: "jobs", job_id = %job.id, session_id, job_type = ?job_type, "job enqueued");
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> Result<AsyncJob, JobError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Spawn `runner.run(job_id)` unless that id is already in flight.
    /// Returns the task handle, or `None` when the call was a no-op.
    pub fn dispatch(&self, job_id: &str) -> Option<JoinHandle<Result<AsyncJob, JobError>>> {
        {
            let mut set = lock(&self.in_flight);
            if !set.insert(job_id.to_string()) {
                counter!("jobs_deduplicated_total").increment(1);
                tracing::debug!(target: "jobs", job_id, "dispatch ignored, already in flight");
                return None;
            }
        }
        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            id: job_id.to_string(),
        };
        let runner = self.runner.clone();
        let id = job_id.to_string();
        counter!("jobs_dispatched_total").increment(1);
        Some(tokio::spawn(async move {
            let _guard = guard;
            runner.run(&id).await
        }))
    }

    /// Dispatch and wait. If the job is already in flight, returns its
    /// current stored state instead of waiting on the other task.
    pub async fn run_now(&self, job_id: &str) -> Result<AsyncJob, JobError> {
        match self.dispatch(job_id) {
            Some(handle) => handle
                .await
                .map_err(|e| JobError::Aborted(e.to_string()))?,
            None => self.get(job_id).await,
        }
    }

    pub fn is_in_flight(&self, job_id: &str) -> bool {
        lock(&self.in_flight).contains(job_id)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}
