// src/jobs/worker.rs
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;

use super::artifact::Artifact;
use super::provider::{GenerationProvider, SessionContext};
use super::{JobError, JobRunner};
use crate::models::{AsyncJob, JobStatus};
use crate::store::Store;

/// Drives one job through `QUEUED|FAILED -> RUNNING -> DONE|FAILED`.
pub struct JobWorker {
    store: Arc<dyn Store>,
    generator: Arc<dyn GenerationProvider>,
}

impl JobWorker {
    pub fn new(store: Arc<dyn Store>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self { store, generator }
    }

    async fn context_for(&self, job: &AsyncJob) -> Result<SessionContext, JobError> {
        let session = self
            .store
            .find_session(&job.session_id)
            .await?
            .ok_or_else(|| JobError::SessionNotFound(job.session_id.clone()))?;
        let mut signals = Vec::with_capacity(session.signal_ids.len());
        for id in &session.signal_ids {
            if let Some(s) = self.store.get_signal(id).await? {
                signals.push(s);
            }
        }
        Ok(SessionContext { session, signals })
    }

    async fn execute(&self, job: &AsyncJob) -> Result<String, JobError> {
        let ctx = self.context_for(job).await?;
        let raw = self
            .generator
            .generate(job.job_type, &ctx)
            .await
            .map_err(|e| JobError::Generation(format!("{e:#}")))?;
        let artifact = Artifact::from_value(raw, job.job_type)?;
        let payload = serde_json::to_value(&artifact).map_err(anyhow::Error::from)?;
        Ok(self.store.save_artifact(&job.id, payload).await?)
    }

    async fn set_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<AsyncJob, JobError> {
        self.store
            .update_job_status(id, status, error, result_ref)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl JobRunner for JobWorker {
    async fn run(&self, job_id: &str) -> Result<AsyncJob, JobError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        match job.status {
            JobStatus::Done => {
                tracing::debug!(target: "jobs", job_id, "job already done");
                return Ok(job);
            }
            JobStatus::Running => {
                return Err(JobError::InvalidTransition {
                    id: job.id,
                    from: job.status,
                })
            }
            JobStatus::Queued | JobStatus::Failed => {}
        }

        let job = self.set_status(job_id, JobStatus::Running, None, None).await?;
        tracing::info!(
            target: "jobs",
            job_id,
            job_type = ?job.job_type,
            generator = self.generator.name(),
            "job running"
        );

        match self.execute(&job).await {
            Ok(result_ref) => {
                let done = self
                    .set_status(job_id, JobStatus::Done, None, Some(result_ref))
                    .await?;
                counter!("jobs_finished_total", "status" => "DONE").increment(1);
                tracing::info!(target: "jobs", job_id, "job done");
                Ok(done)
            }
            Err(err) => {
                let message = err.to_string();
                self.set_status(job_id, JobStatus::Failed, Some(message.clone()), None)
                    .await?;
                counter!("jobs_finished_total", "status" => "FAILED").increment(1);
                tracing::warn!(target: "jobs", job_id, error = %message, "job failed");
                Err(err)
            }
        }
    }
}
