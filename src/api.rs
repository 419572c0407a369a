// src/api.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shuttle_axum::axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::digest::{DigestSnapshotManager, RefreshOptions, ResetMode};
use crate::error::ApiError;
use crate::ingest::types::{FeedFetcher, FetchPolicy};
use crate::ingest::IngestWorkerPool;
use crate::jobs::provider::GenerationProvider;
use crate::jobs::{JobError, JobQueue, JobWorker};
use crate::models::{AsyncJob, JobType, Label, WindowDays};
use crate::ranking::provider::RankingProvider;
use crate::ranking::{Role, MAX_LIMIT, MIN_LIMIT};
use crate::store::Store;
use crate::timezone::{parse_date_key, parse_timezone};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub pool: IngestWorkerPool,
    pub digest: Arc<DigestSnapshotManager>,
    pub jobs: Arc<JobQueue>,
    pub ingest_concurrency: usize,
}

impl AppState {
    /// Wire the pipeline from config and the pluggable collaborators.
    pub fn build(
        cfg: &AppConfig,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn FeedFetcher>,
        generator: Arc<dyn GenerationProvider>,
        ranking: Option<Arc<dyn RankingProvider>>,
    ) -> anyhow::Result<Self> {
        let pool = IngestWorkerPool::new(store.clone(), fetcher, cfg.pool_settings());
        let mut digest = DigestSnapshotManager::new(store.clone(), pool.clone(), cfg.digest_settings()?);
        if let Some(p) = ranking {
            digest = digest.with_ranking_provider(p);
        }
        let worker = Arc::new(JobWorker::new(store.clone(), generator));
        let jobs = Arc::new(JobQueue::new(store.clone(), worker));
        Ok(Self {
            store,
            pool,
            digest: Arc::new(digest),
            jobs,
            ingest_concurrency: cfg.ingest_concurrency,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ingest/run", post(run_ingest))
        .route("/digest/{date}", get(get_digest))
        .route("/digest/{date}/refresh", post(refresh_digest))
        .route("/digest/{date}/status", get(digest_status))
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/signals/{id}/disposition", put(set_disposition))
        .route("/sources", get(list_sources))
        .route("/sources/{id}/enabled", put(set_source_enabled))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Decode a JSON body; malformed JSON or wrong field types are `INVALID_BODY`.
fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> ApiResult<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body[..]
    };
    serde_json::from_slice(raw).map_err(|e| ApiError::bad_request("INVALID_BODY", e.to_string()))
}

fn parse_window_days(raw: Option<&Value>) -> ApiResult<Option<WindowDays>> {
    let invalid = || ApiError::bad_request("INVALID_WINDOW_DAYS", "windowDays must be 1, 3 or 7");
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let n = n.as_u64().ok_or_else(invalid)?;
            let n = u8::try_from(n).map_err(|_| invalid())?;
            WindowDays::try_from(n).map(Some).map_err(|_| invalid())
        }
        Some(Value::String(s)) => s.parse::<WindowDays>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowQuery {
    window_days: Option<String>,
}

impl WindowQuery {
    fn window(&self) -> ApiResult<Option<WindowDays>> {
        parse_window_days(self.window_days.clone().map(Value::String).as_ref())
    }
}

async fn run_ingest(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state
        .pool
        .ingest_enabled(state.ingest_concurrency, FetchPolicy::Force)
        .await
        .map_err(|e| ApiError::internal("INGEST_FAILED", &e))?;
    Ok(Json(serde_json::to_value(summary).map_err(|e| {
        ApiError::internal("INGEST_FAILED", &anyhow::Error::from(e))
    })?))
}

async fn get_digest(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<Response> {
    parse_date_key(&date)?;
    let window = q.window()?;
    let view = state.digest.get_view(&date, window).await?;
    Ok(Json(view).into_response())
}

async fn digest_status(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<Response> {
    parse_date_key(&date)?;
    let window = q.window()?;
    let status = state.digest.get_status(&date, window).await?;
    Ok(Json(status).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    overwrite: Option<bool>,
    reset_mode: Option<String>,
    window_days: Option<Value>,
    limit: Option<Value>,
    role: Option<String>,
    timezone: Option<String>,
}

impl RefreshBody {
    fn into_options(self) -> ApiResult<RefreshOptions> {
        let reset_mode: ResetMode = self
            .reset_mode
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("INVALID_RESET_MODE", "resetMode is required"))?
            .parse()
            .map_err(|e: String| ApiError::bad_request("INVALID_RESET_MODE", e))?;
        let window_days = parse_window_days(self.window_days.as_ref())?;

        let limit = match self.limit {
            None | Some(Value::Null) => None,
            Some(v) => {
                let n = v
                    .as_u64()
                    .filter(|n| (MIN_LIMIT as u64..=MAX_LIMIT as u64).contains(n))
                    .ok_or_else(|| {
                        ApiError::bad_request("INVALID_LIMIT", "limit must be an integer in 1..=100")
                    })?;
                Some(n as usize)
            }
        };

        let role = self
            .role
            .as_deref()
            .map(str::parse::<Role>)
            .transpose()
            .map_err(|e| ApiError::bad_request("INVALID_ROLE", e))?;

        if let Some(tz) = self.timezone.as_deref() {
            parse_timezone(tz)?;
        }

        Ok(RefreshOptions {
            overwrite: self.overwrite.unwrap_or(false),
            reset_mode,
            role,
            window_days,
            limit,
            timezone: self.timezone,
        })
    }
}

async fn refresh_digest(
    State(state): State<AppState>,
    Path(date): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    parse_date_key(&date)?;
    let opts = parse_body::<RefreshBody>(&body)?.into_options()?;
    let view = state.digest.manual_refresh(&date, opts).await?;
    Ok(Json(view).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobBody {
    session_id: String,
    #[serde(rename = "type")]
    job_type: String,
    #[serde(default)]
    run_now: bool,
}

async fn create_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let req: CreateJobBody = parse_body(&body)?;
    let job_type: JobType = req
        .job_type
        .parse()
        .map_err(|e: String| ApiError::bad_request("INVALID_JOB_TYPE", e))?;

    let job = state.jobs.enqueue(req.session_id.trim(), job_type).await?;

    if !req.run_now {
        let _ = state.jobs.dispatch(&job.id);
        return Ok((StatusCode::ACCEPTED, Json(job)).into_response());
    }

    match state.jobs.run_now(&job.id).await {
        Ok(done) => Ok((StatusCode::OK, Json(done)).into_response()),
        // The failure is persisted on the job; report the job, not a transport error.
        Err(JobError::Generation(_) | JobError::InvalidArtifact(_) | JobError::SessionNotFound(_)) => {
            let failed = state.jobs.get(&job.id).await?;
            Ok((StatusCode::OK, Json(failed)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    #[serde(flatten)]
    job: AsyncJob,
    artifact: Option<Value>,
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<JobView>> {
    let job = state.jobs.get(&id).await?;
    let artifact = match job.result_ref.as_deref() {
        Some(r) => state
            .store
            .get_artifact(r)
            .await
            .map_err(|e| ApiError::internal("INTERNAL", &e))?,
        None => None,
    };
    Ok(Json(JobView { job, artifact }))
}

#[derive(Debug, Deserialize)]
struct DispositionBody {
    label: Value,
}

async fn set_disposition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let req: DispositionBody = parse_body(&body)?;
    let label: Label = req
        .label
        .as_str()
        .ok_or_else(|| ApiError::bad_request("INVALID_LABEL", "label must be FYI, DO or DROP"))?
        .parse()
        .map_err(|e: String| ApiError::bad_request("INVALID_LABEL", e))?;
    let d = state.digest.set_disposition(&id, label).await?;
    Ok(Json(d).into_response())
}

async fn list_sources(State(state): State<AppState>) -> ApiResult<Response> {
    let sources = state
        .store
        .list_sources()
        .await
        .map_err(|e| ApiError::internal("INTERNAL", &e))?;
    Ok(Json(sources).into_response())
}

#[derive(Debug, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

async fn set_source_enabled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let req: EnabledBody = parse_body(&body)?;
    let updated = state
        .store
        .set_source_enabled(&id, req.enabled)
        .await
        .map_err(|e| ApiError::internal("INTERNAL", &e))?
        .ok_or_else(|| ApiError::not_found("SOURCE_NOT_FOUND", format!("source {id} not found")))?;
    tracing::info!(target: "api", source_id = %id, enabled = req.enabled, "source toggled");
    Ok(Json(updated).into_response())
}
