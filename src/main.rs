//! signal-digest service entrypoint.
//! Loads config, seeds the store with configured sources and serves the API.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use signal_digest::config::AppConfig;
use signal_digest::ingest::rss::RssFetcher;
use signal_digest::ingest::scheduler::{spawn_ingest_scheduler, IngestSchedulerCfg};
use signal_digest::metrics::Metrics;
use signal_digest::store::{MemoryStore, Store};
use signal_digest::{router, AppState};

/// `DIGEST_LOG=json` switches to JSON lines; filter comes from `RUST_LOG`.
/// `try_init` leaves an already-installed subscriber (e.g. the runtime's) alone.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signal_digest=info,warn"));
    let json = std::env::var("DIGEST_LOG")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().map_err(anyhow::Error::from)?;
    // recorder first: the scheduler's first tick records immediately
    let metrics = Metrics::init(&cfg)?;

    let store = Arc::new(MemoryStore::new());
    for source in cfg.sources() {
        store.upsert_source(&source).await?;
    }
    let store: Arc<dyn Store> = store;

    let fetcher = Arc::new(RssFetcher::new(Duration::from_millis(cfg.fetch_timeout_ms))?);
    let generator = cfg.generation.build_generator();
    let state = AppState::build(&cfg, store, fetcher, generator, None)?;

    let _scheduler = spawn_ingest_scheduler(
        state.pool.clone(),
        IngestSchedulerCfg {
            interval_secs: cfg.scheduler_interval_secs,
            concurrency: cfg.ingest_concurrency,
        },
    );

    let app = router(state).merge(metrics.router());

    tracing::info!(
        target: "api",
        sources = cfg.sources.len(),
        timezone = %cfg.timezone,
        scheduler_secs = cfg.scheduler_interval_secs,
        "signal-digest ready"
    );
    Ok(app.into())
}
