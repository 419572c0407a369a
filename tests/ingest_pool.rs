// tests/ingest_pool.rs
//
// Worker pool behavior against in-memory fixtures: dedupe, isolation,
// timeouts, exactly-once fetching and the freshness skip.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use signal_digest::ingest::classify::IngestErrorCode;
use signal_digest::ingest::fixture::{FixtureFetcher, FixtureResponse};
use signal_digest::ingest::scheduler::{spawn_ingest_scheduler, IngestSchedulerCfg};
use signal_digest::ingest::types::{FeedItem, FetchError, FetchPolicy};
use signal_digest::ingest::{IngestWorkerPool, PoolSettings};
use signal_digest::models::{
    AsyncJob, DigestSnapshot, Disposition, JobStatus, JobType, NewSignal, Session, Signal, Source,
    WindowDays,
};
use signal_digest::store::{CreateOutcome, MemoryStore, ReplaceOutcome, SnapshotWrite, Store};
use signal_digest::timezone::{resolve_window, DayWindow};

fn source(id: &str, url: &str) -> Source {
    Source {
        id: id.into(),
        feed_url: url.into(),
        display_name: format!("Source {id}"),
        enabled: true,
    }
}

fn pool_with(
    store: Arc<dyn Store>,
    fetcher: Arc<FixtureFetcher>,
    settings: PoolSettings,
) -> IngestWorkerPool {
    IngestWorkerPool::new(store, fetcher, settings)
}

#[tokio::test]
async fn shared_url_in_one_fetch_is_a_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(FixtureFetcher::new().with_items(
        "https://feed.test/a.xml",
        vec![
            FeedItem::new("First take", "https://news.test/story"),
            FeedItem::new("Second take", "https://news.test/story#comments"),
            FeedItem::new("Other story", "https://news.test/other"),
        ],
    ));
    let pool = pool_with(store.clone(), fetcher, PoolSettings::default());

    let summary = pool
        .ingest(
            vec![source("a", "https://feed.test/a.xml")],
            4,
            FetchPolicy::Force,
        )
        .await;

    assert_eq!(summary.sources, 1);
    assert_eq!(summary.signals, 2);
    assert_eq!(summary.duplicates, 1);
    assert!(summary.errors.is_empty());

    let kept = store
        .find_signal_by_source_and_url("a", "https://news.test/story")
        .await
        .unwrap()
        .expect("first occurrence stored");
    assert_eq!(kept.title, "First take");
}

#[tokio::test]
async fn second_run_reports_everything_as_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(FixtureFetcher::new().with_items(
        "https://feed.test/a.xml",
        vec![
            FeedItem::new("One", "https://news.test/1"),
            FeedItem::new("Two", "https://news.test/2"),
        ],
    ));
    let pool = pool_with(store, fetcher, PoolSettings::default());
    let sources = vec![source("a", "https://feed.test/a.xml")];

    let first = pool.ingest(sources.clone(), 2, FetchPolicy::Force).await;
    assert_eq!((first.signals, first.duplicates), (2, 0));

    let second = pool.ingest(sources, 2, FetchPolicy::Force).await;
    assert_eq!((second.signals, second.duplicates), (0, 2));
}

#[tokio::test]
async fn failing_source_does_not_stop_the_others() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with_items(
                "https://feed.test/ok.xml",
                vec![FeedItem::new("Works", "https://news.test/ok")],
            )
            .with(
                "https://feed.test/blocked.xml",
                FixtureResponse::Typed(FetchError::Blocked { status: 403 }),
            ),
    );
    let pool = pool_with(store, fetcher, PoolSettings::default());

    let summary = pool
        .ingest(
            vec![
                source("blocked", "https://feed.test/blocked.xml"),
                source("ok", "https://feed.test/ok.xml"),
            ],
            2,
            FetchPolicy::Force,
        )
        .await;

    assert_eq!(summary.signals, 1);
    assert_eq!(summary.errors.len(), 1);
    let err = &summary.errors[0];
    assert_eq!(err.source_id, "blocked");
    assert_eq!(err.code, IngestErrorCode::FetchBlocked);
    assert_eq!(err.feed_url, "https://feed.test/blocked.xml");
}

#[tokio::test]
async fn errors_are_reported_in_source_order() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with(
                "https://feed.test/slow.xml",
                FixtureResponse::Delayed(
                    Duration::from_millis(30),
                    Box::new(FixtureResponse::Fail("boom".into())),
                ),
            )
            .with_error("https://feed.test/fast.xml", "response body empty"),
    );
    let pool = pool_with(store, fetcher, PoolSettings::default());

    let summary = pool
        .ingest(
            vec![
                source("slow", "https://feed.test/slow.xml"),
                source("fast", "https://feed.test/fast.xml"),
            ],
            2,
            FetchPolicy::Force,
        )
        .await;

    let ids: Vec<_> = summary.errors.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "fast"]);
    assert_eq!(summary.errors[0].code, IngestErrorCode::Unknown);
    assert_eq!(summary.errors[1].code, IngestErrorCode::ExtractEmpty);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(FixtureFetcher::new().with(
        "https://feed.test/hang.xml",
        FixtureResponse::Delayed(
            Duration::from_secs(60),
            Box::new(FixtureResponse::Items(vec![FeedItem::new(
                "Too late",
                "https://news.test/late",
            )])),
        ),
    ));
    let settings = PoolSettings {
        fetch_timeout: Duration::from_millis(50),
        ..PoolSettings::default()
    };
    let pool = pool_with(store, fetcher, settings);

    let summary = pool
        .ingest(
            vec![source("hang", "https://feed.test/hang.xml")],
            1,
            FetchPolicy::Force,
        )
        .await;

    assert_eq!(summary.signals, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].code, IngestErrorCode::Timeout);
}

#[tokio::test]
async fn every_source_is_fetched_exactly_once() {
    let mut fixture = FixtureFetcher::new();
    let mut sources = Vec::new();
    for i in 0..12 {
        let url = format!("https://feed.test/{i}.xml");
        fixture = fixture.with(
            &url,
            FixtureResponse::Delayed(
                Duration::from_millis(5),
                Box::new(FixtureResponse::Items(vec![FeedItem::new(
                    format!("Story {i}"),
                    format!("https://news.test/{i}"),
                )])),
            ),
        );
        sources.push(source(&format!("s{i}"), &url));
    }
    let fetcher = Arc::new(fixture);
    let store = Arc::new(MemoryStore::new());
    let pool = pool_with(store, fetcher.clone(), PoolSettings::default());

    let summary = pool.ingest(sources, 3, FetchPolicy::Force).await;

    assert_eq!(summary.sources, 12);
    assert_eq!(summary.signals, 12);
    assert_eq!(fetcher.total_calls(), 12);
    for i in 0..12 {
        assert_eq!(fetcher.calls(&format!("https://feed.test/{i}.xml")), 1);
    }
}

#[tokio::test]
async fn respect_freshness_skips_recently_fetched_sources() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with_items(
                "https://feed.test/a.xml",
                vec![FeedItem::new("A", "https://news.test/a")],
            )
            .with_error("https://feed.test/broken.xml", "boom"),
    );
    let pool = pool_with(store, fetcher.clone(), PoolSettings::default());
    let sources = vec![
        source("a", "https://feed.test/a.xml"),
        source("broken", "https://feed.test/broken.xml"),
    ];

    pool.ingest(sources.clone(), 2, FetchPolicy::Force).await;
    assert_eq!(pool.cache().len(), 1, "only successful fetches are cached");

    let again = pool
        .ingest(sources.clone(), 2, FetchPolicy::RespectFreshness)
        .await;
    assert_eq!(again.skipped, 1);
    assert_eq!(again.errors.len(), 1, "failed source is retried");
    assert_eq!(fetcher.calls("https://feed.test/a.xml"), 1);
    assert_eq!(fetcher.calls("https://feed.test/broken.xml"), 2);

    let forced = pool.ingest(sources, 2, FetchPolicy::Force).await;
    assert_eq!(forced.skipped, 0);
    assert_eq!(fetcher.calls("https://feed.test/a.xml"), 2);
}

#[tokio::test]
async fn xml_fixture_is_parsed_and_stored() {
    let body = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
  <item>
    <title>Runtime &amp; SDK update</title>
    <link>https://news.test/rt</link>
    <guid isPermaLink="false">rt-1</guid>
    <description>&lt;p&gt;Details&lt;/p&gt;</description>
    <pubDate>Sun, 22 Feb 2026 10:00:00 +0000</pubDate>
  </item>
</channel></rss>"#;
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        FixtureFetcher::new().with("https://feed.test/rss.xml", FixtureResponse::Xml(body.into())),
    );
    let pool = pool_with(store.clone(), fetcher, PoolSettings::default());

    let summary = pool
        .ingest(
            vec![source("rss", "https://feed.test/rss.xml")],
            1,
            FetchPolicy::Force,
        )
        .await;
    assert_eq!(summary.signals, 1);

    let window = resolve_window("2026-02-22", "UTC").unwrap();
    let signals = store.list_signals_between(&window).await.unwrap();
    assert_eq!(signals.len(), 1);
    let s = &signals[0];
    assert_eq!(s.title, "Runtime & SDK update");
    assert_eq!(s.guid, "rt-1");
    assert_eq!(s.summary.as_deref(), Some("Details"));
    assert_eq!(
        s.published_at,
        Some(Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn ingest_enabled_ignores_disabled_sources() {
    let mut off = source("off", "https://feed.test/off.xml");
    off.enabled = false;
    let store = Arc::new(MemoryStore::with_sources(vec![
        source("on", "https://feed.test/on.xml"),
        off,
    ]));
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with_items("https://feed.test/on.xml", vec![FeedItem::new("On", "https://news.test/on")])
            .with_items("https://feed.test/off.xml", vec![FeedItem::new("Off", "https://news.test/off")]),
    );
    let pool = pool_with(store, fetcher.clone(), PoolSettings::default());

    let summary = pool.ingest_enabled(4, FetchPolicy::Force).await.unwrap();
    assert_eq!(summary.sources, 1);
    assert_eq!(fetcher.calls("https://feed.test/off.xml"), 0);
}

#[tokio::test]
async fn scheduler_is_disabled_with_zero_interval() {
    let pool = pool_with(
        Arc::new(MemoryStore::new()),
        Arc::new(FixtureFetcher::new()),
        PoolSettings::default(),
    );
    let handle = spawn_ingest_scheduler(
        pool,
        IngestSchedulerCfg {
            interval_secs: 0,
            concurrency: 2,
        },
    );
    assert!(handle.is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduler_respects_freshness_between_ticks() {
    let store = Arc::new(MemoryStore::with_sources(vec![source(
        "a",
        "https://feed.test/a.xml",
    )]));
    let fetcher = Arc::new(FixtureFetcher::new().with_items(
        "https://feed.test/a.xml",
        vec![FeedItem::new("A", "https://news.test/a")],
    ));
    let pool = pool_with(store, fetcher.clone(), PoolSettings::default());

    let handle = spawn_ingest_scheduler(
        pool,
        IngestSchedulerCfg {
            interval_secs: 60,
            concurrency: 2,
        },
    )
    .expect("scheduler enabled");

    // first tick fires immediately
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.calls("https://feed.test/a.xml"), 1);

    // second tick: still inside the source interval
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(fetcher.calls("https://feed.test/a.xml"), 1);

    handle.abort();
}

/// Delegates to a [`MemoryStore`] but yields after every lookup, so two
/// ingests can both miss the same item before either inserts it.
struct YieldingStore(MemoryStore);

#[async_trait]
impl Store for YieldingStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        self.0.list_sources().await
    }
    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        self.0.list_enabled_sources().await
    }
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        self.0.upsert_source(source).await
    }
    async fn set_source_enabled(&self, id: &str, enabled: bool) -> Result<Option<Source>> {
        self.0.set_source_enabled(id, enabled).await
    }
    async fn get_signal(&self, id: &str) -> Result<Option<Signal>> {
        self.0.get_signal(id).await
    }
    async fn find_signal_by_source_and_url(
        &self,
        source_id: &str,
        canonical_url: &str,
    ) -> Result<Option<Signal>> {
        let found = self.0.find_signal_by_source_and_url(source_id, canonical_url).await;
        tokio::task::yield_now().await;
        found
    }
    async fn find_signal_by_content_hash(&self, content_hash: &str) -> Result<Option<Signal>> {
        let found = self.0.find_signal_by_content_hash(content_hash).await;
        tokio::task::yield_now().await;
        found
    }
    async fn create_signal(&self, new: NewSignal) -> Result<CreateOutcome> {
        self.0.create_signal(new).await
    }
    async fn list_signals_between(&self, window: &DayWindow) -> Result<Vec<Signal>> {
        self.0.list_signals_between(window).await
    }
    async fn find_digest_snapshot(
        &self,
        date_key: &str,
        window_days: WindowDays,
    ) -> Result<Option<DigestSnapshot>> {
        self.0.find_digest_snapshot(date_key, window_days).await
    }
    async fn replace_digest_snapshot(
        &self,
        snapshot: DigestSnapshot,
        mode: SnapshotWrite,
        reset_dispositions_for: &[String],
    ) -> Result<ReplaceOutcome> {
        self.0
            .replace_digest_snapshot(snapshot, mode, reset_dispositions_for)
            .await
    }
    async fn has_legacy_run(&self, date_key: &str) -> Result<bool> {
        self.0.has_legacy_run(date_key).await
    }
    async fn record_legacy_run(&self, date_key: &str) -> Result<()> {
        self.0.record_legacy_run(date_key).await
    }
    async fn find_disposition(&self, signal_id: &str) -> Result<Option<Disposition>> {
        self.0.find_disposition(signal_id).await
    }
    async fn upsert_disposition(&self, disposition: Disposition) -> Result<()> {
        self.0.upsert_disposition(disposition).await
    }
    async fn get_job(&self, id: &str) -> Result<Option<AsyncJob>> {
        self.0.get_job(id).await
    }
    async fn create_job(&self, session_id: &str, job_type: JobType) -> Result<AsyncJob> {
        self.0.create_job(session_id, job_type).await
    }
    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<AsyncJob>> {
        self.0.update_job_status(id, status, error, result_ref).await
    }
    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        self.0.find_session(id).await
    }
    async fn create_session(&self, session: Session) -> Result<Session> {
        self.0.create_session(session).await
    }
    async fn save_artifact(&self, job_id: &str, payload: serde_json::Value) -> Result<String> {
        self.0.save_artifact(job_id, payload).await
    }
    async fn get_artifact(&self, result_ref: &str) -> Result<Option<serde_json::Value>> {
        self.0.get_artifact(result_ref).await
    }
}

#[tokio::test]
async fn racing_ingests_count_the_loser_as_duplicate() {
    let store = Arc::new(YieldingStore(MemoryStore::new()));
    let fetcher = Arc::new(FixtureFetcher::new().with_items(
        "https://feed.test/a.xml",
        vec![
            FeedItem::new("One", "https://news.test/1"),
            FeedItem::new("Two", "https://news.test/2"),
            FeedItem::new("Three", "https://news.test/3"),
        ],
    ));
    let pool = pool_with(store.clone(), fetcher, PoolSettings::default());
    let sources = vec![source("a", "https://feed.test/a.xml")];

    let (left, right) = tokio::join!(
        pool.ingest(sources.clone(), 1, FetchPolicy::Force),
        pool.ingest(sources.clone(), 1, FetchPolicy::Force),
    );

    assert!(left.errors.is_empty(), "{:?}", left.errors);
    assert!(right.errors.is_empty(), "{:?}", right.errors);
    assert_eq!(left.signals + right.signals, 3);
    assert_eq!(left.duplicates + right.duplicates, 3);

    for url in ["https://news.test/1", "https://news.test/2", "https://news.test/3"] {
        assert!(store
            .find_signal_by_source_and_url("a", url)
            .await
            .unwrap()
            .is_some());
    }
}
