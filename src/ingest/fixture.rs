// src/ingest/fixture.rs
//! In-memory [`FeedFetcher`] keyed by feed url. Used by tests and local demos.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::rss::parse_feed;
use super::types::{FeedFetcher, FeedItem, FetchError};

#[derive(Debug, Clone)]
pub enum FixtureResponse {
    Items(Vec<FeedItem>),
    /// Raw RSS/Atom body, parsed like a real response.
    Xml(String),
    Fail(String),
    Typed(FetchError),
    Delayed(Duration, Box<FixtureResponse>),
}

#[derive(Default)]
pub struct FixtureFetcher {
    feeds: Mutex<HashMap<String, FixtureResponse>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, feed_url: &str, response: FixtureResponse) -> Self {
        self.set(feed_url, response);
        self
    }

    pub fn with_items(self, feed_url: &str, items: Vec<FeedItem>) -> Self {
        self.with(feed_url, FixtureResponse::Items(items))
    }

    pub fn with_error(self, feed_url: &str, message: &str) -> Self {
        self.with(feed_url, FixtureResponse::Fail(message.to_string()))
    }

    /// Replace the response for `feed_url` (e.g. between two ingest runs).
    pub fn set(&self, feed_url: &str, response: FixtureResponse) {
        lock(&self.feeds).insert(feed_url.to_string(), response);
    }

    pub fn calls(&self, feed_url: &str) -> usize {
        lock(&self.calls).get(feed_url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

async fn respond(response: FixtureResponse) -> Result<Vec<FeedItem>> {
    let mut current = response;
    loop {
        match current {
            FixtureResponse::Items(items) => return Ok(items),
            FixtureResponse::Xml(body) => return parse_feed(&body),
            FixtureResponse::Fail(msg) => return Err(anyhow::anyhow!(msg)),
            FixtureResponse::Typed(e) => return Err(e.into()),
            FixtureResponse::Delayed(d, inner) => {
                tokio::time::sleep(d).await;
                current = *inner;
            }
        }
    }
}

#[async_trait]
impl FeedFetcher for FixtureFetcher {
    async fn fetch_items(&self, feed_url: &str) -> Result<Vec<FeedItem>> {
        *lock(&self.calls).entry(feed_url.to_string()).or_insert(0) += 1;
        let response = lock(&self.feeds).get(feed_url).cloned();
        match response {
            Some(r) => respond(r).await,
            None => Err(FetchError::Http(format!("no fixture registered for {feed_url}")).into()),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
