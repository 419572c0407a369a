// src/ingest/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::normalize_text;
use super::types::{FeedFetcher, FeedItem, FetchError};

const SUMMARY_MAX_CHARS: usize = 1500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    id: Option<String>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Element whose attributes we ignore (`<guid isPermaLink=..>`, `<title type=..>`).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

fn text_of(node: &Option<TextNode>) -> Option<&str> {
    node.as_ref().and_then(|n| n.text.as_deref())
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn clean_summary(raw: Option<&str>) -> Option<String> {
    let s = normalize_text(raw?);
    if s.is_empty() {
        return None;
    }
    if s.chars().count() > SUMMARY_MAX_CHARS {
        return Some(s.chars().take(SUMMARY_MAX_CHARS).collect());
    }
    Some(s)
}

/// Parse an RSS 2.0 or Atom document into feed items.
///
/// An empty body, or a feed whose entries all lack both title and link,
/// is [`FetchError::Empty`]. A feed with zero entries is not an error.
pub fn parse_feed(body: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(FetchError::Empty.into());
    }
    let xml = scrub_html_entities_for_xml(trimmed);

    let (raw_count, items) = if xml.contains("<rss") {
        let rss: Rss = from_str(&xml)
            .map_err(|e| FetchError::UnsupportedFormat(format!("rss: {e}")))
            .context("parsing rss xml")?;
        let n = rss.channel.items.len();
        (n, rss.channel.items.into_iter().filter_map(rss_item).collect::<Vec<_>>())
    } else if xml.contains("<feed") {
        let feed: AtomFeed = from_str(&xml)
            .map_err(|e| FetchError::UnsupportedFormat(format!("atom: {e}")))
            .context("parsing atom xml")?;
        let n = feed.entries.len();
        (n, feed.entries.into_iter().filter_map(atom_entry).collect::<Vec<_>>())
    } else {
        return Err(FetchError::UnsupportedFormat("not an RSS or Atom document".into()).into());
    };

    if raw_count > 0 && items.is_empty() {
        return Err(FetchError::Empty.into());
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_parsed_total").increment(items.len() as u64);
    Ok(items)
}

fn rss_item(it: RssItem) -> Option<FeedItem> {
    let title = normalize_text(it.title.as_deref().unwrap_or_default());
    let url = it.link.as_deref().unwrap_or_default().trim().to_string();
    if title.is_empty() && url.is_empty() {
        return None;
    }
    let guid = text_of(&it.guid)
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| url.clone());
    let summary = clean_summary(it.description.as_deref());
    let published_at = it.pub_date.as_deref().and_then(parse_rfc2822);
    let raw_payload = serde_json::json!({
        "title": it.title,
        "link": it.link,
        "guid": text_of(&it.guid),
        "description": it.description,
        "pubDate": it.pub_date,
    });
    Some(FeedItem {
        title,
        url,
        guid,
        summary,
        published_at,
        raw_payload,
    })
}

fn atom_entry(e: AtomEntry) -> Option<FeedItem> {
    let title = normalize_text(text_of(&e.title).unwrap_or_default());
    let url = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .and_then(|l| l.href.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();
    if title.is_empty() && url.is_empty() {
        return None;
    }
    let summary_raw = text_of(&e.summary).or_else(|| text_of(&e.content));
    let guid = e
        .id
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url.clone());
    let published_at = e
        .published
        .as_deref()
        .or(e.updated.as_deref())
        .and_then(parse_rfc3339);
    let raw_payload = serde_json::json!({
        "title": text_of(&e.title),
        "link": &url,
        "id": e.id,
        "summary": summary_raw,
        "published": e.published,
        "updated": e.updated,
    });
    Some(FeedItem {
        title,
        url,
        guid,
        summary: clean_summary(summary_raw),
        published_at,
        raw_payload,
    })
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// HTTP fetcher for RSS/Atom feeds.
pub struct RssFetcher {
    client: reqwest::Client,
}

impl RssFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("signal-digest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

fn map_reqwest(e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        FetchError::Timeout.into()
    } else {
        FetchError::Http(e.to_string()).into()
    }
}

#[async_trait]
impl FeedFetcher for RssFetcher {
    async fn fetch_items(&self, feed_url: &str) -> Result<Vec<FeedItem>> {
        let resp = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = resp.status();
        if matches!(status.as_u16(), 401 | 403 | 429 | 451) {
            return Err(FetchError::Blocked {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(FetchError::Http(format!("unexpected status {status}")).into());
        }

        let body = resp.text().await.map_err(map_reqwest)?;
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}
