//! `feed_rs`-backed feed reader: fetch, parse, and filter entries by a
//! naive-UTC publish-time window.

use std::time::Instant;

use chrono::NaiveDateTime;
use feed_rs::model::Feed as RawFeed;
use tracing::warn;

use crate::extractor::html_markdown::html_to_markdown;
use crate::extractor::markdown::clean_markdown;
use crate::metrics::{FEEDS_FETCHED_TOTAL, FEED_FETCH_DURATION_SECONDS};
use crate::ratelimit::{random_headers, random_user_agent};
use crate::time::parse_feed_datetime;

#[derive(Debug, Clone)]
pub struct FeedInfo {
    pub title: String,
    pub description: String,
    pub link: String,
    pub language: String,
    pub updated: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published: String,
    pub summary: String,
    pub author: String,
    pub content: String,
}

/// Fetches a feed document over HTTP and parses it with `feed_rs`, keeping
/// the result for `feed_info`/`entries_between` to read.
pub struct FeedReader {
    client: reqwest::Client,
    feed: Option<RawFeed>,
    source_link: String,
}

impl FeedReader {
    pub fn new(proxy: Option<&str>) -> Self {
        let mut builder = reqwest::Client::builder().user_agent(random_user_agent());
        if let Some(proxy_url) = proxy {
            if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
        let client = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            feed: None,
            source_link: String::new(),
        }
    }

    /// Fetch and parse `url`. Returns `false` (and logs) on any transport or
    /// parse failure; never returns an `Err` to the caller.
    pub async fn parse(&mut self, url: &str) -> bool {
        self.source_link = url.to_string();
        FEEDS_FETCHED_TOTAL.inc();
        let start = Instant::now();

        let mut request = self.client.get(url);
        for (name, value) in random_headers() {
            request = request.header(name, value);
        }

        let bytes = match request.send().await {
            Ok(resp) => match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(url, error = %err, "failed to read feed body");
                    return false;
                }
            },
            Err(err) => {
                warn!(url, error = %err, "failed to fetch feed");
                return false;
            }
        };

        let result = match feed_rs::parser::parse(&bytes[..]) {
            Ok(feed) => {
                self.feed = Some(feed);
                true
            }
            Err(err) => {
                warn!(url, error = %err, "malformed feed");
                false
            }
        };
        FEED_FETCH_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        result
    }

    /// Feed-level metadata. `updated` falls back to the first entry's
    /// `published` when the feed itself declares none, and to "now" if
    /// neither is present.
    pub fn feed_info(&self) -> Option<FeedInfo> {
        let feed = self.feed.as_ref()?;

        let title = feed.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();
        let description = feed.description.as_ref().map(|t| t.content.clone()).unwrap_or_default();
        let language = feed.language.clone().unwrap_or_default();
        let link = feed
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_else(|| self.source_link.clone());

        let updated = feed
            .updated
            .map(crate::time::normalize_to_naive_utc)
            .or_else(|| feed.entries.first().and_then(|e| e.published).map(crate::time::normalize_to_naive_utc))
            .unwrap_or_else(|| parse_feed_datetime("").expect("empty string always parses"));

        Some(FeedInfo {
            title,
            description,
            link,
            language,
            updated,
        })
    }

    /// Entries whose parsed `published` time falls in `(start, end]`.
    /// Entries with no parseable `published` are skipped and logged.
    pub fn entries_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<FeedEntry> {
        let Some(feed) = self.feed.as_ref() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for entry in &feed.entries {
            let Some(published_raw) = entry.published.or(entry.updated) else {
                continue;
            };
            let published = crate::time::normalize_to_naive_utc(published_raw);
            if published <= start || published > end {
                continue;
            }

            let title = entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();
            let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
            let summary = entry.summary.as_ref().map(|t| t.content.clone()).unwrap_or_default();
            let author = entry
                .authors
                .first()
                .map(|p| p.name.clone())
                .unwrap_or_default();

            let raw_html = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .unwrap_or_else(|| summary.clone());
            let content = clean_markdown(&html_to_markdown(&raw_html));

            out.push(FeedEntry {
                title,
                link,
                published: published.to_string(),
                summary,
                author,
                content,
            });
        }

        out
    }
}
