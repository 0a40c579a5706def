//! Source ingester: the six-step per-source sync algorithm — full vs.
//! incremental sync, batch extraction, and one atomic catalog commit.

use std::time::Duration;

use chrono::{Days, Utc};
use tracing::{info, warn};

use crate::catalog::{Catalog, Entry};
use crate::errors::IngestError;
use crate::extractor::WebExtractor;
use crate::feed::FeedReader;
use crate::ratelimit::DelayOverride;
use crate::sources::Source;
use crate::time::{epoch, parse_feed_datetime};

/// Hosts known to rate-limit aggressively get a long built-in per-domain
/// delay, independent of any user-supplied override rule.
pub fn built_in_override(url: &str) -> Option<DelayOverride> {
    if url.contains("mp.weixin.qq.com") {
        return Some(DelayOverride {
            min_domain: Some(Duration::from_secs(15)),
            max_domain: Some(Duration::from_secs(30)),
            ..Default::default()
        });
    }
    None
}

/// Runs the six-step per-source algorithm. A transport error bubbles as
/// `IngestError`; a database error rolls back the whole batch via the
/// transaction below, so partial entries for a source are never
/// committed. Returns the entries written or updated this run.
pub async fn ingest_source(
    source: &Source,
    extractor: &WebExtractor,
    catalog: &Catalog,
    fetch_week_weeks: u64,
    proxy: Option<&str>,
) -> Result<Vec<Entry>, IngestError> {
    let mut reader = FeedReader::new(proxy);

    if !reader.parse(&source.url).await {
        info!(source = %source.name, url = %source.url, "feed parse failed, skipping");
        return Ok(Vec::new());
    }

    let Some(info) = reader.feed_info() else {
        warn!(source = %source.name, "feed had no usable metadata");
        return Ok(Vec::new());
    };

    let (feed_id, created) = catalog.upsert_feed(&info.link, &info.title, &info.description, &info.language).await?;

    if !created {
        let stored = catalog.get_feed(feed_id).await?;
        if let Some(stored) = stored {
            if stored.updated >= info.updated {
                info!(source = %source.name, "feed up to date, nothing to do");
                return Ok(Vec::new());
            }
        }
    }

    let window_start = if created {
        Utc::now()
            .naive_utc()
            .checked_sub_days(Days::new(fetch_week_weeks.saturating_mul(7)))
            .unwrap_or_else(epoch)
    } else {
        catalog.get_feed(feed_id).await?.map(|f| f.updated).unwrap_or_else(epoch)
    };

    let entries = reader.entries_between(window_start, info.updated);
    if entries.is_empty() {
        catalog.update_feed_watermark(feed_id, info.updated).await?;
        return Ok(Vec::new());
    }

    let urls: Vec<String> = entries.iter().map(|e| e.link.clone()).collect();
    let extracted = extractor.extract_many(&urls).await;

    let mut tx = catalog.pool().begin().await?;

    sqlx::query("UPDATE rss_feed SET updated = $2 WHERE id = $1")
        .bind(feed_id)
        .bind(info.updated)
        .execute(&mut *tx)
        .await?;

    let mut written_links = Vec::new();
    for entry in &entries {
        let published_at = parse_feed_datetime(&entry.published).unwrap_or_else(|_| epoch());
        let content = extracted
            .get(&entry.link)
            .filter(|r| r.ok)
            .and_then(|r| r.content.clone())
            .unwrap_or_else(|| entry.content.clone());

        let existing: Option<(i64, String)> = sqlx::query_as("SELECT id, content FROM rss_entry WHERE link = $1")
            .bind(&entry.link)
            .fetch_optional(&mut *tx)
            .await?;

        match existing {
            Some((id, existing_content)) if existing_content.trim().is_empty() => {
                sqlx::query("UPDATE rss_entry SET content = $2, published_at = $3 WHERE id = $1")
                    .bind(id)
                    .bind(&content)
                    .bind(published_at)
                    .execute(&mut *tx)
                    .await?;
                written_links.push(entry.link.clone());
            }
            Some(_) => {}
            None => {
                sqlx::query(
                    "INSERT INTO rss_entry (feed_id, link, title, author, summary, content, published_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(feed_id)
                .bind(&entry.link)
                .bind(&entry.title)
                .bind(&entry.author)
                .bind(&entry.summary)
                .bind(&content)
                .bind(published_at)
                .execute(&mut *tx)
                .await?;
                written_links.push(entry.link.clone());
            }
        }
    }

    tx.commit().await?;

    let mut written = Vec::with_capacity(written_links.len());
    for link in written_links {
        if let Some(entry) = catalog.find_entry_by_link(&link).await? {
            written.push(entry);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_strict_host_gets_a_long_delay() {
        let over = built_in_override("https://mp.weixin.qq.com/s/abc").expect("override present");
        assert!(over.min_domain.unwrap() >= Duration::from_secs(15));
    }

    #[test]
    fn unknown_host_has_no_override() {
        assert!(built_in_override("https://example.com/a").is_none());
    }
}
