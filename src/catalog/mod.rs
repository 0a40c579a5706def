//! Catalog store: a thin `sqlx::PgPool` wrapper exposing idempotent
//! upsert-by-natural-key operations over feeds, entries, and the three
//! per-entry reasoning outputs.

pub mod models;

use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::PgPool;

pub use models::{Category, Entry, EntryCategory, EntryScore, EntrySummary, Feed, ScoreTag};

use crate::time::epoch;

#[derive(Clone)]
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `upsertFeed`: creates the row with `updated = epoch` (the "needs
    /// full sync" sentinel) if it doesn't exist, otherwise leaves the
    /// stored row untouched. Returns `(id, created)`.
    pub async fn upsert_feed(
        &self,
        link: &str,
        title: &str,
        description: &str,
        language: &str,
    ) -> Result<(i64, bool), sqlx::Error> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM rss_feed WHERE link = $1")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((id,)) = existing {
            return Ok((id, false));
        }

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO rss_feed (link, title, description, language, updated)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (link) DO UPDATE SET link = EXCLUDED.link
             RETURNING id",
        )
        .bind(link)
        .bind(title)
        .bind(description)
        .bind(language)
        .bind(epoch())
        .fetch_one(&self.pool)
        .await?;

        Ok((id, true))
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>, sqlx::Error> {
        sqlx::query_as("SELECT id, link, title, description, language, updated FROM rss_feed WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_feed_watermark(&self, id: i64, updated: NaiveDateTime) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE rss_feed SET updated = $2 WHERE id = $1")
            .bind(id)
            .bind(updated)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_entry_by_link(&self, link: &str) -> Result<Option<Entry>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, feed_id, link, title, author, summary, content, published_at
             FROM rss_entry WHERE link = $1",
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn insert_entry(
        &self,
        feed_id: i64,
        link: &str,
        title: &str,
        author: &str,
        summary: &str,
        content: &str,
        published_at: NaiveDateTime,
    ) -> Result<Entry, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO rss_entry (feed_id, link, title, author, summary, content, published_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, feed_id, link, title, author, summary, content, published_at",
        )
        .bind(feed_id)
        .bind(link)
        .bind(title)
        .bind(author)
        .bind(summary)
        .bind(content)
        .bind(published_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_entry_content(
        &self,
        id: i64,
        content: &str,
        published_at: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE rss_entry SET content = $2, published_at = $3 WHERE id = $1")
            .bind(id)
            .bind(content)
            .bind(published_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_category(&self, entry_id: i64) -> Result<Option<EntryCategory>, sqlx::Error> {
        sqlx::query_as("SELECT entry_id, category, reason FROM entry_category WHERE entry_id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Generic upsert used by category/score/summary writes: idempotent by
    /// `entry_id`, second call with the same payload yields the same row
    /// with `created = false`.
    pub async fn upsert_category(
        &self,
        entry_id: i64,
        category: Category,
        reason: &str,
    ) -> Result<(EntryCategory, bool), sqlx::Error> {
        let existed: Option<(i64,)> = sqlx::query_as("SELECT entry_id FROM entry_category WHERE entry_id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        let row: EntryCategory = sqlx::query_as(
            "INSERT INTO entry_category (entry_id, category, reason)
             VALUES ($1, $2, $3)
             ON CONFLICT (entry_id) DO UPDATE SET category = EXCLUDED.category, reason = EXCLUDED.reason
             RETURNING entry_id, category, reason",
        )
        .bind(entry_id)
        .bind(category.to_string())
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok((row, existed.is_none()))
    }

    pub async fn get_score(&self, entry_id: i64) -> Result<Option<EntryScore>, sqlx::Error> {
        sqlx::query_as("SELECT entry_id, score FROM entry_scores WHERE entry_id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn upsert_score(&self, entry_id: i64, score: ScoreTag) -> Result<(EntryScore, bool), sqlx::Error> {
        let existed: Option<(i64,)> = sqlx::query_as("SELECT entry_id FROM entry_scores WHERE entry_id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        let row: EntryScore = sqlx::query_as(
            "INSERT INTO entry_scores (entry_id, score)
             VALUES ($1, $2)
             ON CONFLICT (entry_id) DO UPDATE SET score = EXCLUDED.score
             RETURNING entry_id, score",
        )
        .bind(entry_id)
        .bind(score.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok((row, existed.is_none()))
    }

    pub async fn upsert_summary(&self, entry_id: i64, ai_summary: &str) -> Result<(EntrySummary, bool), sqlx::Error> {
        let existed: Option<(i64,)> = sqlx::query_as("SELECT entry_id FROM entry_summary WHERE entry_id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        let row: EntrySummary = sqlx::query_as(
            "INSERT INTO entry_summary (entry_id, ai_summary)
             VALUES ($1, $2)
             ON CONFLICT (entry_id) DO UPDATE SET ai_summary = EXCLUDED.ai_summary
             RETURNING entry_id, ai_summary",
        )
        .bind(entry_id)
        .bind(ai_summary)
        .fetch_one(&self.pool)
        .await?;

        Ok((row, existed.is_none()))
    }

    /// Entries eligible for `classify`: missing either category or score.
    /// `limit = None` returns all such entries (`--ignore-limit`).
    pub async fn entries_needing_classification(&self, limit: Option<i64>) -> Result<Vec<Entry>, sqlx::Error> {
        let query = "SELECT e.id, e.feed_id, e.link, e.title, e.author, e.summary, e.content, e.published_at
             FROM rss_entry e
             LEFT JOIN entry_category c ON c.entry_id = e.id
             LEFT JOIN entry_scores s ON s.entry_id = e.id
             WHERE c.entry_id IS NULL OR s.entry_id IS NULL
             ORDER BY e.published_at DESC
             LIMIT $1";

        sqlx::query_as(query)
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
    }

    /// Entries published within the last `days` days that already have a
    /// category, for periodic re-scoring of partially processed items.
    pub async fn recently_categorized_entries(&self, days: i64) -> Result<Vec<Entry>, sqlx::Error> {
        let since = Utc::now().naive_utc() - Duration::days(days);
        sqlx::query_as(
            "SELECT e.id, e.feed_id, e.link, e.title, e.author, e.summary, e.content, e.published_at
             FROM rss_entry e
             INNER JOIN entry_category c ON c.entry_id = e.id
             WHERE e.published_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }
}
