//! Integration tests for the reasoning graph against a real Postgres
//! catalog. Require `DATABASE_URL` to point at a scratch database with
//! the migrations applied; skipped otherwise since there is no in-memory
//! Postgres substitute.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use osint_pipeline::catalog::Catalog;
use osint_pipeline::graph;
use osint_pipeline::llm::provider::{LlmError, LlmProvider, Message};
use osint_pipeline::llm::{LoadBalanceStrategy, ModelEndpoint, Pool, PoolConfig, PoolManager};

/// Replies with a fixed JSON string for every call, in order; panics if
/// called more times than it has replies for.
struct ScriptedProvider {
    replies: Vec<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn call(&self, _messages: &[Message]) -> Result<String, LlmError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(idx)
            .copied()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Status("scripted provider exhausted".to_string()))
    }
}

fn single_endpoint_pool(name: &str, replies: Vec<&'static str>) -> Arc<Pool> {
    Arc::new(Pool::new(
        name.to_string(),
        String::new(),
        vec![ModelEndpoint {
            provider: "test".to_string(),
            model: "test".to_string(),
            weight: 1,
        }],
        vec![Arc::new(ScriptedProvider {
            replies,
            calls: AtomicUsize::new(0),
        })],
        LoadBalanceStrategy::RoundRobin,
        PoolConfig {
            max_retries: 1,
            timeout: Duration::from_secs(5),
            concurrent_limit: 4,
            circuit_breaker_threshold: 100,
            circuit_breaker_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
        },
    ))
}

fn manager_with_nodes(pools: &[(&str, Arc<Pool>)]) -> PoolManager {
    let mut by_name = HashMap::new();
    let mut node_mapping = HashMap::new();
    for (node, pool) in pools {
        by_name.insert(pool.name.clone(), pool.clone());
        node_mapping.insert(node.to_string(), pool.name.clone());
    }
    PoolManager::new(by_name, node_mapping, None)
}

async fn connect() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.ok()?;
    sqlx::migrate!("./migrations").run(&pool).await.ok()?;
    Some(pool)
}

async fn seed_entry(catalog: &Catalog, link: &str, content: &str) -> i64 {
    let (feed_id, _) = catalog.upsert_feed(link, "feed", "", "en").await.unwrap();
    let published_at = Utc.with_ymd_and_hms(2025, 6, 4, 14, 15, 14).unwrap().naive_utc();
    let entry = catalog
        .insert_entry(feed_id, link, "title", "author", "summary", content, published_at)
        .await
        .unwrap();
    entry.id
}

#[tokio::test]
async fn fresh_article_is_tagged_reviewed_and_scored() {
    let Some(pool) = connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let catalog = Catalog::new(pool);
    let entry_id = seed_entry(&catalog, "https://example.com/a", "# Title\n\nBody.").await;

    let tagger = single_endpoint_pool("tagger-pool", vec![r#"{"name":"tech","classification_rationale":"looks technical"}"#]);
    let review = single_endpoint_pool("review-pool", vec![r#"{"approved":true}"#]);
    let score = single_endpoint_pool("score-pool", vec![r#"{"tag":"actionable","summary":"short"}"#]);
    let manager = manager_with_nodes(&[("tagger", tagger), ("tagger_review", review), ("score", score)]);

    let entry = catalog.find_entry_by_link("https://example.com/a").await.unwrap().unwrap();
    let outcome = graph::run(&entry, &catalog, &manager).await.unwrap();

    assert_eq!(outcome.tagger_calls, 1);
    let category = catalog.get_category(entry_id).await.unwrap().unwrap();
    assert_eq!(category.category, "tech");
    let score_row = catalog.get_score(entry_id).await.unwrap().unwrap();
    assert_eq!(score_row.score, "actionable");
    let summary_row = catalog.get_category(entry_id).await.unwrap();
    assert!(summary_row.is_some());
}

#[tokio::test]
async fn entry_with_category_only_skips_tagger_and_scores() {
    let Some(pool) = connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let catalog = Catalog::new(pool);
    let entry_id = seed_entry(&catalog, "https://example.com/b", "some content").await;
    catalog
        .upsert_category(entry_id, osint_pipeline::catalog::Category::Business, "preexisting")
        .await
        .unwrap();

    // A tagger pool with zero scripted replies: if the tagger node were
    // invoked, the call would fail and the run would end without a score.
    let tagger = single_endpoint_pool("tagger-pool", vec![]);
    let score = single_endpoint_pool("score-pool", vec![r#"{"tag":"systematic","summary":"ok"}"#]);
    let manager = manager_with_nodes(&[("tagger", tagger), ("score", score)]);

    let entry = catalog.find_entry_by_link("https://example.com/b").await.unwrap().unwrap();
    let outcome = graph::run(&entry, &catalog, &manager).await.unwrap();

    assert_eq!(outcome.tagger_calls, 0);
    let score_row = catalog.get_score(entry_id).await.unwrap().unwrap();
    assert_eq!(score_row.score, "systematic");
}

#[tokio::test]
async fn review_rejection_reaches_cap_and_force_accepts() {
    let Some(pool) = connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let catalog = Catalog::new(pool);
    let entry_id = seed_entry(&catalog, "https://example.com/c", "content").await;

    let tagger = single_endpoint_pool(
        "tagger-pool",
        vec![
            r#"{"name":"business","classification_rationale":"r1"}"#,
            r#"{"name":"business","classification_rationale":"r2"}"#,
            r#"{"name":"business","classification_rationale":"r3"}"#,
            r#"{"name":"business","classification_rationale":"r4"}"#,
        ],
    );
    let review = single_endpoint_pool(
        "review-pool",
        vec![
            r#"{"approved":false,"comment":"try again"}"#,
            r#"{"approved":false,"comment":"try again"}"#,
            r#"{"approved":false,"comment":"try again"}"#,
            r#"{"approved":false,"comment":"try again"}"#,
        ],
    );
    let score = single_endpoint_pool("score-pool", vec![r#"{"tag":"noise","summary":"n/a"}"#]);
    let manager = manager_with_nodes(&[("tagger", tagger), ("tagger_review", review), ("score", score)]);

    let entry = catalog.find_entry_by_link("https://example.com/c").await.unwrap().unwrap();
    let outcome = graph::run(&entry, &catalog, &manager).await.unwrap();

    assert_eq!(outcome.tagger_calls, 4, "tagger called at most MAX_TAGGER_RETRY_COUNT + 1 times");
    let category = catalog.get_category(entry_id).await.unwrap().unwrap();
    assert_eq!(category.category, "business");
    // business is not in the terminal set, so score still ran.
    assert!(catalog.get_score(entry_id).await.unwrap().is_some());
}

#[tokio::test]
async fn noise_score_terminates_without_downstream_work() {
    let Some(pool) = connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };
    let catalog = Catalog::new(pool);
    let entry_id = seed_entry(&catalog, "https://example.com/d", "content").await;

    let tagger = single_endpoint_pool("tagger-pool", vec![r#"{"name":"tech","classification_rationale":"r"}"#]);
    let review = single_endpoint_pool("review-pool", vec![r#"{"approved":true}"#]);
    let score = single_endpoint_pool("score-pool", vec![r#"{"tag":"noise","summary":"filler"}"#]);
    let manager = manager_with_nodes(&[("tagger", tagger), ("tagger_review", review), ("score", score)]);

    let entry = catalog.find_entry_by_link("https://example.com/d").await.unwrap().unwrap();
    let outcome = graph::run(&entry, &catalog, &manager).await.unwrap();

    assert_eq!(outcome.score, Some(osint_pipeline::catalog::ScoreTag::Noise));
    let category = catalog.get_category(entry_id).await.unwrap().unwrap();
    assert_eq!(category.category, "tech");
    let score_row = catalog.get_score(entry_id).await.unwrap().unwrap();
    assert_eq!(score_row.score, "noise");
}
