//! Ingestion orchestrator: fans out feed ingestion across sources (in
//! sequence — each source's own concurrency lives inside the extractor),
//! then fans out reasoning over entries with a bounded worker pool.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, Entry};
use crate::extractor::WebExtractor;
use crate::graph;
use crate::ingest::ingest_source;
use crate::llm::PoolManager;
use crate::metrics::{CLASSIFY_ERRORS_TOTAL, CLASSIFY_PROCESSED_TOTAL, ENTRIES_INGESTED_TOTAL};
use crate::sources::Source;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOutcome {
    pub processed: u64,
    pub errors: u64,
}

pub struct Orchestrator {
    catalog: Catalog,
    extractor: Arc<WebExtractor>,
    pools: Arc<PoolManager>,
    fetch_week_weeks: u64,
    feed_proxy: Option<String>,
}

impl Orchestrator {
    pub fn new(
        catalog: Catalog,
        extractor: Arc<WebExtractor>,
        pools: Arc<PoolManager>,
        fetch_week_weeks: u64,
        feed_proxy: Option<String>,
    ) -> Self {
        Self {
            catalog,
            extractor,
            pools,
            fetch_week_weeks,
            feed_proxy,
        }
    }

    /// Ingests every source in sequence, then attaches entries published
    /// in the last 7 days that already have a category (periodic
    /// re-scoring of partially processed items).
    pub async fn ingest_all(&self, sources: &[Source]) -> Vec<Entry> {
        let mut written = Vec::new();

        for source in sources {
            match ingest_source(
                source,
                &self.extractor,
                &self.catalog,
                self.fetch_week_weeks,
                self.feed_proxy.as_deref(),
            )
            .await
            {
                Ok(entries) => {
                    info!(source = %source.name, count = entries.len(), "source ingested");
                    written.extend(entries);
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "source ingestion failed, skipping");
                }
            }
        }

        match self.catalog.recently_categorized_entries(7).await {
            Ok(entries) => written.extend(entries),
            Err(err) => warn!(error = %err, "failed to load recently categorized entries for re-scoring"),
        }

        ENTRIES_INGESTED_TOTAL.inc_by(written.len() as u64);
        written
    }

    /// Runs the reasoning graph over up to `limit` entries needing
    /// classification (or all, if `limit` is `None`), bounded by a
    /// semaphore of size `max_concurrent`. Per-entry errors are counted,
    /// never fatal to the batch.
    pub async fn classify(&self, limit: Option<i64>, max_concurrent: usize) -> ClassifyOutcome {
        let entries = match self.catalog.entries_needing_classification(limit).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "could not load entries for classification");
                return ClassifyOutcome::default();
            }
        };

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut tasks = FuturesUnordered::new();

        for entry in entries {
            let semaphore = semaphore.clone();
            let catalog = self.catalog.clone();
            let pools = self.pools.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await;
                graph::run(&entry, &catalog, &pools).await
            });
        }

        let mut outcome = ClassifyOutcome::default();
        while let Some(result) = tasks.next().await {
            match result {
                Ok(_) => {
                    outcome.processed += 1;
                    CLASSIFY_PROCESSED_TOTAL.inc();
                }
                Err(err) => {
                    outcome.errors += 1;
                    CLASSIFY_ERRORS_TOTAL.inc();
                    error!(error = %err, "reasoning graph run failed for entry");
                }
            }
        }

        outcome
    }
}
