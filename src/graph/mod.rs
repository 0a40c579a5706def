//! Reasoning graph: an explicit iterative state machine
//! (`tagger -> tagger_review -> score`), never recursion, so the bounded
//! review-retry loop is just an integer counter in state.

pub mod json;
pub mod score;
pub mod state;
pub mod tagger;

use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, Category, Entry};
use crate::llm::{PoolError, PoolManager};

pub use state::{ClassifyState, GraphOutcome, Node};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("entry {0} has no category and none could be reloaded")]
    NoCategory(i64),
}

/// Runs the full graph for `entry`, resuming from whatever the catalog
/// already knows (so an interrupted pipeline resumes correctly on retry):
/// both category and score present ends immediately; only category
/// present enters at `score`; otherwise enters at `tagger`.
pub async fn run(entry: &Entry, catalog: &Catalog, pools: &PoolManager) -> Result<GraphOutcome, GraphError> {
    let category_row = catalog.get_category(entry.id).await?;
    let score_row = catalog.get_score(entry.id).await?;

    let mut state = ClassifyState::new(entry.id, entry.content.clone());
    if let Some(row) = &category_row {
        if let Ok(category) = Category::from_str(&row.category) {
            state.category = Some(category);
        }
    }

    let mut node = match (category_row.is_some(), score_row.is_some()) {
        (true, true) => Node::End,
        (true, false) => Node::Score,
        _ => Node::Tagger,
    };

    let mut tagger_calls = 0u32;
    while node != Node::End {
        let (next_state, next_node) = match node {
            Node::Tagger => {
                tagger_calls += 1;
                tagger::tagger_node(state, catalog, pools).await?
            }
            Node::TaggerReview => tagger::tagger_review_node(state, catalog, pools).await?,
            Node::Score => score::score_node(state, catalog, pools).await?,
            Node::End => unreachable!("loop condition excludes End"),
        };
        state = next_state;
        node = next_node;
    }

    info!(entry_id = entry.id, tagger_calls, "reasoning graph run complete");

    Ok(GraphOutcome {
        entry_id: entry.id,
        category: state.category,
        score: state.score,
        tagger_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tagger::MAX_TAGGER_RETRY_COUNT;

    #[test]
    fn tagger_call_bound_matches_retry_cap_plus_one() {
        assert_eq!(MAX_TAGGER_RETRY_COUNT + 1, 4);
    }
}
