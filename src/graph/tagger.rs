//! Tagger and tagger-review nodes: propose a category, then run it
//! through a bounded-retry review loop before persisting.

use std::str::FromStr;

use tracing::{info, warn};

use crate::catalog::Category;
use crate::catalog::Catalog;
use crate::llm::{Message, PoolManager};
use crate::metrics::GRAPH_NODE_CALLS_TOTAL;

use super::json::extract_json;
use super::state::{ClassifyState, Node, TagResult};
use super::GraphError;

/// Tagger is re-entered at most this many times after an initial rejection.
pub const MAX_TAGGER_RETRY_COUNT: u32 = 3;

fn tagger_messages(state: &ClassifyState) -> Vec<Message> {
    let mut prompt = format!(
        "Classify the following article into a category. Respond with JSON \
         {{\"name\": <category>, \"classification_rationale\": <reason>}}.\n\n{}",
        state.content
    );
    if let Some(reason) = &state.tagger_refine_reason {
        prompt.push_str(&format!("\n\nPrevious attempt was rejected: {reason}"));
    }
    vec![Message::system("You are a precise content classifier."), Message::human(prompt)]
}

/// If `EntryCategory` already exists, short-circuits to `Score` with the
/// stored category. Otherwise calls the `tagger` node and proposes a tag.
pub async fn tagger_node(
    mut state: ClassifyState,
    catalog: &Catalog,
    pools: &PoolManager,
) -> Result<(ClassifyState, Node), GraphError> {
    if let Some(existing) = catalog.get_category(state.entry_id).await? {
        if let Ok(category) = Category::from_str(&existing.category) {
            state.category = Some(category);
            return Ok((state, Node::Score));
        }
    }

    GRAPH_NODE_CALLS_TOTAL.with_label_values(&["tagger"]).inc();
    let pool = pools.get(Some("tagger"))?;
    let reply = match pool.call(&tagger_messages(&state)).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(entry_id = state.entry_id, error = %err, "tagger call failed");
            return Ok((state, Node::End));
        }
    };

    let Some(json) = extract_json(&reply) else {
        warn!(entry_id = state.entry_id, "tagger reply had no parseable JSON");
        return Ok((state, Node::End));
    };

    let Some(name) = json.get("name").and_then(|v| v.as_str()) else {
        warn!(entry_id = state.entry_id, "tagger reply missing name");
        return Ok((state, Node::End));
    };

    let rationale = json
        .get("classification_rationale")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    state.tag_result = Some(TagResult {
        name: name.to_string(),
        classification_rationale: rationale,
    });

    Ok((state, Node::TaggerReview))
}

fn persisted_category(tag_name: &str) -> Category {
    Category::from_str(tag_name).unwrap_or(Category::Other)
}

/// Reviews the proposed tag; on rejection either refines and loops back
/// to `tagger` (bounded by `MAX_TAGGER_RETRY_COUNT`) or force-accepts.
pub async fn tagger_review_node(
    mut state: ClassifyState,
    catalog: &Catalog,
    pools: &PoolManager,
) -> Result<(ClassifyState, Node), GraphError> {
    let tag_result = state.tag_result.clone().expect("tagger_review entered without a proposed tag");

    let prompt = format!(
        "Review this proposed category: \"{}\" (reason: \"{}\"). Respond with JSON \
         {{\"approved\": <bool>, \"reason\": <text>, \"comment\": <text, optional>}}.\n\n{}",
        tag_result.name, tag_result.classification_rationale, state.content
    );
    let messages = vec![Message::system("You are a careful classification reviewer."), Message::human(prompt)];

    GRAPH_NODE_CALLS_TOTAL.with_label_values(&["tagger_review"]).inc();
    let pool = pools.get(Some("tagger_review"))?;
    let reply = match pool.call(&messages).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(entry_id = state.entry_id, error = %err, "tagger_review call failed");
            return Ok((state, Node::End));
        }
    };

    let Some(json) = extract_json(&reply) else {
        warn!(entry_id = state.entry_id, "tagger_review reply had no parseable JSON");
        return Ok((state, Node::End));
    };

    let approved = json.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
    let reason = json.get("reason").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let comment = json.get("comment").and_then(|v| v.as_str()).map(str::to_string);

    if !approved && state.tagger_retry_count < MAX_TAGGER_RETRY_COUNT {
        state.tagger_refine_reason = comment;
        state.tagger_retry_count += 1;
        return Ok((state, Node::Tagger));
    }

    if !approved {
        info!(entry_id = state.entry_id, "tagger review cap reached, force-accepting proposal");
    }

    let category = persisted_category(&tag_result.name);
    catalog.upsert_category(state.entry_id, category, &reason).await?;
    state.category = Some(category);

    let next = if category.is_terminal() { Node::End } else { Node::Score };
    Ok((state, next))
}
