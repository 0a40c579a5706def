//! Score node: scores and summarizes an entry already carrying (or able
//! to reload) a category, with the normalization fallbacks the original
//! pipeline relies on for dynamic LLM JSON.

use std::str::FromStr;

use tracing::warn;

use crate::catalog::{Catalog, ScoreTag};
use crate::llm::{Message, PoolManager};
use crate::metrics::GRAPH_NODE_CALLS_TOTAL;

use super::json::extract_json;
use super::state::{ClassifyState, Node};
use super::GraphError;

const FALLBACK_SUMMARY: &str = "无有效摘要";

fn normalize_tag(raw: Option<&serde_json::Value>) -> ScoreTag {
    raw.and_then(|v| v.as_str())
        .and_then(|s| ScoreTag::from_str(s).ok())
        .unwrap_or(ScoreTag::Noise)
}

fn normalize_summary(raw: Option<&serde_json::Value>) -> String {
    match raw {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .first()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string()),
        Some(other @ serde_json::Value::Number(_)) | Some(other @ serde_json::Value::Bool(_)) => other.to_string(),
        _ => FALLBACK_SUMMARY.to_string(),
    }
}

/// Scores and summarizes the entry. Reloads `category` from the catalog
/// if not already in state (`NoCategory` if still missing). Always
/// transitions to `End` — score is the last node on any path.
pub async fn score_node(
    mut state: ClassifyState,
    catalog: &Catalog,
    pools: &PoolManager,
) -> Result<(ClassifyState, Node), GraphError> {
    if state.category.is_none() {
        let stored = catalog
            .get_category(state.entry_id)
            .await?
            .and_then(|row| crate::catalog::Category::from_str(&row.category).ok());
        match stored {
            Some(category) => state.category = Some(category),
            None => return Err(GraphError::NoCategory(state.entry_id)),
        }
    }

    let prompt = format!(
        "Score this article as one of actionable, systematic, or noise, and summarize it. \
         Respond with JSON {{\"tag\": <tag>, \"summary\": <text>}}.\n\n{}",
        state.content
    );
    let messages = vec![Message::system("You are a concise article scorer."), Message::human(prompt)];

    GRAPH_NODE_CALLS_TOTAL.with_label_values(&["score"]).inc();
    let pool = pools.get(Some("score"))?;
    let reply = match pool.call(&messages).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(entry_id = state.entry_id, error = %err, "score call failed");
            return Ok((state, Node::End));
        }
    };

    let json = extract_json(&reply);
    let tag = normalize_tag(json.as_ref().and_then(|v| v.get("tag")));
    let summary = normalize_summary(json.as_ref().and_then(|v| v.get("summary")));

    catalog.upsert_score(state.entry_id, tag).await?;
    catalog.upsert_summary(state.entry_id, &summary).await?;
    state.score = Some(tag);
    state.summary = Some(summary);

    Ok((state, Node::End))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_unknown_tag_to_noise() {
        let value = json!({"tag": "bogus"});
        assert_eq!(normalize_tag(value.get("tag")), ScoreTag::Noise);
    }

    #[test]
    fn normalizes_missing_tag_to_noise() {
        assert_eq!(normalize_tag(None), ScoreTag::Noise);
    }

    #[test]
    fn normalizes_valid_tag() {
        let value = json!({"tag": "actionable"});
        assert_eq!(normalize_tag(value.get("tag")), ScoreTag::Actionable);
    }

    #[test]
    fn normalizes_empty_summary_to_fallback() {
        let value = json!({"summary": ""});
        assert_eq!(normalize_summary(value.get("summary")), FALLBACK_SUMMARY);
    }

    #[test]
    fn normalizes_list_summary_to_first_element() {
        let value = json!({"summary": ["first", "second"]});
        assert_eq!(normalize_summary(value.get("summary")), "first");
    }

    #[test]
    fn normalizes_non_string_summary_to_string_cast() {
        let value = json!({"summary": 42});
        assert_eq!(normalize_summary(value.get("summary")), "42");
    }
}
