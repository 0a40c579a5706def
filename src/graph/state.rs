//! Per-run state for the reasoning graph: carried across node
//! transitions by value, never by hidden mutation.

use crate::catalog::{Category, ScoreTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Tagger,
    TaggerReview,
    Score,
    End,
}

#[derive(Debug, Clone)]
pub struct TagResult {
    pub name: String,
    pub classification_rationale: String,
}

#[derive(Debug, Clone)]
pub struct ClassifyState {
    pub entry_id: i64,
    pub content: String,
    pub tag_result: Option<TagResult>,
    pub category: Option<Category>,
    pub score: Option<ScoreTag>,
    pub summary: Option<String>,
    pub tagger_refine_reason: Option<String>,
    pub tagger_retry_count: u32,
}

impl ClassifyState {
    pub fn new(entry_id: i64, content: String) -> Self {
        Self {
            entry_id,
            content,
            tag_result: None,
            category: None,
            score: None,
            summary: None,
            tagger_refine_reason: None,
            tagger_retry_count: 0,
        }
    }
}

/// What happened to an entry by the time the graph reached `End`.
#[derive(Debug, Clone)]
pub struct GraphOutcome {
    pub entry_id: i64,
    pub category: Option<Category>,
    pub score: Option<ScoreTag>,
    pub tagger_calls: u32,
}
