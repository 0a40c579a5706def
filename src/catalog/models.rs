//! Catalog row types: feeds, entries, and the three per-entry reasoning
//! outputs (category, score, summary).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub link: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub updated: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub link: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub content: String,
    pub published_at: NaiveDateTime,
}

/// Closed tag set for `EntryCategory.category`. `Other` and `Aggregation`
/// are the terminal set: the graph ends without invoking score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Business,
    Experience,
    Other,
    Aggregation,
}

impl Category {
    pub fn is_terminal(self) -> bool {
        matches!(self, Category::Other | Category::Aggregation)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Tech => "tech",
            Category::Business => "business",
            Category::Experience => "experience",
            Category::Other => "other",
            Category::Aggregation => "aggregation",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tech" => Ok(Category::Tech),
            "business" => Ok(Category::Business),
            "experience" => Ok(Category::Experience),
            "other" => Ok(Category::Other),
            "aggregation" => Ok(Category::Aggregation),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntryCategory {
    pub entry_id: i64,
    pub category: String,
    pub reason: String,
}

/// Closed tag set for `EntryScore.score`. `Noise` ends the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTag {
    Actionable,
    Systematic,
    Noise,
}

impl fmt::Display for ScoreTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreTag::Actionable => "actionable",
            ScoreTag::Systematic => "systematic",
            ScoreTag::Noise => "noise",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScoreTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "actionable" => Ok(ScoreTag::Actionable),
            "systematic" => Ok(ScoreTag::Systematic),
            "noise" => Ok(ScoreTag::Noise),
            other => Err(format!("unknown score tag: {other}")),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntryScore {
    pub entry_id: i64,
    pub score: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EntrySummary {
    pub entry_id: i64,
    pub ai_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_display_and_fromstr() {
        for cat in [
            Category::Tech,
            Category::Business,
            Category::Experience,
            Category::Other,
            Category::Aggregation,
        ] {
            let s = cat.to_string();
            assert_eq!(Category::from_str(&s).unwrap(), cat);
        }
    }

    #[test]
    fn terminal_set_is_other_and_aggregation() {
        assert!(Category::Other.is_terminal());
        assert!(Category::Aggregation.is_terminal());
        assert!(!Category::Tech.is_terminal());
        assert!(!Category::Business.is_terminal());
        assert!(!Category::Experience.is_terminal());
    }

    #[test]
    fn unknown_category_string_is_an_error() {
        assert!(Category::from_str("bogus").is_err());
    }

    #[test]
    fn score_tag_round_trips() {
        for tag in [ScoreTag::Actionable, ScoreTag::Systematic, ScoreTag::Noise] {
            assert_eq!(ScoreTag::from_str(&tag.to_string()).unwrap(), tag);
        }
    }
}
