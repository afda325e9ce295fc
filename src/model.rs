//! Shared data model: stored articles, per-user article sets and
//! request-scoped article weights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A news article as stored in the shared articles table.
///
/// `url` is the natural dedup key; `id` is assigned by the store on first
/// insert and survives later upserts of the same URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub symbol: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub ai_sentiment: Option<String>,
    #[serde(default)]
    pub ai_confidence: Option<u8>,
    #[serde(default)]
    pub ai_reasoning: Option<String>,
}

impl Article {
    /// Text used by keyword rules: `title + " " + description`.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Per-user article set, keyed by `(user_id, symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserArticleSet {
    pub user_id: String,
    pub symbol: String,
    pub articles: Vec<Article>,
    pub updated_at: DateTime<Utc>,
}

/// Influence weight of one article within a single allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleWeight {
    pub article_index: usize,
    pub weight: u8,
    pub reasoning: String,
}

/// Article as sent to the weight allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDigest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl From<&Article> for ArticleDigest {
    fn from(a: &Article) -> Self {
        Self {
            title: a.title.clone(),
            description: a.description.clone(),
            published_at: Some(a.published_at.to_rfc3339()),
        }
    }
}
