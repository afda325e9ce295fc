//! Persistence writer for the shared articles table and the per-user
//! article sets.
//!
//! Conflict policy everywhere is last-write-wins: an upsert on an existing
//! key overwrites the whole row (no field merge). Article ids are assigned on
//! first insert and stay stable across later upserts of the same URL.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

use crate::model::{Article, UserArticleSet};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article {0} not found")]
    NotFound(i64),
    #[error("invalid article: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row timestamps (`published_at`, `updated_at`) are kept to millisecond
/// precision by every backend.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert or overwrite the row keyed by `article.url`; returns the stored row.
    async fn upsert_by_url(&self, article: &Article) -> StoreResult<Article>;

    async fn get_by_url(&self, url: &str) -> StoreResult<Option<Article>>;

    /// Articles whose symbol is in `symbols`, newest first.
    async fn list_by_symbols(&self, symbols: &[&str], limit: usize) -> StoreResult<Vec<Article>>;

    async fn list_by_symbol(&self, symbol: &str, limit: usize) -> StoreResult<Vec<Article>> {
        self.list_by_symbols(&[symbol], limit).await
    }

    /// Rewrite symbol and category of one row in place.
    async fn update_symbol(&self, id: i64, symbol: &str, category: &str) -> StoreResult<()>;

    /// Delete rows tagged with one of `symbols` published before `cutoff`.
    async fn delete_older_than(&self, symbols: &[&str], cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Insert or overwrite the set keyed by `(user_id, symbol)`.
    async fn upsert_user_articles(&self, set: &UserArticleSet) -> StoreResult<()>;

    async fn get_user_articles(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> StoreResult<Option<UserArticleSet>>;
}

pub type DynStore = Arc<dyn ArticleStore>;

/// Open the store named by `database_url` (`memory` or a sqlx SQLite URL).
pub async fn open(database_url: &str) -> anyhow::Result<DynStore> {
    let url = database_url.trim();
    if url.is_empty() || url.eq_ignore_ascii_case("memory") {
        tracing::info!("using in-memory article store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url).await?;
        tracing::info!(url, "using sqlite article store");
        return Ok(Arc::new(store));
    }
    anyhow::bail!("unsupported database_url: {url}")
}

fn stored_ts(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(3)
}

fn validate(article: &Article) -> StoreResult<()> {
    if article.url.trim().is_empty() {
        return Err(StoreError::Invalid("url is required".into()));
    }
    if article.symbol.trim().is_empty() {
        return Err(StoreError::Invalid("symbol is required".into()));
    }
    if let Some(c) = article.ai_confidence {
        if c > 100 {
            return Err(StoreError::Invalid(format!("ai_confidence {c} out of range")));
        }
    }
    Ok(())
}
