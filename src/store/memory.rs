//! In-memory store used for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{stored_ts, validate, ArticleStore, StoreError, StoreResult};
use crate::model::{Article, UserArticleSet};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    /// url -> row
    articles: HashMap<String, Article>,
    /// (user_id, symbol) -> set
    user_articles: HashMap<(String, String), UserArticleSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn upsert_by_url(&self, article: &Article) -> StoreResult<Article> {
        validate(article)?;
        let mut t = self.inner.write().await;
        let id = match t.articles.get(&article.url).and_then(|a| a.id) {
            Some(id) => id,
            None => {
                t.next_id += 1;
                t.next_id
            }
        };
        let mut row = article.clone();
        row.id = Some(id);
        row.published_at = stored_ts(row.published_at);
        t.articles.insert(row.url.clone(), row.clone());
        Ok(row)
    }

    async fn get_by_url(&self, url: &str) -> StoreResult<Option<Article>> {
        Ok(self.inner.read().await.articles.get(url).cloned())
    }

    async fn list_by_symbols(&self, symbols: &[&str], limit: usize) -> StoreResult<Vec<Article>> {
        let t = self.inner.read().await;
        let mut rows: Vec<Article> = t
            .articles
            .values()
            .filter(|a| symbols.iter().any(|s| a.symbol.eq_ignore_ascii_case(s)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn update_symbol(&self, id: i64, symbol: &str, category: &str) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let row = t
            .articles
            .values_mut()
            .find(|a| a.id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        row.symbol = symbol.to_string();
        row.category = category.to_string();
        Ok(())
    }

    async fn delete_older_than(&self, symbols: &[&str], cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.inner.write().await;
        let before = t.articles.len();
        t.articles.retain(|_, a| {
            !(a.published_at < cutoff && symbols.iter().any(|s| a.symbol.eq_ignore_ascii_case(s)))
        });
        Ok((before - t.articles.len()) as u64)
    }

    async fn upsert_user_articles(&self, set: &UserArticleSet) -> StoreResult<()> {
        if set.user_id.trim().is_empty() || set.symbol.trim().is_empty() {
            return Err(StoreError::Invalid("user_id and symbol are required".into()));
        }
        let mut t = self.inner.write().await;
        let mut set = set.clone();
        set.updated_at = stored_ts(set.updated_at);
        t.user_articles
            .insert((set.user_id.clone(), set.symbol.clone()), set);
        Ok(())
    }

    async fn get_user_articles(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> StoreResult<Option<UserArticleSet>> {
        let t = self.inner.read().await;
        Ok(t
            .user_articles
            .get(&(user_id.to_string(), symbol.to_string()))
            .cloned())
    }
}
