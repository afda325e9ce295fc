//! SQLite backend (sqlx). Timestamps are stored as fixed-width RFC 3339 text
//! in UTC with millisecond precision, so lexical order equals chronological order.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{stored_ts, validate, ArticleStore, StoreError, StoreResult};
use crate::model::{Article, UserArticleSet};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        symbol TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        published_at TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT '',
        ai_sentiment TEXT,
        ai_confidence INTEGER,
        ai_reasoning TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_symbol ON articles (symbol, published_at)",
    r#"
    CREATE TABLE IF NOT EXISTS user_articles (
        user_id TEXT NOT NULL,
        symbol TEXT NOT NULL,
        articles TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, symbol)
    )
    "#,
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database exists per connection; keep exactly one.
        let in_memory = url.contains(":memory:");
        let mut pool_opts = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("failed to run migration {i}: {e}"))?;
        }
        Ok(Self { pool })
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("bad timestamp {s:?}: {e}")))
}

fn row_to_article(row: &SqliteRow) -> StoreResult<Article> {
    let published: String = row.try_get("published_at")?;
    let confidence: Option<i64> = row.try_get("ai_confidence")?;
    Ok(Article {
        id: Some(row.try_get("id")?),
        symbol: row.try_get("symbol")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        url: row.try_get("url")?,
        published_at: parse_ts(&published)?,
        category: row.try_get("category")?,
        ai_sentiment: row.try_get("ai_sentiment")?,
        ai_confidence: confidence.map(|c| c.clamp(0, 100) as u8),
        ai_reasoning: row.try_get("ai_reasoning")?,
    })
}

/// `?, ?, ...` for an IN clause with `n` parameters.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn upsert_by_url(&self, article: &Article) -> StoreResult<Article> {
        validate(article)?;
        let row = sqlx::query(
            r#"
            INSERT INTO articles
                (url, symbol, title, description, published_at, category,
                 ai_sentiment, ai_confidence, ai_reasoning)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                symbol = excluded.symbol,
                title = excluded.title,
                description = excluded.description,
                published_at = excluded.published_at,
                category = excluded.category,
                ai_sentiment = excluded.ai_sentiment,
                ai_confidence = excluded.ai_confidence,
                ai_reasoning = excluded.ai_reasoning
            RETURNING id
            "#,
        )
        .bind(&article.url)
        .bind(&article.symbol)
        .bind(&article.title)
        .bind(&article.description)
        .bind(ts(&article.published_at))
        .bind(&article.category)
        .bind(article.ai_sentiment.as_deref())
        .bind(article.ai_confidence.map(i64::from))
        .bind(article.ai_reasoning.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let mut stored = article.clone();
        stored.published_at = stored_ts(stored.published_at);
        stored.id = Some(row.try_get("id")?);
        Ok(stored)
    }

    async fn get_by_url(&self, url: &str) -> StoreResult<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn list_by_symbols(&self, symbols: &[&str], limit: usize) -> StoreResult<Vec<Article>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM articles WHERE UPPER(symbol) IN ({}) \
             ORDER BY published_at DESC, id ASC LIMIT ?",
            placeholders(symbols.len())
        );
        let mut q = sqlx::query(&sql);
        for s in symbols {
            q = q.bind(s.to_ascii_uppercase());
        }
        let rows = q
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_article).collect()
    }

    async fn update_symbol(&self, id: i64, symbol: &str, category: &str) -> StoreResult<()> {
        let res = sqlx::query("UPDATE articles SET symbol = ?, category = ? WHERE id = ?")
            .bind(symbol)
            .bind(category)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_older_than(&self, symbols: &[&str], cutoff: DateTime<Utc>) -> StoreResult<u64> {
        if symbols.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM articles WHERE UPPER(symbol) IN ({}) AND published_at < ?",
            placeholders(symbols.len())
        );
        let mut q = sqlx::query(&sql);
        for s in symbols {
            q = q.bind(s.to_ascii_uppercase());
        }
        let res = q.bind(ts(&cutoff)).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn upsert_user_articles(&self, set: &UserArticleSet) -> StoreResult<()> {
        if set.user_id.trim().is_empty() || set.symbol.trim().is_empty() {
            return Err(StoreError::Invalid("user_id and symbol are required".into()));
        }
        let articles = serde_json::to_string(&set.articles)?;
        sqlx::query(
            r#"
            INSERT INTO user_articles (user_id, symbol, articles, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, symbol) DO UPDATE SET
                articles = excluded.articles,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&set.user_id)
        .bind(&set.symbol)
        .bind(articles)
        .bind(ts(&set.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_articles(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> StoreResult<Option<UserArticleSet>> {
        let row = sqlx::query(
            "SELECT user_id, symbol, articles, updated_at FROM user_articles \
             WHERE user_id = ? AND symbol = ?",
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let articles: String = row.try_get("articles")?;
        let updated: String = row.try_get("updated_at")?;
        Ok(Some(UserArticleSet {
            user_id: row.try_get("user_id")?,
            symbol: row.try_get("symbol")?,
            articles: serde_json::from_str(&articles)?,
            updated_at: parse_ts(&updated)?,
        }))
    }
}
