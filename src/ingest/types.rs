// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Article as returned by a news provider, before classification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String, // e.g., "Reuters", "MarketWatch"
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    /// Recent company news for one ticker.
    async fn fetch_company(&self, symbol: &str) -> Result<Vec<RawArticle>>;
    /// General market headlines not tied to a ticker.
    async fn fetch_general(&self) -> Result<Vec<RawArticle>>;
    fn name(&self) -> &'static str;
}

/// Fixed in-memory source for tests and offline runs.
/// Symbols listed in `failing` return an error.
#[derive(Default)]
pub struct StaticNewsSource {
    pub company: HashMap<String, Vec<RawArticle>>,
    pub general: Vec<RawArticle>,
    pub failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StaticNewsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, symbol: &str, items: Vec<RawArticle>) -> Self {
        self.company.insert(symbol.to_ascii_uppercase(), items);
        self
    }

    pub fn with_general(mut self, items: Vec<RawArticle>) -> Self {
        self.general = items;
        self
    }

    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_ascii_uppercase());
        self
    }

    /// Symbols requested so far, in call order (`*` for general news).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, what: &str) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(what.to_string());
        }
    }
}

#[async_trait::async_trait]
impl NewsSource for StaticNewsSource {
    async fn fetch_company(&self, symbol: &str) -> Result<Vec<RawArticle>> {
        let key = symbol.to_ascii_uppercase();
        self.record(&key);
        if self.failing.contains(&key) {
            anyhow::bail!("static source configured to fail for {key}");
        }
        Ok(self.company.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_general(&self) -> Result<Vec<RawArticle>> {
        self.record("*");
        Ok(self.general.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
