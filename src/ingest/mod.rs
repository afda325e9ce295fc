// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod throttle;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::analyze::classifier::{ClassifyInput, SentimentClassifier, SentimentScale};
use crate::ingest::types::{NewsSource, RawArticle};
use crate::model::Article;
use crate::store::{DynStore, StoreError};
use crate::symbols::{
    normalize_symbol, SymbolGroup, FALLBACK_SYMBOLS, GENERAL_CATEGORY, MARKET_SYMBOL,
};

pub const COMPANY_CATEGORY: &str = "Company News";
const MAX_TEXT_CHARS: usize = 1500;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_articles_fetched_total", "Articles returned by news providers.");
        describe_counter!("news_provider_errors_total", "News provider fetch/parse errors.");
        describe_counter!("ingest_articles_stored_total", "Articles classified and upserted.");
        describe_counter!("ingest_articles_skipped_total", "Articles dropped as empty, duplicate, already stored or failed to store.");
        describe_counter!("ingest_symbol_failures_total", "Symbols whose fetch failed during a run.");
        describe_histogram!("news_fetch_ms", "News provider round-trip time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingestion last ran.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. decoded &nbsp;)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Normalize, drop items without title/url, dedup by URL (first wins), cap.
/// Returns (kept, skipped).
pub fn prepare_batch(raw: Vec<RawArticle>, max: usize) -> (Vec<RawArticle>, usize) {
    let total = raw.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(raw.len().min(max));
    for mut it in raw {
        if kept.len() >= max {
            break;
        }
        it.title = normalize_text(&it.title);
        it.description = normalize_text(&it.description);
        it.url = it.url.trim().to_string();
        if it.title.is_empty() || it.url.is_empty() {
            continue;
        }
        if !seen.insert(it.url.clone()) {
            continue;
        }
        kept.push(it);
    }
    let skipped = total - kept.len();
    (kept, skipped)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolReport {
    pub symbol: String,
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub success: bool,
    pub processed: Vec<SymbolReport>,
    pub failed: Vec<SymbolFailure>,
    pub total_stored: usize,
}

/// Fetch → classify → upsert. Symbols are processed strictly one after
/// another; pacing comes from the throttle wrapped around the source.
/// URLs already in the store are skipped, so a reassigned row keeps its symbol
/// and the model is asked about each article once.
pub struct Ingestor {
    source: Arc<dyn NewsSource>,
    classifier: Arc<SentimentClassifier>,
    store: DynStore,
    max_per_symbol: usize,
    scale: SentimentScale,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn NewsSource>,
        classifier: Arc<SentimentClassifier>,
        store: DynStore,
        max_per_symbol: usize,
    ) -> Self {
        ensure_metrics_described();
        Self {
            source,
            classifier,
            store,
            max_per_symbol: max_per_symbol.max(1),
            scale: SentimentScale::Polarity,
        }
    }

    /// Ingest one ticker. Fetch errors are returned to the caller.
    pub async fn ingest_symbol(&self, symbol: &str) -> anyhow::Result<SymbolReport> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            anyhow::bail!("symbol is required");
        }
        let raw = self.source.fetch_company(&symbol).await?;
        let category = SymbolGroup::of(&symbol)
            .map(SymbolGroup::category)
            .unwrap_or(COMPANY_CATEGORY);
        Ok(self.process(&symbol, category, raw).await)
    }

    /// Ingest general market headlines under the fallback tag.
    pub async fn ingest_general(&self) -> anyhow::Result<SymbolReport> {
        let raw = self.source.fetch_general().await?;
        Ok(self.process(MARKET_SYMBOL, GENERAL_CATEGORY, raw).await)
    }

    /// Ingest several tickers in order. A failing symbol is recorded and
    /// the run moves on to the next one.
    pub async fn run(&self, symbols: &[String]) -> IngestReport {
        let mut report = IngestReport::default();
        for s in symbols {
            match self.ingest_symbol(s).await {
                Ok(r) => {
                    report.total_stored += r.stored;
                    report.processed.push(r);
                }
                Err(e) => {
                    tracing::warn!(symbol = %s, source = self.source.name(), error = %e, "symbol ingest failed");
                    counter!("ingest_symbol_failures_total").increment(1);
                    report.failed.push(SymbolFailure {
                        symbol: normalize_symbol(s),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.success = report.failed.is_empty();
        gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            symbols = symbols.len(),
            stored = report.total_stored,
            failed = report.failed.len(),
            "ingest run finished"
        );
        report
    }

    /// Retention sweep: delete general headlines older than `max_age_days`.
    pub async fn sweep_general(&self, max_age_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days.max(1));
        let deleted = self.store.delete_older_than(FALLBACK_SYMBOLS, cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "retention sweep removed general headlines");
        }
        Ok(deleted)
    }

    async fn process(&self, symbol: &str, category: &str, raw: Vec<RawArticle>) -> SymbolReport {
        let fetched = raw.len();
        let (batch, mut skipped) = prepare_batch(raw, self.max_per_symbol);
        let mut stored = 0usize;

        for it in batch {
            match self.store.get_by_url(&it.url).await {
                Ok(Some(_)) => {
                    skipped += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%symbol, url = %it.url, error = %e, "lookup failed; classifying anyway");
                }
            }

            let verdict = self
                .classifier
                .classify(
                    &ClassifyInput {
                        title: it.title.clone(),
                        description: it.description.clone(),
                        symbol: symbol.to_string(),
                    },
                    self.scale,
                )
                .await;

            let article = Article {
                id: None,
                symbol: symbol.to_string(),
                title: it.title,
                description: it.description,
                url: it.url,
                published_at: it.published_at,
                category: category.to_string(),
                ai_sentiment: Some(verdict.sentiment),
                ai_confidence: Some(verdict.confidence),
                ai_reasoning: Some(verdict.reasoning),
            };
            match self.store.upsert_by_url(&article).await {
                Ok(_) => stored += 1,
                Err(e) => {
                    tracing::warn!(%symbol, url = %article.url, error = %e, "article upsert failed; skipping");
                    skipped += 1;
                }
            }
        }

        counter!("ingest_articles_stored_total").increment(stored as u64);
        counter!("ingest_articles_skipped_total").increment(skipped as u64);
        SymbolReport {
            symbol: symbol.to_string(),
            fetched,
            stored,
            skipped,
        }
    }
}
