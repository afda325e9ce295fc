use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::config::NewsConfig;
use crate::ingest::types::{NewsSource, RawArticle};

/// Item shape shared by `/company-news` and `/news`.
#[derive(Debug, Clone, Deserialize)]
struct FinnhubItem {
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

pub struct FinnhubSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    lookback_days: i64,
}

impl FinnhubSource {
    pub fn new(cfg: &NewsConfig) -> Result<Self> {
        let api_key = if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            std::env::var("FINNHUB_API_KEY").unwrap_or_default()
        } else {
            cfg.api_key.clone()
        };
        if api_key.is_empty() {
            tracing::warn!(provider = "finnhub", "FINNHUB_API_KEY not set; news fetches will fail");
        }
        let client = reqwest::Client::builder()
            .user_agent("stock-news-sentiment/0.1")
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            lookback_days: cfg.lookback_days,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<RawArticle>> {
        if self.api_key.is_empty() {
            return Err(anyhow!("missing FINNHUB_API_KEY"));
        }
        let t0 = std::time::Instant::now();
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                counter!("news_provider_errors_total", "provider" => "finnhub").increment(1);
                e
            })
            .with_context(|| format!("finnhub GET {path}"))?;

        let status = resp.status();
        if !status.is_success() {
            counter!("news_provider_errors_total", "provider" => "finnhub").increment(1);
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("finnhub {path} returned {status}: {}", body.trim()));
        }

        let items: Vec<FinnhubItem> = resp
            .json()
            .await
            .with_context(|| format!("parsing finnhub {path} response"))?;
        let out = to_raw(items);

        histogram!("news_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("news_articles_fetched_total").increment(out.len() as u64);
        Ok(out)
    }
}

fn date_range(today: NaiveDate, lookback_days: i64) -> (String, String) {
    let from = today - Duration::days(lookback_days);
    (
        from.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

/// Items without url, headline or a positive `datetime` are dropped; an
/// undated item would otherwise land at the epoch and be swept at once.
fn to_raw(items: Vec<FinnhubItem>) -> Vec<RawArticle> {
    items
        .into_iter()
        .filter(|it| !it.url.trim().is_empty() && !it.headline.trim().is_empty())
        .filter_map(|it| {
            let published_at = (it.datetime > 0)
                .then(|| DateTime::<Utc>::from_timestamp(it.datetime, 0))
                .flatten()?;
            Some(RawArticle {
                title: it.headline,
                description: it.summary,
                url: it.url,
                published_at,
                source: it.source,
            })
        })
        .collect()
}

#[async_trait]
impl NewsSource for FinnhubSource {
    async fn fetch_company(&self, symbol: &str) -> Result<Vec<RawArticle>> {
        let (from, to) = date_range(Utc::now().date_naive(), self.lookback_days);
        self.get(
            "/company-news",
            &[("symbol", symbol.to_ascii_uppercase()), ("from", from), ("to", to)],
        )
        .await
    }

    async fn fetch_general(&self) -> Result<Vec<RawArticle>> {
        self.get("/news", &[("category", "general".to_string())]).await
    }

    fn name(&self) -> &'static str {
        "finnhub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_window_is_inclusive_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let (from, to) = date_range(today, 3);
        assert_eq!(from, "2024-02-28");
        assert_eq!(to, "2024-03-02");
    }

    #[test]
    fn items_without_url_headline_or_date_are_dropped() {
        let json = r#"[
            {"datetime": 1714560000, "headline": "Fed holds", "source": "Reuters",
             "summary": "Rates unchanged", "url": "https://r.test/1", "id": 1, "image": ""},
            {"datetime": 1714560000, "headline": "", "url": "https://r.test/2"},
            {"datetime": 1714560000, "headline": "No link", "url": ""},
            {"headline": "Undated", "url": "https://r.test/3"},
            {"datetime": 0, "headline": "Epoch", "url": "https://r.test/4"}
        ]"#;
        let items: Vec<FinnhubItem> = serde_json::from_str(json).unwrap();
        let raw = to_raw(items);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].title, "Fed holds");
        assert_eq!(raw[0].description, "Rates unchanged");
        assert_eq!(raw[0].published_at.timestamp(), 1_714_560_000);
    }

    #[tokio::test]
    async fn missing_key_is_a_hard_error() {
        let cfg = NewsConfig {
            api_key: String::new(),
            ..NewsConfig::default()
        };
        let src = FinnhubSource::new(&cfg).unwrap();
        assert!(src.fetch_general().await.is_err());
    }
}
