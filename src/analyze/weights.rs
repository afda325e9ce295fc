//! Weight allocator: spread an already-known aggregate sentiment over the
//! articles that produced it.
//!
//! One batched prompt per request. The model answers with
//! `{"weights": [{"article_index", "weight", "reasoning"}]}`; the result always
//! has one entry per input article, in input order, each weight in `1..=5`.
//! Indices the model skipped get the configured default.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::analyze::ai_adapter::{extract_json_object, ChatRequest, DynChatProvider, ProviderError};
use crate::config::WeightsConfig;
use crate::model::{ArticleDigest, ArticleWeight};

pub const MIN_WEIGHT: u8 = 1;
pub const MAX_WEIGHT: u8 = 5;

const SYSTEM_PROMPT: &str = "You are a financial analyst explaining an aggregate sentiment call. \
For every article listed, rate how strongly it influenced the overall sentiment \
on an integer scale from 1 (barely relevant) to 5 (decisive). \
Respond with strict JSON only: \
{\"weights\": [{\"article_index\": <index>, \"weight\": <1-5>, \"reasoning\": <short sentence>}]}.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightRequest {
    pub articles: Vec<ArticleDigest>,
    pub overall_sentiment: String,
    #[serde(deserialize_with = "confidence_percent")]
    pub overall_confidence: u8,
    pub symbol: String,
}

/// Any JSON number (or numeric string), rounded and clamped to `0..=100`.
fn confidence_percent<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    let n = match &v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
        .map(|f| f.round().clamp(0.0, 100.0) as u8)
        .ok_or_else(|| de::Error::custom(format!("expected a confidence number, got {v}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAllocation {
    pub success: bool,
    pub symbol: String,
    pub weights: Vec<ArticleWeight>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("weight provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("could not parse weight response: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
struct RawWeights {
    weights: Vec<RawWeight>,
}

#[derive(Deserialize)]
struct RawWeight {
    #[serde(default)]
    article_index: serde_json::Value,
    #[serde(default)]
    weight: serde_json::Value,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct WeightAllocator {
    provider: DynChatProvider,
    cfg: WeightsConfig,
}

impl WeightAllocator {
    pub fn new(provider: DynChatProvider, cfg: WeightsConfig) -> Self {
        Self { provider, cfg }
    }

    pub async fn allocate(&self, req: &WeightRequest) -> Result<WeightAllocation, AllocatorError> {
        let symbol = crate::symbols::normalize_symbol(&req.symbol);
        counter!("weights_requests_total").increment(1);

        if req.articles.is_empty() {
            return Ok(WeightAllocation {
                success: true,
                symbol,
                weights: Vec::new(),
                calculated_at: Utc::now(),
            });
        }

        // Fixed pacing before every call; the provider throttles bursts otherwise.
        let delay = self.cfg.pre_call_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let t0 = std::time::Instant::now();
        let raw = self
            .provider
            .complete(&build_request(req, &symbol))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, %symbol, provider = self.provider.name(), "weight allocation failed");
                counter!("weights_errors_total", "reason" => "provider").increment(1);
                AllocatorError::Provider(e)
            })?;
        histogram!("weights_provider_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let weights = parse_weights(&raw, req.articles.len(), &self.cfg).map_err(|e| {
            tracing::warn!(error = %e, %symbol, "malformed weight response");
            counter!("weights_errors_total", "reason" => "malformed").increment(1);
            e
        })?;

        tracing::info!(%symbol, articles = weights.len(), "weights allocated");
        Ok(WeightAllocation {
            success: true,
            symbol,
            weights,
            calculated_at: Utc::now(),
        })
    }
}

fn build_request(req: &WeightRequest, symbol: &str) -> ChatRequest {
    let mut user = format!(
        "Symbol: {symbol}\nOverall sentiment: {} ({}% confidence)\n\nArticles:\n",
        req.overall_sentiment.trim(),
        req.overall_confidence.min(100),
    );
    for (i, a) in req.articles.iter().enumerate() {
        let _ = writeln!(
            user,
            "[{i}] {title}\n    Description: {desc}\n    Published: {published}",
            title = a.title.trim(),
            desc = if a.description.trim().is_empty() {
                "(none)"
            } else {
                a.description.trim()
            },
            published = a.published_at.as_deref().unwrap_or("unknown"),
        );
    }
    let _ = write!(
        user,
        "\nReturn exactly {} entries, article_index 0 to {}.",
        req.articles.len(),
        req.articles.len() - 1
    );

    ChatRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
        temperature: 0.3,
        max_tokens: 1500,
        json_mode: true,
    }
}

/// Turn a model reply into exactly `n` weights.
pub fn parse_weights(
    raw: &str,
    n: usize,
    cfg: &WeightsConfig,
) -> Result<Vec<ArticleWeight>, AllocatorError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| AllocatorError::Malformed("no JSON object in response".into()))?;
    let parsed: RawWeights =
        serde_json::from_str(json).map_err(|e| AllocatorError::Malformed(e.to_string()))?;

    let mut by_index: HashMap<usize, ArticleWeight> = HashMap::with_capacity(n);
    for w in parsed.weights {
        let Some(idx) = as_index(&w.article_index) else {
            continue;
        };
        if idx >= n || by_index.contains_key(&idx) {
            continue;
        }
        let Some(weight) = as_weight(&w.weight) else {
            continue;
        };
        let reasoning = w
            .reasoning
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| cfg.default_reasoning.clone());
        by_index.insert(
            idx,
            ArticleWeight {
                article_index: idx,
                weight,
                reasoning,
            },
        );
    }

    let filled = (0..n)
        .map(|i| {
            by_index.remove(&i).unwrap_or_else(|| ArticleWeight {
                article_index: i,
                weight: cfg.default_weight.clamp(MIN_WEIGHT, MAX_WEIGHT),
                reasoning: cfg.default_reasoning.clone(),
            })
        })
        .collect();
    Ok(filled)
}

fn as_index(v: &serde_json::Value) -> Option<usize> {
    match v {
        serde_json::Value::Number(n) => n.as_u64().map(|u| u as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_weight(v: &serde_json::Value) -> Option<u8> {
    let f = match v {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite()
        .then(|| f.round().clamp(MIN_WEIGHT as f64, MAX_WEIGHT as f64) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> WeightsConfig {
        WeightsConfig {
            pre_call_delay_ms: 0,
            ..WeightsConfig::default()
        }
    }

    #[test]
    fn missing_indices_get_default() {
        let raw = r#"{"weights":[{"article_index":1,"weight":5,"reasoning":"Earnings beat"}]}"#;
        let w = parse_weights(raw, 3, &cfg()).unwrap();
        assert_eq!(w.len(), 3);
        assert_eq!(w[0].weight, 3);
        assert_eq!(w[0].reasoning, "Standard market relevance");
        assert_eq!(w[1].weight, 5);
        assert_eq!(w[1].reasoning, "Earnings beat");
        assert_eq!(w[2].article_index, 2);
    }

    #[test]
    fn entry_without_weight_gets_default() {
        let raw = r#"{"weights":[
            {"article_index":0,"weight":4,"reasoning":"Guidance"},
            {"article_index":1,"reasoning":"no weight"},
            {"weight":5,"reasoning":"no index"}
        ]}"#;
        let w = parse_weights(raw, 2, &cfg()).unwrap();
        let got: Vec<u8> = w.iter().map(|x| x.weight).collect();
        assert_eq!(got, vec![4, 3]);
        assert_eq!(w[1].reasoning, "Standard market relevance");
    }

    #[test]
    fn out_of_range_and_duplicates_are_ignored() {
        let raw = r#"{"weights":[
            {"article_index":0,"weight":9,"reasoning":"a"},
            {"article_index":0,"weight":1,"reasoning":"dup"},
            {"article_index":7,"weight":2,"reasoning":"ghost"},
            {"article_index":"1","weight":0.2,"reasoning":"b"}
        ]}"#;
        let w = parse_weights(raw, 2, &cfg()).unwrap();
        assert_eq!(w[0].weight, 5);
        assert_eq!(w[0].reasoning, "a");
        assert_eq!(w[1].weight, 1);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            parse_weights("I cannot help with that", 2, &cfg()),
            Err(AllocatorError::Malformed(_))
        ));
        assert!(matches!(
            parse_weights(r#"{"scores": []}"#, 2, &cfg()),
            Err(AllocatorError::Malformed(_))
        ));
    }

    #[test]
    fn prompt_enumerates_every_article() {
        let req = WeightRequest {
            articles: vec![
                ArticleDigest {
                    title: "A".into(),
                    description: String::new(),
                    published_at: Some("2024-05-01".into()),
                },
                ArticleDigest {
                    title: "B".into(),
                    description: "desc".into(),
                    published_at: None,
                },
            ],
            overall_sentiment: "Bullish".into(),
            overall_confidence: 72,
            symbol: "spy".into(),
        };
        let chat = build_request(&req, "SPY");
        assert!(chat.user.contains("[0] A"));
        assert!(chat.user.contains("[1] B"));
        assert!(chat.user.contains("Published: unknown"));
        assert!(chat.user.contains("Bullish (72% confidence)"));
        assert!(chat.user.contains("exactly 2 entries"));
    }
}
