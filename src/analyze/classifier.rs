//! Sentiment classifier: one article in, `{sentiment, confidence, reasoning}` out.
//!
//! Never fails. Provider errors, malformed JSON and unknown labels all
//! collapse to the configured neutral fallback.

use std::fmt;
use std::str::FromStr;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::analyze::ai_adapter::{extract_json_object, ChatRequest, DynChatProvider};
use crate::config::ClassifierConfig;

const SYSTEM_PROMPT: &str = "You are a financial news sentiment analyst. \
Read the article and judge its likely impact on the given stock. \
Respond with strict JSON only, no markdown, in the form \
{\"sentiment\": <label>, \"confidence\": <integer 1-100>, \"reasoning\": <one or two sentences>}.";

/// Label vocabulary requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentScale {
    /// `positive | negative | neutral`
    #[default]
    Polarity,
    /// `Bullish | Bearish | Neutral`
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub fn label(self, scale: SentimentScale) -> &'static str {
        match (scale, self) {
            (SentimentScale::Polarity, Polarity::Positive) => "positive",
            (SentimentScale::Polarity, Polarity::Negative) => "negative",
            (SentimentScale::Polarity, Polarity::Neutral) => "neutral",
            (SentimentScale::Market, Polarity::Positive) => "Bullish",
            (SentimentScale::Market, Polarity::Negative) => "Bearish",
            (SentimentScale::Market, Polarity::Neutral) => "Neutral",
        }
    }
}

impl FromStr for Polarity {
    type Err = ();

    /// Accepts either vocabulary, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "bullish" => Ok(Polarity::Positive),
            "negative" | "bearish" => Ok(Polarity::Negative),
            "neutral" => Ok(Polarity::Neutral),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SentimentScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentScale::Polarity => f.write_str("polarity"),
            SentimentScale::Market => f.write_str("market"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub sentiment: String,
    pub confidence: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub symbol: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    sentiment: String,
    confidence: serde_json::Value,
    #[serde(default)]
    reasoning: String,
}

pub struct SentimentClassifier {
    provider: DynChatProvider,
    cfg: ClassifierConfig,
}

impl SentimentClassifier {
    pub fn new(provider: DynChatProvider, cfg: ClassifierConfig) -> Self {
        Self { provider, cfg }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// The neutral verdict returned whenever the model cannot be used.
    pub fn fallback(&self, scale: SentimentScale) -> SentimentVerdict {
        SentimentVerdict {
            sentiment: Polarity::Neutral.label(scale).to_string(),
            confidence: self.cfg.fallback_confidence,
            reasoning: self.cfg.fallback_reasoning.clone(),
        }
    }

    pub async fn classify(&self, input: &ClassifyInput, scale: SentimentScale) -> SentimentVerdict {
        let req = build_request(input, scale);
        let raw = match self.provider.complete(&req).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    provider = self.provider.name(),
                    symbol = %input.symbol,
                    "classifier provider error; using fallback"
                );
                counter!("classifier_fallback_total", "reason" => "provider").increment(1);
                return self.fallback(scale);
            }
        };

        match parse_verdict(&raw, scale) {
            Some(v) => {
                counter!("classifier_success_total").increment(1);
                v
            }
            None => {
                tracing::warn!(symbol = %input.symbol, "malformed classifier response; using fallback");
                counter!("classifier_fallback_total", "reason" => "malformed").increment(1);
                self.fallback(scale)
            }
        }
    }
}

fn build_request(input: &ClassifyInput, scale: SentimentScale) -> ChatRequest {
    let labels = match scale {
        SentimentScale::Polarity => "\"positive\", \"negative\" or \"neutral\"",
        SentimentScale::Market => "\"Bullish\", \"Bearish\" or \"Neutral\"",
    };
    let description = if input.description.trim().is_empty() {
        "(none)"
    } else {
        input.description.trim()
    };
    let user = format!(
        "Stock symbol: {symbol}\nTitle: {title}\nDescription: {description}\n\n\
         The sentiment label must be one of {labels}.",
        symbol = input.symbol.trim(),
        title = input.title.trim(),
    );
    ChatRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
        temperature: 0.2,
        max_tokens: 200,
        json_mode: true,
    }
}

/// Parse a model reply into a verdict on the requested scale.
/// Returns `None` for anything that is not a usable verdict.
pub fn parse_verdict(raw: &str, scale: SentimentScale) -> Option<SentimentVerdict> {
    let json = extract_json_object(raw)?;
    let parsed: RawVerdict = serde_json::from_str(json).ok()?;
    let polarity: Polarity = parsed.sentiment.parse().ok()?;
    let confidence = coerce_confidence(&parsed.confidence)?;
    let reasoning = parsed.reasoning.trim();
    Some(SentimentVerdict {
        sentiment: polarity.label(scale).to_string(),
        confidence,
        reasoning: if reasoning.is_empty() {
            "No reasoning provided".to_string()
        } else {
            reasoning.to_string()
        },
    })
}

/// Integer in 1..=100. Floats are rounded; numeric strings are accepted.
fn coerce_confidence(v: &serde_json::Value) -> Option<u8> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(1.0, 100.0) as u8)
}
