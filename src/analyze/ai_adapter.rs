//! AI adapter: chat-completion provider abstraction.
//!
//! The classifier and the weight allocator only see [`ChatProvider`]; the
//! concrete OpenAI client, the disabled stub and the scripted test provider
//! all live here.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ai::AiConfig;

/// One chat-completion call: a system instruction plus a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response when it supports it.
    pub json_mode: bool,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("AI provider is disabled")]
    Disabled,
    #[error("missing API key for provider {0}")]
    MissingKey(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned an empty completion")]
    Empty,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion and return the raw assistant text.
    async fn complete(&self, req: &ChatRequest) -> Result<String, ProviderError>;
    /// Provider name for diagnostics/metrics labels.
    fn name(&self) -> &'static str;
}

pub type DynChatProvider = Arc<dyn ChatProvider>;

/// Factory: build a provider according to config.
///
/// * `enabled == false` or an empty key → [`DisabledProvider`]
/// * `provider == "openai"` → [`OpenAiProvider`]
pub fn build_provider(cfg: &AiConfig) -> anyhow::Result<DynChatProvider> {
    if !cfg.enabled || cfg.api_key.trim().is_empty() {
        tracing::warn!(provider = %cfg.provider, "AI disabled; classifier will use fallbacks");
        return Ok(Arc::new(DisabledProvider));
    }
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(cfg)?)),
        other => {
            tracing::warn!(provider = other, "unsupported AI provider; disabling");
            Ok(Arc::new(DisabledProvider))
        }
    }
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("stock-news-sentiment/0.1")
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CompletionReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct CompletionResp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingKey("openai"));
        }

        let body = CompletionReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.user,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: req.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let parsed: CompletionResp = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with [`ProviderError::Disabled`]; used when AI is off.
pub struct DisabledProvider;

#[async_trait]
impl ChatProvider for DisabledProvider {
    async fn complete(&self, _req: &ChatRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests and local runs.
///
/// Replies are consumed in order; once the script is exhausted every call
/// returns the `fallback` reply (or `Empty` if none was set). All received
/// requests are recorded for inspection.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that answers every call with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn push(&self, item: Result<String, String>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(item);
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(req.clone());
        }
        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(msg)) => Err(ProviderError::Other(msg)),
            None => self.fallback.clone().ok_or(ProviderError::Empty),
        }
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Pull the first JSON object out of a completion.
///
/// Models sometimes wrap JSON in markdown fences or add a sentence around
/// it; everything outside the outermost `{ ... }` is dropped.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
