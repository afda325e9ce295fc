// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    4
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (case-insensitive); anything else yields a disabled provider
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            api_key: "ENV".to_string(),
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;
        cfg.provider = cfg.provider.to_lowercase();
        cfg.resolve_api_key();
        Ok(cfg)
    }

    /// Load from `path` if it exists, otherwise defaults with the key taken from env.
    /// A missing key is not an error here; the provider factory disables AI instead.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            return Self::load_from_file(path);
        }
        let mut cfg = Self::default();
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            cfg.enabled = !key.trim().is_empty();
            cfg.api_key = key;
        } else {
            cfg.api_key.clear();
        }
        Ok(cfg)
    }

    /// Resolve `"ENV"` from the environment. A disabled config is left alone;
    /// a missing key clears `api_key` so the provider factory disables AI.
    fn resolve_api_key(&mut self) {
        if !self.enabled || !self.api_key.trim().eq_ignore_ascii_case("env") {
            return;
        }
        let key = match self.provider.as_str() {
            "openai" => env::var("OPENAI_API_KEY").ok(),
            other => {
                tracing::warn!(provider = other, "unsupported AI provider in config");
                None
            }
        };
        self.api_key = match key.filter(|k| !k.trim().is_empty()) {
            Some(k) => k,
            None => {
                tracing::warn!(provider = %self.provider, "OPENAI_API_KEY not set; AI disabled");
                String::new()
            }
        };
    }
}
