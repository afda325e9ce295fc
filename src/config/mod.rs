//! Service configuration loaded from `config/service.toml`.
//!
//! Every section has defaults, so a missing file (or a missing section)
//! yields a runnable configuration. The path can be overridden with
//! `SERVICE_CONFIG_PATH`.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_CONFIG_PATH: &str = "config/service.toml";
pub const ENV_SERVICE_CONFIG_PATH: &str = "SERVICE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub news: NewsConfig,
    pub classifier: ClassifierConfig,
    pub weights: WeightsConfig,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub reclassify: ReclassifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    /// "ENV" means: read from FINNHUB_API_KEY
    pub api_key: String,
    /// Token-bucket refill rate for outbound news requests.
    pub requests_per_minute: u32,
    pub burst: u32,
    pub lookback_days: i64,
    pub max_articles_per_symbol: usize,
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finnhub.io/api/v1".to_string(),
            api_key: "ENV".to_string(),
            requests_per_minute: 30,
            burst: 1,
            lookback_days: 3,
            max_articles_per_symbol: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub fallback_confidence: u8,
    pub fallback_reasoning: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: 50,
            fallback_reasoning: "Unable to analyze".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub default_weight: u8,
    pub default_reasoning: String,
    /// Fixed sleep before each allocator call.
    pub pre_call_delay_ms: u64,
    pub cache_ttl_secs: u64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            default_weight: 3,
            default_reasoning: "Standard market relevance".to_string(),
            pre_call_delay_ms: 1500,
            cache_ttl_secs: 3600,
        }
    }
}

impl WeightsConfig {
    pub fn pre_call_delay(&self) -> Duration {
        Duration::from_millis(self.pre_call_delay_ms)
    }
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `memory` or a sqlx SQLite URL such as `sqlite://data/articles.db`.
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "memory".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub symbols: Vec<String>,
    pub include_general: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 900,
            symbols: vec!["SPY".into(), "QQQ".into(), "DIA".into()],
            include_general: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub general_max_age_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            general_max_age_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReclassifyConfig {
    pub rules_path: PathBuf,
}

impl Default for ReclassifyConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("config/reclassify_rules.json"),
        }
    }
}

impl ServiceConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: ServiceConfig = toml::from_str(s).context("parsing service config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $SERVICE_CONFIG_PATH (must exist)
    /// 2) config/service.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_SERVICE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_SERVICE_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_SERVICE_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    fn sanitize(&mut self) {
        self.classifier.fallback_confidence = self.classifier.fallback_confidence.clamp(1, 100);
        self.weights.default_weight = self.weights.default_weight.clamp(1, 5);
        self.news.requests_per_minute = self.news.requests_per_minute.max(1);
        self.news.burst = self.news.burst.max(1);
        self.news.lookback_days = self.news.lookback_days.max(1);
        self.scheduler.interval_secs = self.scheduler.interval_secs.max(60);
        self.scheduler.symbols = self
            .scheduler
            .symbols
            .iter()
            .map(|s| crate::symbols::normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect();
    }
}
