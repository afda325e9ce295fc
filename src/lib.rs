// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod connections;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod reclassify;
pub mod store;
pub mod symbols;

// ---- Re-exports for stable public API ----
pub use crate::analyze::ai_adapter;
pub use crate::api::{router, AppState};

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::analyze::ai_adapter::build_provider;
use crate::analyze::rules::HotReloadRules;
use crate::config::ai::{AiConfig, DEFAULT_AI_CONFIG_PATH};
use crate::config::ServiceConfig;
use crate::ingest::providers::FinnhubSource;
use crate::ingest::scheduler::spawn_ingest_scheduler;
use crate::ingest::throttle::{Throttle, ThrottledSource};

/// Build app state from explicit configs: provider, store, throttled news
/// source, reclassify rules, and (if enabled) the background scheduler.
pub async fn build_state(cfg: ServiceConfig, ai: &AiConfig) -> anyhow::Result<AppState> {
    let provider = build_provider(ai)?;
    let store = store::open(&cfg.store.database_url).await?;
    let source = ThrottledSource::new(
        FinnhubSource::new(&cfg.news)?,
        Throttle::per_minute(cfg.news.requests_per_minute, cfg.news.burst),
    );
    let rules = Arc::new(HotReloadRules::new(cfg.reclassify.rules_path.clone()));

    let state = AppState::new(cfg, provider, Arc::new(source), store, rules);

    if state.config.scheduler.enabled {
        let handle = spawn_ingest_scheduler(
            state.config.scheduler.clone(),
            state.config.retention.clone(),
            state.ingestor.clone(),
            state.reclassifier.clone(),
        );
        state
            .connections
            .register("ingest-scheduler", move || handle.abort());
        info!(
            interval_secs = state.config.scheduler.interval_secs,
            symbols = state.config.scheduler.symbols.len(),
            "ingest scheduler started"
        );
    }

    info!(
        provider = state.classifier.provider_name(),
        store = %state.config.store.database_url,
        "app state ready"
    );
    Ok(state)
}

/// Build the router from the default config locations
/// (`config/service.toml`, `config/ai.json`, env overrides).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = ServiceConfig::load_default()?;
    let ai = AiConfig::load_or_default(DEFAULT_AI_CONFIG_PATH)?;
    let state = build_state(cfg, &ai).await?;
    Ok(api::router(state))
}
