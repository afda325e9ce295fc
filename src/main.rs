//! Stock News Sentiment Service: binary entrypoint.
//! Boots the Axum HTTP server, wiring routes, shared state, and metrics.

use shuttle_axum::ShuttleAxum;
use stock_news_sentiment::config::ai::{AiConfig, DEFAULT_AI_CONFIG_PATH};
use stock_news_sentiment::config::ServiceConfig;
use stock_news_sentiment::metrics::Metrics;
use stock_news_sentiment::{build_state, router};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable local tracing output in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - SERVICE_DEV_LOG=1 (SERVICE_DEV_LOG=json switches to JSON lines)
fn enable_dev_tracing() {
    let mode = std::env::var("SERVICE_DEV_LOG").unwrap_or_default();
    if !(mode == "1" || mode == "json") {
        return;
    }

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );
    if !is_dev_env {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stock_news_sentiment=info,ingest=info,warn"));

    // Shuttle may already have installed a subscriber; keep theirs in that case.
    let res = if mode == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = ServiceConfig::load_default()?;
    let ai = AiConfig::load_or_default(DEFAULT_AI_CONFIG_PATH)?;
    let ttl = cfg.weights.cache_ttl_secs;

    let state = build_state(cfg, &ai).await?;
    let mut app = router(state);

    match Metrics::init(ttl) {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    Ok(app.into())
}
