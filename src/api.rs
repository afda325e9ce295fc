use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::analyze::ai_adapter::DynChatProvider;
use crate::analyze::cache::WeightCache;
use crate::analyze::classifier::{ClassifyInput, SentimentClassifier, SentimentScale, SentimentVerdict};
use crate::analyze::rules::HotReloadRules;
use crate::analyze::weights::{WeightAllocation, WeightAllocator, WeightRequest};
use crate::config::ServiceConfig;
use crate::connections::ConnectionManager;
use crate::ingest::types::NewsSource;
use crate::ingest::{IngestReport, Ingestor};
use crate::model::{Article, UserArticleSet};
use crate::reclassify::{ReclassifyReport, Reclassifier};
use crate::store::{DynStore, StoreError};
use crate::symbols::{normalize_symbol, SymbolGroup};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub classifier: Arc<SentimentClassifier>,
    pub allocator: Arc<WeightAllocator>,
    pub weight_cache: Arc<WeightCache>,
    pub store: DynStore,
    pub ingestor: Arc<Ingestor>,
    pub reclassifier: Arc<Reclassifier>,
    pub connections: Arc<ConnectionManager>,
}

impl AppState {
    /// Wire all services from their collaborators.
    pub fn new(
        config: ServiceConfig,
        provider: DynChatProvider,
        source: Arc<dyn NewsSource>,
        store: DynStore,
        rules: Arc<HotReloadRules>,
    ) -> Self {
        let classifier = Arc::new(SentimentClassifier::new(
            provider.clone(),
            config.classifier.clone(),
        ));
        let allocator = Arc::new(WeightAllocator::new(provider, config.weights.clone()));
        let weight_cache = Arc::new(WeightCache::new(config.weights.cache_ttl()));
        let ingestor = Arc::new(Ingestor::new(
            source,
            classifier.clone(),
            store.clone(),
            config.news.max_articles_per_symbol,
        ));
        let reclassifier = Arc::new(Reclassifier::new(store.clone(), rules));
        Self {
            config: Arc::new(config),
            classifier,
            allocator,
            weight_cache,
            store,
            ingestor,
            reclassifier,
            connections: Arc::new(ConnectionManager::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/classify", post(classify))
        .route("/weights", post(allocate_weights))
        .route("/reclassify", post(reclassify))
        .route("/ingest", post(ingest))
        .route("/ingest/general", post(ingest_general))
        .route("/articles", get(list_articles))
        .route(
            "/users/{user_id}/articles/{symbol}",
            get(get_user_articles).put(put_user_articles),
        )
        .route("/admin/cleanup", post(cleanup))
        .route("/debug/connections", get(debug_connections))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---- errors ----

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "success": false, "error": msg }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::error!(error = %other, "store error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

/// `Json` whose rejections use the `{success:false,error}` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---- handlers ----

#[derive(Deserialize)]
struct ClassifyReq {
    title: String,
    #[serde(default)]
    description: String,
    symbol: String,
    #[serde(default)]
    scale: SentimentScale,
}

async fn classify(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ClassifyReq>,
) -> ApiResult<SentimentVerdict> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    let input = ClassifyInput {
        title: body.title,
        description: body.description,
        symbol: normalize_symbol(&body.symbol),
    };
    Ok(Json(state.classifier.classify(&input, body.scale).await))
}

async fn allocate_weights(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<WeightRequest>,
) -> ApiResult<WeightAllocation> {
    if body.symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("symbol is required".into()));
    }
    if let Some(hit) = state.weight_cache.get(&body) {
        metrics::counter!("weights_cache_hits_total").increment(1);
        return Ok(Json(hit));
    }
    let allocation = state
        .allocator
        .allocate(&body)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    state.weight_cache.insert(&body, allocation.clone());
    Ok(Json(allocation))
}

async fn reclassify(State(state): State<AppState>) -> ApiResult<ReclassifyReport> {
    Ok(Json(state.reclassifier.run().await?))
}

#[derive(Deserialize, Default)]
struct IngestReq {
    #[serde(default)]
    symbols: Option<Vec<String>>,
}

/// Body is optional; without `symbols` the configured universe is used.
async fn ingest(State(state): State<AppState>, body: Bytes) -> ApiResult<IngestReport> {
    let req: IngestReq = if body.iter().all(u8::is_ascii_whitespace) {
        IngestReq::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?
    };
    let symbols: Vec<String> = req
        .symbols
        .unwrap_or_else(|| state.config.scheduler.symbols.clone())
        .iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return Err(ApiError::BadRequest("no symbols to ingest".into()));
    }

    // A single explicit symbol is a direct fetch: its failure is the caller's error.
    if symbols.len() == 1 {
        let r = state
            .ingestor
            .ingest_symbol(&symbols[0])
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;
        return Ok(Json(IngestReport {
            success: true,
            total_stored: r.stored,
            processed: vec![r],
            failed: Vec::new(),
        }));
    }
    Ok(Json(state.ingestor.run(&symbols).await))
}

async fn ingest_general(State(state): State<AppState>) -> ApiResult<IngestReport> {
    let r = state
        .ingestor
        .ingest_general()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(Json(IngestReport {
        success: true,
        total_stored: r.stored,
        processed: vec![r],
        failed: Vec::new(),
    }))
}

#[derive(Deserialize)]
struct ArticlesQuery {
    symbol: Option<String>,
    group: Option<String>,
    limit: Option<usize>,
}

async fn list_articles(
    State(state): State<AppState>,
    Query(q): Query<ArticlesQuery>,
) -> ApiResult<Vec<Article>> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let rows = match (q.symbol.as_deref(), q.group.as_deref()) {
        (Some(sym), _) => {
            state
                .store
                .list_by_symbol(&normalize_symbol(sym), limit)
                .await?
        }
        (None, Some(group)) => {
            let group: SymbolGroup = group
                .parse()
                .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;
            state.store.list_by_symbols(group.symbols(), limit).await?
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either symbol or group is required".into(),
            ))
        }
    };
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct UserArticlesReq {
    articles: Vec<Article>,
}

async fn put_user_articles(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(String, String)>,
    ApiJson(body): ApiJson<UserArticlesReq>,
) -> ApiResult<UserArticleSet> {
    let set = UserArticleSet {
        user_id,
        symbol: normalize_symbol(&symbol),
        articles: body.articles,
        updated_at: Utc::now(),
    };
    state.store.upsert_user_articles(&set).await?;
    Ok(Json(set))
}

async fn get_user_articles(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(String, String)>,
) -> ApiResult<UserArticleSet> {
    let symbol = normalize_symbol(&symbol);
    state
        .store
        .get_user_articles(&user_id, &symbol)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no articles for {user_id}/{symbol}")))
}

#[derive(Serialize)]
struct CleanupResp {
    success: bool,
    deleted: u64,
}

async fn cleanup(State(state): State<AppState>) -> ApiResult<CleanupResp> {
    let deleted = state
        .ingestor
        .sweep_general(state.config.retention.general_max_age_days)
        .await?;
    Ok(Json(CleanupResp {
        success: true,
        deleted,
    }))
}

async fn debug_connections(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.connections.active())
}
