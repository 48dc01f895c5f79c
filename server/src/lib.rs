use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use komodo_core::parser::{parse_json, parse_text};
use komodo_core::retriever::validate;
use komodo_core::{Index, IndexConfig, IndexRegistry, IndexResult, IndexStats, KomodoError, ParsedDocument, SearchQuery, SearchResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod callback;

use callback::CallbackDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IndexRegistry>,
    pub callbacks: Arc<CallbackDispatcher>,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Opens every index under `data_dir` and reads `ADMIN_TOKEN` from the environment.
    pub fn load(data_dir: &str, callback_workers: usize, callback_timeout: Duration) -> Result<Self> {
        let registry = IndexRegistry::new(data_dir);
        registry.open_all()?;
        Ok(Self {
            registry: Arc::new(registry),
            callbacks: Arc::new(CallbackDispatcher::new(callback_workers, callback_timeout)?),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
        })
    }
}

pub enum ApiError {
    Unauthorized(String),
    Komodo(KomodoError),
}

impl From<KomodoError> for ApiError {
    fn from(err: KomodoError) -> Self {
        ApiError::Komodo(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Komodo(err) => {
                let status = match &err {
                    KomodoError::MissingParameters(_) | KomodoError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
                    KomodoError::NotFound(_) => StatusCode::NOT_FOUND,
                    KomodoError::DestroyInProgress(_) => StatusCode::CONFLICT,
                    KomodoError::StorageFailure(_) => {
                        tracing::error!(error = %err, "storage failure");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/indices", get(list_indices))
        .route("/indices/:name", post(create_index).delete(destroy_index))
        .route("/indices/:name/stats", get(index_stats))
        .route("/indices/:name/documents", post(add_json_document))
        .route("/indices/:name/text", post(add_text_document))
        .route("/indices/:name/documents/:id", get(get_document).delete(delete_document))
        .route("/indices/:name/search", post(search_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn open_index(state: &AppState, name: &str) -> std::result::Result<Arc<Index>, ApiError> {
    state
        .registry
        .get(name)
        .ok_or_else(|| KomodoError::not_found(format!("index '{name}'")).into())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

async fn list_indices(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list())
}

async fn create_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    config: Option<Json<IndexConfig>>,
) -> ApiResult<IndexStats> {
    authorize(&state, &headers)?;
    let config = config.map(|Json(c)| c).unwrap_or_default();
    let index = state.registry.create(&name, config)?;
    Ok(Json(index.stats()?))
}

async fn destroy_index(State(state): State<AppState>, Path(name): Path<String>, headers: HeaderMap) -> ApiResult<serde_json::Value> {
    authorize(&state, &headers)?;
    if !state.registry.destroy(&name)? {
        return Err(KomodoError::not_found(format!("index '{name}'")).into());
    }
    Ok(Json(serde_json::json!({ "index": name, "destroyed": true })))
}

async fn index_stats(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<IndexStats> {
    Ok(Json(open_index(&state, &name)?.stats()?))
}

#[derive(Deserialize)]
pub struct DocumentParams {
    pub id: Option<String>,
}

async fn add_json_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DocumentParams>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<IndexResult> {
    authorize(&state, &headers)?;
    let index = open_index(&state, &name)?;
    let id = match (params.id, body.get("id")) {
        (Some(id), _) => id,
        (None, Some(serde_json::Value::String(s))) => s.clone(),
        (None, Some(serde_json::Value::Number(n))) => n.to_string(),
        _ => return Err(KomodoError::missing("document id (?id= or an `id` field)").into()),
    };
    let doc = parse_json(&id, &body, index.config());
    Ok(Json(index.add_document(doc)?))
}

async fn add_text_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DocumentParams>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<IndexResult> {
    authorize(&state, &headers)?;
    let index = open_index(&state, &name)?;
    let id = params.id.ok_or_else(|| KomodoError::missing("document id (?id=)"))?;
    let doc = parse_text(&id, &body, index.config());
    Ok(Json(index.add_document(doc)?))
}

async fn get_document(State(state): State<AppState>, Path((name, id)): Path<(String, String)>) -> ApiResult<ParsedDocument> {
    match open_index(&state, &name)?.get_document(&id)? {
        Some(doc) => Ok(Json(doc)),
        None => Err(KomodoError::not_found(format!("document '{id}'")).into()),
    }
}

async fn delete_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<serde_json::Value> {
    authorize(&state, &headers)?;
    let removed = open_index(&state, &name)?.delete_document(&id)?;
    Ok(Json(serde_json::json!({ "document_id": id, "removed": removed })))
}

/// Synchronous search, or an immediate acknowledgement when `callback_url` is set.
pub async fn search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<SearchResult> {
    let index = open_index(&state, &name)?;
    validate(&query, index.config())?;

    if let Some(url) = query.callback_url.clone() {
        let start = query.start_index;
        state.callbacks.dispatch_search(index, query, url);
        return Ok(Json(SearchResult::acknowledged(start)));
    }
    let result = tokio::task::spawn_blocking(move || index.search(&query))
        .await
        .map_err(|err| KomodoError::storage(format!("search task failed: {err}")))??;
    Ok(Json(result))
}
