//! HTTP façade.
//!
//! Exposes ingest, search, graph, blob, maintenance, and history endpoints
//! as a JSON API under `/api/v1`, plus the bundled single-file web UI at
//! `/`. Requests carry a 60-second timeout and permissive CORS.
//!
//! CPU-heavy work (embedding, vector search, ingest) runs on blocking
//! tasks. Directory ingest and reindex spawn background tasks and respond
//! immediately — queued work deliberately outlives the originating request.
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "q (query) required" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `unavailable` (503),
//! `internal` (500).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::admin;
use crate::config::Config;
use crate::error::Error;
use crate::history::{SavedSearches, SearchHistory};
use crate::indexer::Indexer;
use crate::search::{search_chunks, SearchRequest};

const UI_HTML: &str = include_str!("../assets/ui.html");

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    data_dir: PathBuf,
    indexer: Option<Arc<Indexer>>,
    history: Arc<Mutex<SearchHistory>>,
    saved: Arc<Mutex<SavedSearches>>,
}

impl AppState {
    fn indexer(&self) -> Result<Arc<Indexer>, AppError> {
        self.indexer
            .clone()
            .ok_or_else(|| Error::Unavailable("indexer").into())
    }
}

/// Start the HTTP server and run until shutdown; flushes embedder and
/// vector-index state after the listener closes.
pub async fn run_server(config: &Config, indexer: Option<Arc<Indexer>>) -> crate::error::Result<()> {
    let state = AppState {
        data_dir: config.data_dir.clone(),
        indexer: indexer.clone(),
        history: Arc::new(Mutex::new(SearchHistory::load(&config.data_dir))),
        saved: Arc::new(Mutex::new(SavedSearches::load(&config.data_dir))),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/reindex", post(handle_reindex))
        .route("/search", get(handle_search))
        .route("/stats", get(handle_stats))
        .route("/graph/node/{id}", get(handle_get_node))
        .route("/graph/traverse", get(handle_traverse))
        .route("/graph/search", get(handle_search_nodes))
        .route("/blob/{hash}", get(handle_get_blob))
        .route("/export", post(handle_export))
        .route("/import", post(handle_import))
        .route("/reset", post(handle_reset))
        .route("/batch/delete", post(handle_batch_delete))
        .route("/batch/reindex", post(handle_batch_reindex))
        .route(
            "/search/history",
            get(handle_get_history).delete(handle_clear_history),
        )
        .route(
            "/search/saved",
            get(handle_get_saved).post(handle_save_search),
        )
        .route(
            "/search/saved/{id}",
            put(handle_update_saved).delete(handle_delete_saved),
        );

    let app = Router::new()
        .route("/", get(handle_ui))
        .route("/ui", get(handle_ui))
        .route("/health", get(handle_health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!(addr = %addr, "http server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Listener is closed; persist what the background tasks built.
    if let Some(indexer) = indexer {
        indexer.flush()?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

// ============ Error response ============

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match status {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            _ => "internal",
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Run blocking work off the async executor, mapping a panicked or
/// cancelled task to a 500.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal(format!("task failed: {e}")))
}

// ============ UI and health ============

async fn handle_ui() -> Html<&'static str> {
    Html(UI_HTML)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

// ============ Ingest and reindex ============

#[derive(Deserialize)]
struct IngestParams {
    path: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = params.path.filter(|p| !p.is_empty()).ok_or_else(|| bad_request("path required"))?;
    let indexer = state.indexer()?;

    let meta = std::fs::metadata(&path).map_err(|e| bad_request(format!("{path}: {e}")))?;

    if meta.is_dir() {
        let files: Vec<PathBuf> = walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        let queued = files.len();
        for file in files {
            let indexer = Arc::clone(&indexer);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = indexer.ingest_file(&file) {
                    tracing::warn!(path = %file.display(), error = %e, "ingest failed");
                }
            });
        }

        return Ok(Json(json!({
            "status": "ok",
            "message": "Directory queued for indexing",
            "files": queued,
        })));
    }

    let target = PathBuf::from(&path);
    blocking(move || indexer.ingest_file(&target)).await??;

    Ok(Json(json!({ "status": "ok", "path": path })))
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let indexer = state.indexer()?;

    tokio::task::spawn_blocking(move || {
        let (ok, failed) = indexer.reindex_all();
        info!(ok, failed, "reindex complete");
    });

    Ok(Json(json!({
        "status": "ok",
        "message": "Reindex started in background",
    })))
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    k: Option<usize>,
    offset: Option<usize>,
    #[serde(rename = "type")]
    type_filter: Option<String>,
    path: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<crate::search::SearchPage>, AppError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("q (query) required"))?;
    let indexer = state.indexer()?;

    let request = SearchRequest {
        query: query.clone(),
        k: params.k.unwrap_or(10).clamp(1, 100),
        offset: params.offset.unwrap_or(0),
        type_filter: params.type_filter.filter(|t| !t.is_empty()),
        path_filter: params.path.filter(|p| !p.is_empty()),
    };

    let page = blocking(move || {
        search_chunks(indexer.embedder(), indexer.vectors(), &request)
    })
    .await??;

    state.history.lock().add(&query, page.results.len())?;

    Ok(Json(page))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let indexer = state.indexer()?;
    let stats = blocking(move || indexer.stats()).await?;
    Ok(Json(stats))
}

// ============ Graph ============

async fn handle_get_node(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<crate::graph::Node>, AppError> {
    let indexer = state.indexer()?;
    let node = indexer.graph().get_node(&id)?;
    Ok(Json(node))
}

#[derive(Deserialize)]
struct TraverseParams {
    start: Option<String>,
    #[serde(rename = "type")]
    edge_type: Option<String>,
    depth: Option<usize>,
}

async fn handle_traverse(
    State(state): State<AppState>,
    Query(params): Query<TraverseParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let start = params
        .start
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("start required"))?;
    let indexer = state.indexer()?;

    let depth = params.depth.unwrap_or(3).clamp(1, 10);
    let edge_type = params.edge_type.filter(|t| !t.is_empty());

    let nodes = indexer
        .graph()
        .traverse(&start, edge_type.as_deref(), depth)?;
    let count = nodes.len();

    Ok(Json(json!({
        "start": start,
        "nodes": nodes,
        "count": count,
    })))
}

#[derive(Deserialize)]
struct NodeSearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    node_type: Option<String>,
    limit: Option<usize>,
}

async fn handle_search_nodes(
    State(state): State<AppState>,
    Query(params): Query<NodeSearchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let indexer = state.indexer()?;

    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let node_type = params
        .node_type
        .filter(|t| !t.is_empty())
        .map(|t| match t.as_str() {
            "document" => "Document".to_string(),
            "chunk" => "Chunk".to_string(),
            "entity" => "Entity".to_string(),
            _ => t,
        });
    let query = params.q.filter(|q| !q.is_empty());

    let nodes = indexer
        .graph()
        .search_nodes(node_type.as_deref(), query.as_deref(), limit)?;
    let count = nodes.len();

    Ok(Json(json!({
        "query": query.unwrap_or_default(),
        "nodes": nodes,
        "count": count,
    })))
}

async fn handle_get_blob(
    State(state): State<AppState>,
    UrlPath(hash): UrlPath<String>,
) -> Result<Response, AppError> {
    let indexer = state.indexer()?;
    let data = indexer.blobs().get(&hash)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], data).into_response())
}

// ============ Export / import / reset ============

#[derive(Deserialize)]
struct ExportParams {
    output: Option<String>,
    blobs: Option<String>,
    graph: Option<String>,
    tfidf: Option<String>,
    history: Option<String>,
}

async fn handle_export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let opts = admin::ExportOptions {
        include_blobs: params.blobs.as_deref() != Some("false"),
        include_graph: params.graph.as_deref() != Some("false"),
        include_tfidf: params.tfidf.as_deref() != Some("false"),
        include_history: params.history.as_deref() != Some("false"),
        output_path: params.output.map(PathBuf::from),
    };

    let data_dir = state.data_dir.clone();
    let output = blocking(move || admin::export(&data_dir, &opts)).await??;

    Ok(Json(json!({
        "status": "ok",
        "output": output.display().to_string(),
        "message": "Export completed successfully",
    })))
}

#[derive(Deserialize)]
struct ImportParams {
    path: Option<String>,
    merge: Option<String>,
}

async fn handle_import(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = params.path.filter(|p| !p.is_empty()).ok_or_else(|| bad_request("path required"))?;
    let merge = params.merge.as_deref() == Some("true");

    let data_dir = state.data_dir.clone();
    blocking(move || admin::import(&data_dir, &PathBuf::from(path), merge)).await??;

    Ok(Json(json!({
        "status": "ok",
        "message": "Import completed successfully",
    })))
}

#[derive(Deserialize)]
struct ResetParams {
    confirm: Option<String>,
}

async fn handle_reset(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    if params.confirm.as_deref() != Some("yes") {
        return Err(bad_request("confirm=yes required"));
    }

    let data_dir = state.data_dir.clone();
    blocking(move || admin::reset(&data_dir)).await??;

    Ok(Json(json!({
        "status": "ok",
        "message": "All data has been reset",
    })))
}

// ============ Batch operations ============

#[derive(Deserialize)]
struct BatchParams {
    path: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    older_than: Option<i64>,
    dry_run: Option<String>,
}

async fn handle_batch_delete(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let indexer = state.indexer()?;
    let dry_run = params.dry_run.as_deref() == Some("true");

    let opts = admin::BatchDeleteOptions {
        path_pattern: params.path.filter(|p| !p.is_empty()),
        file_type: params.file_type.filter(|t| !t.is_empty()),
        older_than_days: params.older_than.unwrap_or(0),
        dry_run,
    };

    let deleted = blocking(move || admin::batch_delete(indexer.tracker(), &opts)).await??;

    Ok(Json(json!({
        "status": "ok",
        "deleted": deleted,
        "dry_run": dry_run,
        "message": format!("Deleted {deleted} files"),
    })))
}

async fn handle_batch_reindex(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let indexer = state.indexer()?;

    let paths = admin::batch_reindex_paths(
        indexer.tracker(),
        params.path.as_deref().filter(|p| !p.is_empty()),
        params.file_type.as_deref().filter(|t| !t.is_empty()),
    );

    let count = paths.len();
    for path in paths {
        let indexer = Arc::clone(&indexer);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = indexer.ingest_file(std::path::Path::new(&path)) {
                tracing::warn!(path = %path, error = %e, "batch reindex failed");
            }
        });
    }

    Ok(Json(json!({
        "status": "ok",
        "files": count,
        "message": format!("Reindexing {count} files"),
    })))
}

// ============ Search history ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn handle_get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.unwrap_or(20).max(1);
    let history = state.history.lock();
    let entries = history.recent(limit);

    Ok(Json(json!({
        "history": entries,
        "count": entries.len(),
    })))
}

async fn handle_clear_history(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.history.lock().clear()?;
    Ok(Json(json!({
        "status": "ok",
        "message": "Search history cleared",
    })))
}

// ============ Saved searches ============

#[derive(Deserialize)]
struct SavedSearchBody {
    name: Option<String>,
    query: Option<String>,
}

async fn handle_get_saved(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let saved = state.saved.lock();
    let all = saved.all();
    Ok(Json(json!({
        "saved": all,
        "count": all.len(),
    })))
}

async fn handle_save_search(
    State(state): State<AppState>,
    Json(body): Json<SavedSearchBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (name, query) = match (body.name, body.query) {
        (Some(n), Some(q)) if !n.is_empty() && !q.is_empty() => (n, q),
        _ => return Err(bad_request("name and query required")),
    };

    let search = state.saved.lock().add(&name, &query)?;
    Ok(Json(json!({ "status": "ok", "search": search })))
}

async fn handle_update_saved(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<SavedSearchBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (name, query) = match (body.name, body.query) {
        (Some(n), Some(q)) if !n.is_empty() && !q.is_empty() => (n, q),
        _ => return Err(bad_request("name and query required")),
    };

    let updated = state.saved.lock().update(&id, &name, &query)?;
    match updated {
        Some(search) => Ok(Json(json!({ "status": "ok", "search": search }))),
        None => Err(AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: format!("saved search not found: {id}"),
        }),
    }
}

async fn handle_delete_saved(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.saved.lock().delete(&id)?;
    Ok(Json(json!({
        "status": "ok",
        "message": "Search deleted",
    })))
}
