// Dex Normalizer - Read-only Web Server
// REST API with Axum over a store populated by `dex-normalizer import`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use dex_normalizer::config::{DATABASE_ENV_VAR, DEFAULT_DATABASE_PATH, DEFAULT_SERVER_ADDR};
use dex_normalizer::{
    get_entity_view, get_load_runs, list_terms, lookup_term, table_counts, Store, TermKind,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<Store>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn internal(context: &str, err: impl std::fmt::Display) -> Response {
    error!("Error {}: {}", context, err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
}

fn parse_kind(kind: &str) -> Result<TermKind, Response> {
    TermKind::parse(kind).ok_or_else(|| {
        failure(
            StatusCode::BAD_REQUEST,
            format!("unknown term kind {kind:?}; expected \"category\" or \"trait\""),
        )
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/counts - Row counts per catalog table
async fn get_counts(State(state): State<AppState>) -> Response {
    let Ok(store) = state.store.lock() else {
        return internal("locking store", "poisoned");
    };
    match table_counts(store.conn()) {
        Ok(counts) => ApiResponse::ok(counts),
        Err(e) => internal("counting tables", e),
    }
}

/// GET /api/entities/:key - One entity with bundles, categories, traits
async fn get_entity(State(state): State<AppState>, Path(key): Path<i64>) -> Response {
    let Ok(store) = state.store.lock() else {
        return internal("locking store", "poisoned");
    };
    match get_entity_view(store.conn(), key) {
        Ok(Some(view)) => ApiResponse::ok(view),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("no entity with key {key}")),
        Err(e) => internal("loading entity", e),
    }
}

/// GET /api/terms/:kind - All terms of one vocabulary
async fn get_terms(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let Ok(store) = state.store.lock() else {
        return internal("locking store", "poisoned");
    };
    match list_terms(store.conn(), kind) {
        Ok(terms) => ApiResponse::ok(terms),
        Err(e) => internal("listing terms", e),
    }
}

/// GET /api/terms/:kind/:name - Id of one term (name arrives percent-decoded)
async fn get_term(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let Ok(store) = state.store.lock() else {
        return internal("locking store", "poisoned");
    };
    match lookup_term(store.conn(), kind, &name) {
        Ok(Some(id)) => ApiResponse::ok(serde_json::json!({ "id": id, "name": name })),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("no {kind} term {name:?}")),
        Err(e) => internal("looking up term", e),
    }
}

/// GET /api/runs - Recorded load runs, newest first
async fn get_runs(State(state): State<AppState>) -> Response {
    let Ok(store) = state.store.lock() else {
        return internal("locking store", "poisoned");
    };
    match get_load_runs(store.conn()) {
        Ok(runs) => ApiResponse::ok(runs),
        Err(e) => internal("listing load runs", e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let db_path = std::env::var(DATABASE_ENV_VAR).unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
    let db_path = std::path::Path::new(&db_path);

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {:?}. Run `dex-normalizer import` first.",
            db_path
        );
    }

    let store = Store::open_read_only(db_path)?;
    info!("Database opened: {:?}", db_path);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/counts", get(get_counts))
        .route("/entities/:key", get(get_entity))
        .route("/terms/:kind", get(get_terms))
        .route("/terms/:kind/:name", get(get_term))
        .route("/runs", get(get_runs))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(DEFAULT_SERVER_ADDR).await?;
    info!("Server running on http://{}", DEFAULT_SERVER_ADDR);
    info!("API: http://{}/api/counts", DEFAULT_SERVER_ADDR);

    axum::serve(listener, app).await?;
    Ok(())
}
