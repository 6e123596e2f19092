//! API Service - spreadsheet upload endpoint for the enforcement database
//!
//! Endpoints:
//! - GET /               - Welcome message
//! - GET /health         - Health check
//! - POST /upload-csv    - Upload a sheet (multipart field `file`),
//!                         optional ?layout=case|accusation|report&sheet=

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ingest::sheet;
use ingest::{ingest_rows, GroupingOptions, Grouped, IngestConfig, PgStore, SheetLayout, Store};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// ============================================================================
// State
// ============================================================================

struct AppState {
    store: Arc<dyn Store>,
    options: GroupingOptions,
    /// Held for the whole persistence step: find-or-create is read then
    /// write, so uploads must not interleave against the same store.
    ingest_lock: Mutex<()>,
}

impl AppState {
    fn new(store: Arc<dyn Store>, options: GroupingOptions) -> Self {
        Self {
            store,
            options,
            ingest_lock: Mutex::new(()),
        }
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Deserialize)]
struct UploadQuery {
    layout: Option<String>,
    sheet: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    data: Grouped,
    parsed: bool,
    persisted: bool,
    failures: Vec<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Enforcement sheet ingest API",
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Response {
    let layout = match params.layout.as_deref() {
        None => SheetLayout::CaseDisposition,
        Some(raw) => match raw.parse::<SheetLayout>() {
            Ok(layout) => layout,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
    };

    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => upload = Some((file_name, bytes.to_vec())),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
        }
    }

    let (file_name, bytes) = match upload {
        Some(upload) => upload,
        None => return error_response(StatusCode::BAD_REQUEST, "No file part"),
    };
    if file_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No selected file");
    }
    if bytes.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Uploaded file is empty");
    }

    info!(file = %file_name, size = bytes.len(), layout = layout.as_str(), "upload received");

    // calamine and csv are synchronous; keep them off the async workers
    let sheet_name = params.sheet;
    let read_name = file_name.clone();
    let read = tokio::task::spawn_blocking(move || {
        sheet::read_bytes(&bytes, &read_name, layout, sheet_name.as_deref())
    })
    .await;

    let rows = match read {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            warn!(file = %file_name, error = %e, "upload failed to parse");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("sheet reader task failed: {e}"),
            );
        }
    };

    let outcome = {
        let _guard = state.ingest_lock.lock().await;
        ingest_rows(&rows, layout, Some(state.store.as_ref()), state.options).await
    };

    let message = if outcome.persisted {
        "File successfully processed"
    } else {
        "File processed with persistence failures"
    };
    let failures = outcome.failures().to_vec();
    Json(UploadResponse {
        message,
        data: outcome.data,
        parsed: outcome.parsed,
        persisted: outcome.persisted,
        failures,
    })
    .into_response()
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    // CORS for web frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/upload-csv", post(upload_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = IngestConfig::from_env()?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {raw}"))?,
        Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
    };

    println!("=== Enforcement Sheet Ingest API ===");
    println!("Connecting to database...");

    let store = PgStore::connect(&config)
        .await
        .context("Failed to connect to database")?;

    println!("Database connected");

    let state = Arc::new(AppState::new(Arc::new(store), config.grouping_options()));
    let app = build_router(state, max_upload_bytes);

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET /");
    println!("  GET /health");
    println!("  POST /upload-csv?layout=case|accusation|report&sheet=");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
