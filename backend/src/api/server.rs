//! HTTP server for the consolidation service.
//!
//! Provides REST endpoints to upload branch workbooks and get the
//! consolidated table back.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                            |
//! |--------|--------------------|----------------------------------------|
//! | GET    | `/health`          | Health check                           |
//! | POST   | `/api/consolidate` | Upload workbooks (`file` fields)       |
//! | GET    | `/api/logs`        | SSE stream for real-time logs          |

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::types::{error_response, failed_run_response, ConsolidateResponse};
use crate::config::{format_timestamp, AppConfig};
use crate::error::ConfigResult;
use crate::logs::{log_error, log_info, LOG_BROADCASTER};
use crate::output::write_consolidated;
use crate::schema::SchemaDescriptor;
use crate::transform::pipeline::{consolidate, RunOutput, SourceFile};

/// Upload size cap for one request.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

type ApiError = (StatusCode, Json<Value>);

/// Immutable state shared by all requests.
pub struct AppState {
    pub config: AppConfig,
    pub descriptor: SchemaDescriptor,
}

impl AppState {
    pub fn new(config: AppConfig) -> ConfigResult<Self> {
        let descriptor = config.descriptor()?;
        Ok(Self { config, descriptor })
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/consolidate", post(consolidate_upload))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Consolidator server running on http://localhost:{}", port);
    println!("   POST /api/consolidate - Upload branch workbooks");
    println!("   GET  /api/logs        - SSE log stream");
    println!("   GET  /health          - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "consolidator",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "consolidate": "POST /api/consolidate",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: every `file` field is one branch workbook.
async fn consolidate_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ConsolidateResponse>, ApiError> {
    let mut sources = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(format!("Multipart error: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let id = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload_{}", sources.len() + 1));
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Read error: {}", e)))?;
        sources.push(SourceFile::new(id, bytes.to_vec()));
    }

    if sources.is_empty() {
        return Err(bad_request("No file provided".to_string()));
    }

    log_info(format!("📥 Upload with {} workbook(s)", sources.len()));

    // Workbook parsing is CPU-bound.
    let output = tokio::task::spawn_blocking(move || consolidate_sources(&state, sources))
        .await
        .map_err(|e| internal_error(e.to_string()))??;

    Ok(Json(ConsolidateResponse::from(output)))
}

/// Consolidate uploaded files and write the artifact.
pub(crate) fn consolidate_sources(
    state: &AppState,
    sources: Vec<SourceFile>,
) -> Result<RunOutput, ApiError> {
    let config = &state.config;
    let result = consolidate(
        sources.into_iter().map(Ok).collect(),
        &state.descriptor,
        &config.transform,
    );

    let rows = match result.rows {
        Ok(rows) => rows,
        Err(e) => {
            log_error(format!("Run aborted: {}", e));
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(failed_run_response(&e.to_string(), &result.summary, &result.reports)),
            ));
        }
    };

    // Concurrent requests may share a second; the run id keeps names apart.
    let stamp = format!(
        "{}_{}",
        format_timestamp(&config.formats.timestamp),
        result.summary.run_id
    );
    let artifact = write_consolidated(&rows, &config.output, &config.paths.summary_dir, &stamp)
        .map_err(|e| {
            log_error(format!("Output error: {}", e));
            internal_error(e.to_string())
        })?;

    Ok(RunOutput {
        summary: result.summary,
        reports: result.reports,
        rows,
        artifact,
    })
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&message)))
}

fn internal_error(message: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&message)))
}
