// Main entry point for the image moderation service

use nsfw_detector::{
    core::{types::*, BatchError, Config},
    orchestration::BatchOrchestrator,
    services::Collaborators,
    utils::Metrics,
};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<BatchOrchestrator>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "nsfw_detector={},tower_http=warn",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== NSFW IMAGE MODERATION ===");
    info!(
        "Config: threshold={} ocr_workers={} rewrite_workers={} sub_batch={} timeout={}s",
        config.toxic_threshold(),
        config.ocr_workers(),
        config.rewrite_workers(),
        config.toxic_batch_size(),
        config.batch_timeout().as_secs()
    );

    let metrics = Metrics::new();

    // Dictionary loading is CPU-heavy; keep it off the async workers
    info!("Loading collaborators...");
    let collaborators = {
        let config = config.clone();
        let handle = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || Collaborators::from_config(&config, handle)).await??
    };

    let orchestrator = Arc::new(BatchOrchestrator::new(config.clone(), collaborators, metrics.clone()));
    let state = AppState {
        orchestrator,
        metrics,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/predict", post(predict))
        .route("/predict/single", post(predict_single))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                - Root endpoint");
    info!("  GET  /health          - Health check");
    info!("  GET  /metrics         - Prometheus metrics");
    info!("  GET  /stats           - Detailed statistics");
    info!("  POST /predict         - Moderate images (multipart field \"files\")");
    info!("  POST /predict/single  - Moderate one image, legacy response");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "NSFW Image Moderation Service"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "rewrite_mode": state.orchestrator.rewrite_mode(),
        "blocklist_terms": state.orchestrator.blocklist_size(),
        "classifier_circuit": format!("{:?}", state.orchestrator.circuit_state()),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    serde_json::to_value(state.metrics.snapshot())
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize metrics: {}", e),
            )
        })
}

fn error_response(err: BatchError) -> (StatusCode, String) {
    let status = match err {
        BatchError::EmptyBatch | BatchError::InvalidSubmission(_) => StatusCode::BAD_REQUEST,
        BatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, err.to_string())
}

/// Collect uploaded files into items, in upload order.
///
/// Accepts fields named `files` (and `file`); stops after `limit` files when
/// given. Undecodable files still become items and fail individually.
async fn read_uploads(multipart: &mut Multipart, limit: Option<usize>) -> Result<Vec<Item>, BatchError> {
    let mut items = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BatchError::InvalidSubmission(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "files" && name != "file" {
            warn!("Ignoring multipart field '{}'", name);
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload_{}", items.len()));
        let data = field
            .bytes()
            .await
            .map_err(|e| BatchError::InvalidSubmission(format!("Read error: {}", e)))?;

        items.push(Item::from_bytes(items.len(), filename, data.to_vec()));
        if limit.is_some_and(|limit| items.len() >= limit) {
            break;
        }
    }

    Ok(items)
}

/// Moderate a batch of uploaded images
///
/// # Request Format:
/// - multipart/form-data, one or more "files" fields
///
/// # Response:
/// - BatchResult JSON, predictions in upload order
async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/predict");

    let items = read_uploads(&mut multipart, None)
        .await
        .map_err(error_response)?;
    info!("Received {} images", items.len());

    let result = state
        .orchestrator
        .process_batch(items)
        .await
        .map_err(|e| {
            error!("Batch processing failed: {}", e);
            error_response(e)
        })?;

    Ok(Json(result))
}

/// Moderate one image; responds with `{filename, final_nsfw}` only
async fn predict_single(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<LegacyVerdict>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/predict/single");

    let items = read_uploads(&mut multipart, Some(1))
        .await
        .map_err(error_response)?;

    let result = state
        .orchestrator
        .process_batch(items)
        .await
        .map_err(|e| {
            error!("Single-image processing failed: {}", e);
            error_response(e)
        })?;

    result
        .predictions
        .first()
        .map(|verdict| Json(LegacyVerdict::from(verdict)))
        .ok_or_else(|| error_response(BatchError::EmptyBatch))
}
