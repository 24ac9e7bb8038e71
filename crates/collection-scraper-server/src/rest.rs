//! HTTP trigger surface.
//!
//! `/fetchOpensea` acknowledges immediately and hands the scrape to the
//! [`JobManager`]; the job id comes back in the `x-scrape-job` header and
//! can be polled at `/jobs/{id}`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use collection_scraper::BlobStore;
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::jobs::{JobInfo, JobManager};
use crate::renderer::BrowserLauncher;
use crate::scrape::{run_scrape, CaptureMode, ScrapeSettings};

/// Body returned by the scrape trigger, whatever the scrape's outcome.
pub const ACKNOWLEDGEMENT: &str = "fetchOpensea";

/// Body returned by the greeting endpoint.
pub const GREETING: &str = "Hello from collection-scraper!";

/// Response header carrying the submitted job id.
pub const JOB_ID_HEADER: &str = "x-scrape-job";

/// Shared state handed to every handler.
pub struct AppState {
    pub settings: ScrapeSettings,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub store: Arc<dyn BlobStore>,
    pub jobs: JobManager,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: ScrapeSettings,
        launcher: Arc<dyn BrowserLauncher>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            settings,
            launcher,
            store,
            jobs: JobManager::default(),
            started_at: Instant::now(),
        }
    }
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/fetchOpensea", any(fetch_opensea))
        .route("/helloWorld", any(hello_world))
        .route("/jobs/:id", get(job_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(addr: std::net::SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP trigger listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct TriggerParams {
    capture: Option<CaptureMode>,
}

async fn fetch_opensea(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TriggerParams>,
) -> impl IntoResponse {
    let mut settings = state.settings.clone();
    if let Some(capture) = params.capture {
        settings.capture = capture;
    }

    let info = JobInfo {
        target_url: settings.target_url.clone(),
        capture: settings.capture,
    };
    let launcher = Arc::clone(&state.launcher);
    let store = Arc::clone(&state.store);
    let handle = state
        .jobs
        .submit(info, async move {
            run_scrape(launcher.as_ref(), store.as_ref(), &settings).await
        })
        .await;

    ([(JOB_ID_HEADER, handle.id.to_string())], ACKNOWLEDGEMENT)
}

async fn hello_world() -> &'static str {
    tracing::info!("hello logs");
    GREETING
}

async fn job_status(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.jobs.get(id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("job not found: {id}") })),
        )
            .into_response(),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "running_jobs": state.jobs.running().await,
        "storage": state.store.describe(),
    }))
}
