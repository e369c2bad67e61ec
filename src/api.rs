//! HTTP surface under `/api/sharepoint`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::error;

use spdedupe_core::{
    DedupeError, ReplacementRequest, ReplacementResult, ScanRegistry, ScanReport, ScannerConfig,
    VerificationResult,
};
use spdedupe_graph::RemoteStore;
use spdedupe_ops::{Replacer, Verifier};
use spdedupe_scan::ScanOrchestrator;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ScanRegistry>,
    orchestrator: Arc<ScanOrchestrator>,
    replacer: Arc<Replacer>,
    verifier: Arc<Verifier>,
    shutdown: CancellationToken,
}

impl AppState {
    /// `shutdown` is the parent of every request's cancellation token.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        scanner: ScannerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ScanRegistry::new());
        Self {
            orchestrator: Arc::new(ScanOrchestrator::new(
                store.clone(),
                registry.clone(),
                scanner,
            )),
            replacer: Arc::new(Replacer::new(store.clone(), registry.clone())),
            verifier: Arc::new(Verifier::new(store, registry.clone())),
            registry,
            shutdown,
        }
    }

    /// Run `op` on its own task with a child of the shutdown token. Dropping
    /// the returned future, e.g. on client disconnect, cancels that token.
    async fn spawn<T, F>(&self, op: impl FnOnce(CancellationToken) -> F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, DedupeError>> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let _guard = token.clone().drop_guard();
        tokio::spawn(op(token))
            .await
            .map_err(|e| ApiError::Internal(format!("Request task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sharepoint/scan", post(start_scan))
        .route("/api/sharepoint/scan/{id}", get(get_scan))
        .route("/api/sharepoint/scans", get(list_scans))
        .route("/api/sharepoint/replace", post(replace))
        .route("/api/sharepoint/verify/", post(verify_without_id))
        .route("/api/sharepoint/verify/{id}", post(verify))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScanRequest {
    site_url: String,
}

async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanReport>, ApiError> {
    let site_url = request.site_url.trim().to_string();
    if site_url.is_empty() {
        return Err(DedupeError::invalid_input("Site URL is required").into());
    }

    let orchestrator = state.orchestrator.clone();
    let report = state
        .spawn(move |cancel| async move {
            Ok::<_, DedupeError>(orchestrator.scan_site(&site_url, &cancel).await)
        })
        .await?;
    Ok(Json(report))
}

async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScanReport>, ApiError> {
    state
        .registry
        .report(&id)
        .map(Json)
        .ok_or_else(|| DedupeError::not_found("Scan report", id).into())
}

async fn list_scans(State(state): State<AppState>) -> Json<Vec<ScanReport>> {
    Json(state.registry.reports())
}

async fn replace(
    State(state): State<AppState>,
    Json(request): Json<ReplacementRequest>,
) -> Result<Json<ReplacementResult>, ApiError> {
    let replacer = state.replacer.clone();
    let result = state
        .spawn(move |cancel| async move { replacer.replace(&request, &cancel).await })
        .await?;
    Ok(Json(result))
}

async fn verify_without_id() -> ApiError {
    DedupeError::invalid_input("Scan ID is required").into()
}

async fn verify(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VerificationResult>, ApiError> {
    let verifier = state.verifier.clone();
    let result = state
        .spawn(move |cancel| async move { verifier.verify(&id, &cancel).await })
        .await?;
    Ok(Json(result))
}

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    Dedupe(DedupeError),
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Dedupe(DedupeError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Dedupe(DedupeError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Dedupe(DedupeError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dedupe(DedupeError::Remote(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Dedupe(err) => err.to_string(),
            ApiError::Internal(reason) => reason.clone(),
        }
    }
}

impl From<DedupeError> for ApiError {
    fn from(err: DedupeError) -> Self {
        ApiError::Dedupe(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.message(), "Request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
