pub mod feed;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use feedloom_common::{Platform, UnknownPlatform};
use feedloom_scout::ScoutError;
use serde_json::json;
use tracing::{info, warn};

use crate::AppState;

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

// --- Errors ---

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Scout(#[from] ScoutError),
}

impl From<UnknownPlatform> for ApiError {
    fn from(e: UnknownPlatform) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scout(ScoutError::CycleInProgress) => StatusCode::CONFLICT,
            ApiError::Scout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// --- Handlers ---

pub async fn health() -> &'static str {
    "ok"
}

pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let platforms: BTreeMap<&str, serde_json::Value> = Platform::ALL
        .into_iter()
        .map(|p| {
            (
                p.key(),
                json!({
                    "credential": state.config.platform(p).credential.is_some(),
                    "count": state.store().count(p),
                }),
            )
        })
        .collect();

    Json(json!({
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "autoSync": state.publication().auto_sync(),
        "publisher": state.publication().has_publisher(),
        "mirrorAlt": state.ingestor().mirrors_alt(),
        "fetchIntervalMinutes": state.scheduler.interval().as_secs() / 60,
        "cycleRunning": state.scheduler.is_running(),
        "platforms": platforms,
        "lastCycle": state.scheduler.last_report(),
    }))
}

/// Run one fetch cycle and return its report.
pub async fn api_fetch(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    info!("Manual fetch requested");
    let report = state.scheduler.run_now().await?;
    Ok(Json(report))
}

/// Publish every platform that has stored items.
pub async fn api_sync(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let results: BTreeMap<&str, _> = state
        .publication()
        .publish_all()
        .await
        .into_iter()
        .map(|(platform, outcome)| (platform.key(), outcome))
        .collect();
    Json(json!({ "success": true, "results": results }))
}

pub async fn api_rss(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = platform.parse()?;
    let xml = state.publication().render(platform);
    Ok(([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], xml))
}

pub async fn api_data(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = platform.parse()?;
    let items = state.store().load(platform);
    Ok(Json(json!({
        "code": 0,
        "total": items.len(),
        "data": items,
    })))
}
