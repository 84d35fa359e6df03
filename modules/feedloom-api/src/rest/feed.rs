// Service: batches pushed by the browser extensions.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Json},
};
use feedloom_common::{ActivityItem, Platform};
use feedloom_scout::Ingested;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::ApiError;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    success: bool,
    #[serde(flatten)]
    ingested: Ingested,
}

/// `POST /api/feed` with `{platform, items}`. Items carry the normalized
/// shape; their `platform` is taken from the envelope.
pub async fn api_push(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (platform, items) = parse_batch(body)?;

    info!(%platform, count = items.len(), "Received pushed batch");
    let ingested = state.ingestor().ingest(platform, items).await?;

    Ok(Json(PushResponse {
        success: true,
        ingested,
    }))
}

fn parse_batch(body: Value) -> Result<(Platform, Vec<ActivityItem>), ApiError> {
    let platform: Platform = body
        .get("platform")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Missing platform".into()))?
        .parse()?;

    let Some(Value::Array(raw_items)) = body.get("items") else {
        return Err(ApiError::BadRequest("Missing items array".into()));
    };

    let items = raw_items
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut raw = raw.clone();
            if let Some(object) = raw.as_object_mut() {
                object.insert("platform".into(), Value::from(platform.key()));
            }
            let item: ActivityItem = serde_json::from_value(raw)
                .map_err(|e| ApiError::BadRequest(format!("Invalid item at index {index}: {e}")))?;
            if item.id.is_empty() {
                return Err(ApiError::BadRequest(format!(
                    "Invalid item at index {index}: empty id"
                )));
            }
            Ok(item)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((platform, items))
}
