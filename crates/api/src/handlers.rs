//! Addon-protocol HTTP handlers

use crate::error::{ApiError, ApiResult};
use crate::models::{Manifest, Stream, StreamsResponse};
use axum::extract::{Path, State};
use axum::Json;
use magnetarr_core::{ContentId, MediaType, SearchRequest};
use magnetarr_indexers::SearchDispatcher;
use std::sync::Arc;
use tracing::{info, instrument};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<SearchDispatcher>,
}

/// GET /manifest.json
pub async fn manifest() -> Json<Manifest> {
    Json(Manifest::current())
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /stream/:type/:id.json
///
/// The id segment is `tt…[:season:episode]` or `kitsu:…[:episode]` with a
/// `.json` suffix.
#[instrument(skip(state))]
pub async fn streams(
    State(state): State<AppState>,
    Path((media_type, raw_id)): Path<(String, String)>,
) -> ApiResult<Json<StreamsResponse>> {
    let media_type = MediaType::parse(&media_type).ok_or_else(|| ApiError::BadRequest {
        message: format!("unsupported type: {}", media_type),
    })?;
    let raw_id = raw_id.strip_suffix(".json").unwrap_or(&raw_id);
    let (id, season, episode) = ContentId::parse(raw_id).ok_or_else(|| ApiError::BadRequest {
        message: format!("unparseable id: {}", raw_id),
    })?;

    let request = SearchRequest::new(id, media_type).with_episode(season, episode);
    let torrents = state.dispatcher.search(&request).await;
    info!(count = torrents.len(), "stream lookup complete");

    Ok(Json(StreamsResponse {
        streams: torrents.iter().map(Stream::from).collect(),
    }))
}
