//! API route definitions.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::analysis::simulator::{decode_frame, mint_analysis_id};
use crate::analysis::store::{StoreStats, StoredAnalysis};
use crate::analysis::{AnalysisProvider, AnalysisResult, MediaType, MediaUpload, WebcamAnalysisResult};
use crate::assistant::{self, AssistantReply, AssistantRequest};
use crate::overlay;

/// Largest overlay edge served, in pixels.
const MAX_OVERLAY_EDGE: u32 = 4096;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze/image", post(analyze_image))
        .route("/analyze/video", post(analyze_video))
        .route("/analyze/audio", post(analyze_audio))
        .route("/analyze/webcam", post(analyze_webcam))
        .route("/analysis", get(list_analyses))
        .route("/analysis/{id}", get(get_analysis).delete(delete_analysis))
        .route("/analysis/{id}/overlay.svg", get(analysis_overlay))
        .route("/stats", get(stats))
        .route("/assistant", post(ask_assistant))
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to Satya AI Deepfake Detection API" }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

async fn analyze_image(state: State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    accept_upload(state, MediaType::Image, multipart).await
}

async fn analyze_video(state: State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    accept_upload(state, MediaType::Video, multipart).await
}

async fn analyze_audio(state: State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    accept_upload(state, MediaType::Audio, multipart).await
}

/// Default detection sensitivity when the form does not carry one.
const DEFAULT_SENSITIVITY: f64 = 0.75;

/// Pull the `file` field (and optional `sensitivity`) out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> ApiResult<(MediaUpload, f64)> {
    let mut upload = None;
    let mut sensitivity = DEFAULT_SENSITIVITY;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await?;
                upload = Some(MediaUpload::new(file_name, content_type, data));
            }
            Some("sensitivity") => {
                let text = field.text().await?;
                sensitivity = text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| (0.0..=1.0).contains(v))
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("sensitivity must be a number in [0, 1], got '{}'", text))
                    })?;
            }
            _ => {}
        }
    }
    let upload = upload.ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;
    Ok((upload, sensitivity))
}

/// Validate the upload, register a pending entry and process it in the
/// background. Answers 202 with the new id.
async fn accept_upload(
    State(state): State<AppState>,
    media_type: MediaType,
    multipart: Multipart,
) -> ApiResult<Response> {
    let (upload, sensitivity) = read_upload(multipart).await?;
    if let Err(e) = upload.validate(media_type, state.server.max_upload_bytes) {
        warn!(%media_type, file = %upload.file_name, error = %e, "upload rejected");
        return Err(e.into());
    }

    let id = mint_analysis_id(media_type);
    state.store.mark_pending(&id, media_type).await;
    info!(
        %id,
        %media_type,
        file = %upload.file_name,
        bytes = upload.size(),
        sensitivity,
        "analysis accepted"
    );

    let simulator = state.simulator.clone();
    let task_id = id.clone();
    tokio::spawn(async move {
        simulator.process(&task_id, media_type, &upload).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Analysis started", "analysis_id": id })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct WebcamFrameRequest {
    pub frame_data: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

async fn analyze_webcam(
    State(state): State<AppState>,
    Json(req): Json<WebcamFrameRequest>,
) -> ApiResult<Json<WebcamAnalysisResult>> {
    decode_frame(&req.frame_data)?;
    let result = state
        .simulator
        .analyze_frame(&req.frame_data, req.session_id.as_deref())
        .await?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

fn pending_response(id: &str, media_type: MediaType) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "media_type": media_type, "status": "processing" })),
    )
        .into_response()
}

/// Finished result for `id`, or the response to send instead.
async fn lookup(state: &AppState, id: &str) -> ApiResult<Result<AnalysisResult, Response>> {
    match state.store.get(id).await {
        Some(StoredAnalysis::Ready(result)) => Ok(Ok(result)),
        Some(StoredAnalysis::Pending { media_type, .. }) => Ok(Err(pending_response(id, media_type))),
        None => Err(ApiError::NotFound("Analysis not found".to_string())),
    }
}

async fn get_analysis(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    Ok(match lookup(&state, &id).await? {
        Ok(result) => Json(result).into_response(),
        Err(pending) => pending,
    })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub media_type: Option<String>,
    pub limit: Option<usize>,
}

async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<AnalysisResult>>> {
    let limit = query.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest("limit must be between 1 and 100".to_string()));
    }
    let media_type = query
        .media_type
        .as_deref()
        .map(str::parse::<MediaType>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    Ok(Json(state.store.list(media_type, limit).await))
}

async fn delete_analysis(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !state.store.remove(&id).await {
        return Err(ApiError::NotFound("Analysis not found".to_string()));
    }
    info!(%id, "analysis deleted");
    Ok(Json(json!({ "message": "Analysis deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct OverlayQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

async fn analysis_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OverlayQuery>,
) -> ApiResult<Response> {
    let width = query.width.unwrap_or(640);
    let height = query.height.unwrap_or(480);
    let edge = 1..=MAX_OVERLAY_EDGE;
    if !edge.contains(&width) || !edge.contains(&height) {
        return Err(ApiError::BadRequest(format!(
            "width and height must be between 1 and {}",
            MAX_OVERLAY_EDGE
        )));
    }

    let result = match lookup(&state, &id).await? {
        Ok(result) => result,
        Err(pending) => return Ok(pending),
    };
    let svg = overlay::render_svg(&result.areas, width, height);
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

async fn stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.store.stats().await)
}

async fn ask_assistant(Json(req): Json<AssistantRequest>) -> Json<AssistantReply> {
    Json(AssistantReply {
        reply: assistant::reply(&req.message).to_string(),
    })
}
