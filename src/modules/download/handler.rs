use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};
use validator::Validate;

use super::dto::DownloadRequest;
use super::error::{InvalidInputReason, PipelineError};
use crate::common::response::{ApiError, ErrorBody};
use crate::state::AppState;

/// Download a YouTube video's audio as MP3
///
/// Fetches the best audio track, converts it to 320 kbps MP3 and streams the
/// file back as an attachment named after the video title.
#[utoipa::path(
    post,
    path = "/api/download",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "MP3 file", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 400, description = "Missing or invalid URL", body = ErrorBody),
        (status = 502, description = "Video unavailable upstream", body = ErrorBody),
        (status = 500, description = "Download or conversion failed", body = ErrorBody)
    ),
    tag = "Download"
)]
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("❌ Unreadable download request: {}", rejection.body_text());
            return ApiError::from(PipelineError::InvalidInput(InvalidInputReason::Missing))
                .into_response();
        }
    };

    info!("📥 Download request received: {}", req.url);

    if req.validate().is_err() {
        warn!("❌ No URL provided");
        return ApiError::from(PipelineError::InvalidInput(InvalidInputReason::Missing))
            .into_response();
    }

    let cancel = state.shutdown.child_token();
    match state.downloads.run(&req.url, cancel).await {
        Ok(artifact) => artifact.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
