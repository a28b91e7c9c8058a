use axum::Json;
use time::OffsetDateTime;

use super::dto::HealthResponse;

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        message: "YouTube MP3 Downloader API is running".to_string(),
        timestamp: OffsetDateTime::now_utc(),
    })
}
