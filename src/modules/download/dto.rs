use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DownloadRequest {
    /// Link to a YouTube video, e.g. `https://youtu.be/dQw4w9WgXcQ`.
    #[serde(default)]
    #[validate(length(min = 1, message = "YouTube URL is required"))]
    pub url: String,
}
