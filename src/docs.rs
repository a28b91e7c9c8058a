use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "YouTube MP3 Downloader",
        description = "Extracts the audio of a YouTube video and returns it as an MP3 file."
    ),
    paths(
        crate::modules::download::handler::download,
        crate::modules::health::handler::health,
    ),
    components(
        schemas(
            crate::modules::download::dto::DownloadRequest,
            crate::modules::health::dto::HealthResponse,
            crate::common::response::ErrorBody,
        )
    ),
    tags(
        (name = "Download", description = "Audio extraction"),
        (name = "Health", description = "Service status")
    )
)]
pub struct ApiDoc;
