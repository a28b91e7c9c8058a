use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use crate::docs::ApiDoc;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use crate::modules::{download, health};
use crate::state::AppState;
use tracing::warn;

use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn configure_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes())
        .layer(cors(&state.config.cors_origin))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(download::router())
}

fn cors(origin: &str) -> CorsLayer {
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!("⚠️  CORS_ORIGIN {:?} is not a valid header value, falling back to localhost:4200", origin);
            AllowOrigin::exact(HeaderValue::from_static("http://localhost:4200"))
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .expose_headers([header::CONTENT_DISPOSITION])
}

#[cfg(test)]
mod tests {
    use crate::config::settings::AppConfig;
    use crate::infrastructure::storage::workspace::WorkspaceManager;
    use crate::modules::download::service::{DownloadService, PipelineSettings};
    use crate::modules::download::testing::{CallLog, FakeProvider, FakeTranscoder, TranscodeBehavior};
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{header, HeaderValue, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        let config = AppConfig::default();
        let downloads = DownloadService::new(
            Arc::new(FakeProvider::new("x")),
            Arc::new(FakeTranscoder::new(
                TranscodeBehavior::Succeed { delay: Duration::ZERO },
                CallLog::default(),
            )),
            WorkspaceManager::new(&config.workspace_root),
            PipelineSettings::from(&config),
        );
        crate::app::create_app(AppState::new(config, Arc::new(downloads), CancellationToken::new()))
    }

    #[tokio::test]
    async fn health_is_served_under_api() {
        let response = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn preflight_allows_the_configured_origin_only() {
        let preflight = |origin: &'static str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/download")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app().oneshot(preflight("http://localhost:4200")).await.unwrap();
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:4200"
        );
        assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let denied = app().oneshot(preflight("http://elsewhere.test")).await.unwrap();
        assert_ne!(
            denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://elsewhere.test"))
        );
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let response = app()
            .oneshot(Request::get("/api/v1/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
