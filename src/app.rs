use axum::http::{header, HeaderValue};
use axum::Router;
use crate::state::AppState;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Requests only ever carry a URL.
const MAX_REQUEST_BODY: usize = 16 * 1024;

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes(&state)
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
