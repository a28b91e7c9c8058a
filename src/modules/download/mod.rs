use axum::routing::post;
use axum::Router;
use crate::state::AppState;

pub mod delivery;
pub mod dto;
pub mod error;
pub mod handler;
pub mod model;
pub mod provider;
pub mod service;
#[cfg(test)]
pub mod testing;

pub fn router() -> Router<AppState> {
    Router::new().route("/download", post(handler::download))
}
