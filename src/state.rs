use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::settings::AppConfig;
use crate::modules::download::service::DownloadService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub downloads: Arc<DownloadService>,
    /// Cancelled on shutdown; every job runs under a child of this token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        downloads: Arc<DownloadService>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            downloads,
            shutdown,
        }
    }
}
