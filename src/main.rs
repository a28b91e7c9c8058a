use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::source::ytdlp::YtDlpProvider;
use infrastructure::storage::workspace::WorkspaceManager;
use modules::download::service::{DownloadService, PipelineSettings};
use state::AppState;
use workers::transcoder::FfmpegTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("song_downloader=info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;
    let workspaces = WorkspaceManager::new(&config.workspace_root);
    workspaces.prepare().await?;
    let workspace_root = workspaces.root().to_path_buf();

    let downloads = Arc::new(DownloadService::new(
        Arc::new(YtDlpProvider::new(config.ytdlp_path.clone())),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        workspaces,
        PipelineSettings::from(&config),
    ));
    tokio::spawn(log_job_events(downloads.clone()));

    let shutdown = CancellationToken::new();
    let port = config.server_port;
    let app = app::create_app(AppState::new(config, downloads, shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("🚀 Server running on port {}", port);
    info!("📍 Health check: http://localhost:{}/api/health", port);
    info!("📚 API docs: http://localhost:{}/swagger-ui", port);
    info!("📁 Temp directory: {}", workspace_root.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn log_job_events(downloads: Arc<DownloadService>) {
    let mut events = downloads.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => debug!(job_id = %event.job_id, "job is now {}", event.state),
            Err(RecvError::Lagged(skipped)) => warn!("Job event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, cancelling in-flight jobs");
    shutdown.cancel();
}
