use futures_util::StreamExt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use super::delivery::Artifact;
use super::error::{FailureKind, InvalidInputReason, PipelineError};
use super::model::{sanitize_title, Job, JobEvent, JobState, SourceMetadata};
use super::provider::{
    AudioCodec, AudioQuality, SourceError, SourceStreamProvider, TranscodeEvent, TranscodeParams,
    Transcoder,
};
use crate::config::settings::AppConfig;
use crate::infrastructure::storage::workspace::{Workspace, WorkspaceManager};

/// How often (in bytes) acquisition progress is logged.
const PROGRESS_LOG_STEP: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bitrate_kbps: u32,
    pub codec: AudioCodec,
    pub resolve_timeout: Duration,
    pub acquire_timeout: Duration,
    pub transcode_timeout: Duration,
    pub max_concurrent_transcodes: usize,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            bitrate_kbps: config.audio_bitrate_kbps,
            codec: AudioCodec::Mp3,
            resolve_timeout: config.resolve_timeout,
            acquire_timeout: config.acquire_timeout,
            transcode_timeout: config.transcode_timeout,
            max_concurrent_transcodes: config.max_concurrent_transcodes,
        }
    }
}

/// Runs jobs through resolve → acquire → transcode and hands back an
/// [`Artifact`] ready for delivery. Failures at any stage tear the job's
/// workspace down before the error is returned.
pub struct DownloadService {
    provider: Arc<dyn SourceStreamProvider>,
    transcoder: Arc<dyn Transcoder>,
    workspaces: WorkspaceManager,
    settings: PipelineSettings,
    transcode_slots: Semaphore,
    events: broadcast::Sender<JobEvent>,
}

impl DownloadService {
    pub fn new(
        provider: Arc<dyn SourceStreamProvider>,
        transcoder: Arc<dyn Transcoder>,
        workspaces: WorkspaceManager,
        settings: PipelineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            provider,
            transcoder,
            workspaces,
            transcode_slots: Semaphore::new(settings.max_concurrent_transcodes.max(1)),
            settings,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub async fn run(&self, url: &str, cancel: CancellationToken) -> Result<Artifact, PipelineError> {
        let mut job = Job::new(url.trim());
        let span = tracing::info_span!("job", job_id = %job.id.simple());

        async move {
            self.publish(&job);
            let mut workspace = None;

            match self.stages(&mut job, &mut workspace, &cancel).await {
                Ok((file, len)) => {
                    let (Some(workspace), Some(output)) = (workspace, job.output_path.clone()) else {
                        let err = PipelineError::Internal("stages finished without an artifact".into());
                        self.fail(&mut job, None, &err).await;
                        return Err(err);
                    };
                    let filename = job.download_name(self.settings.codec.extension());
                    info!("🎵 Ready to send {} ({} bytes)", filename, len);
                    Ok(Artifact::new(job, workspace, file, len, filename, &output, self.events.clone()))
                }
                Err(err) => {
                    self.fail(&mut job, workspace.as_ref(), &err).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn stages(
        &self,
        job: &mut Job,
        workspace: &mut Option<Workspace>,
        cancel: &CancellationToken,
    ) -> Result<(tokio::fs::File, u64), PipelineError> {
        let metadata = self.resolve(&job.url, cancel).await?;
        info!("🎵 Video title: {}", metadata.title);
        info!("⏱️  Duration: {} seconds", metadata.duration_seconds);
        job.title = Some(sanitize_title(&metadata.title));

        self.advance(job, JobState::Acquiring)?;
        let ws = workspace.insert(
            self.workspaces
                .create(job.id)
                .await
                .map_err(|e| PipelineError::Internal(format!("failed to create workspace: {e}")))?,
        );
        let id = job.id.simple().to_string();
        let raw_path = ws.file(&format!("{id}.raw"));
        let title = job.title.as_deref().unwrap_or_default();
        let output_path = ws.file(&format!("{title}_{id}.{}", self.settings.codec.extension()));
        job.raw_path = Some(raw_path.clone());
        job.output_path = Some(output_path.clone());

        let raw_bytes = self.acquire(&job.url, &raw_path, cancel).await?;
        info!("✅ Download complete ({} bytes), converting...", raw_bytes);

        self.advance(job, JobState::Transcoding)?;
        let output_bytes = self.transcode(&raw_path, &output_path, cancel).await?;
        info!("🎵 Conversion complete ({} bytes)", output_bytes);

        self.advance(job, JobState::Delivering)?;
        let file = tokio::fs::File::open(&output_path)
            .await
            .map_err(|e| PipelineError::Internal(format!("failed to open artifact: {e}")))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| PipelineError::Internal(format!("failed to stat artifact: {e}")))?
            .len();
        Ok((file, len))
    }

    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<SourceMetadata, PipelineError> {
        if url.is_empty() {
            return Err(PipelineError::InvalidInput(InvalidInputReason::Missing));
        }
        let well_formed = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !well_formed || !self.provider.validate(url) {
            return Err(PipelineError::InvalidInput(InvalidInputReason::Malformed));
        }

        info!("✅ Valid YouTube URL, fetching video info...");
        let lookup = async {
            self.provider.metadata(url).await.map_err(|e| match e {
                SourceError::Unavailable(reason) => PipelineError::SourceUnavailable(reason),
                SourceError::Io(e) => PipelineError::Internal(format!("metadata lookup failed: {e}")),
            })
        };
        bounded(
            self.settings.resolve_timeout,
            cancel,
            lookup,
            PipelineError::SourceUnavailable("metadata lookup timed out".into()),
        )
        .await
    }

    /// Streams the source audio into `raw_path` one chunk at a time; the next
    /// chunk is not pulled until the previous one is on disk.
    async fn acquire(
        &self,
        url: &str,
        raw_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        let transfer = async {
            let mut stream = self
                .provider
                .open_audio_stream(url, AudioQuality::HighestAudio)
                .await
                .map_err(|e| PipelineError::Acquisition(e.to_string()))?;
            let mut file = tokio::fs::File::create(raw_path)
                .await
                .map_err(|e| PipelineError::Internal(format!("failed to create raw file: {e}")))?;

            let mut written: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| PipelineError::Acquisition(e.to_string()))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| PipelineError::Internal(format!("failed to write raw file: {e}")))?;

                let before = written;
                written += chunk.len() as u64;
                if before / PROGRESS_LOG_STEP != written / PROGRESS_LOG_STEP {
                    debug!("⬇️ Downloaded {} bytes", written);
                }
            }
            file.flush()
                .await
                .map_err(|e| PipelineError::Internal(format!("failed to flush raw file: {e}")))?;

            if written == 0 {
                return Err(PipelineError::Acquisition("source stream was empty".into()));
            }
            Ok(written)
        };

        bounded(
            self.settings.acquire_timeout,
            cancel,
            transfer,
            PipelineError::Acquisition("download timed out".into()),
        )
        .await
    }

    /// Waits for a transcoder slot, then for the transcoder's own completion
    /// signal. Process exit alone is never taken as success.
    async fn transcode(
        &self,
        raw_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        let conversion = async {
            let _slot = self
                .transcode_slots
                .acquire()
                .await
                .map_err(|_| PipelineError::Internal("transcoder pool closed".into()))?;

            let params = TranscodeParams {
                bitrate_kbps: self.settings.bitrate_kbps,
                codec: self.settings.codec,
            };
            let mut session = self
                .transcoder
                .convert(raw_path, output_path, params)
                .await
                .map_err(|e| PipelineError::Transcode(format!("failed to start transcoder: {e}")))?;

            let mut reported: u64 = 0;
            loop {
                match session.next_event().await {
                    Some(TranscodeEvent::Progress { output_bytes }) => reported = output_bytes,
                    Some(TranscodeEvent::Finished) => break,
                    Some(TranscodeEvent::Failed(reason)) => {
                        return Err(PipelineError::Transcode(reason));
                    }
                    None => {
                        return Err(PipelineError::Transcode(
                            "transcoder stopped without a completion signal".into(),
                        ));
                    }
                }
            }

            let written = tokio::fs::metadata(output_path)
                .await
                .map_err(|_| PipelineError::Transcode("transcoder produced no output".into()))?
                .len();
            debug!("Transcoder reported {} bytes, {} on disk", reported, written);
            Ok(written)
        };

        bounded(
            self.settings.transcode_timeout,
            cancel,
            conversion,
            PipelineError::Transcode("conversion timed out".into()),
        )
        .await
    }

    fn advance(&self, job: &mut Job, next: JobState) -> Result<(), PipelineError> {
        job.transition(next)?;
        info!("Job is {}", job.state());
        self.publish(job);
        Ok(())
    }

    async fn fail(&self, job: &mut Job, workspace: Option<&Workspace>, err: &PipelineError) {
        match err.kind() {
            FailureKind::InvalidInput => warn!("❌ {}: {}", err.public_message(), job.url),
            FailureKind::Cancelled => warn!("Job cancelled while {}", job.state()),
            _ => error!("❌ Job failed while {}: {}", job.state(), err),
        }

        match job.transition(JobState::Failed(err.kind())) {
            Ok(()) => self.publish(job),
            Err(e) => error!("{}", e),
        }
        if let Some(workspace) = workspace {
            workspace.teardown().await;
        }
    }

    fn publish(&self, job: &Job) {
        let _ = self.events.send(job.event());
    }
}

/// Runs one stage under its time limit, abandoning it on cancellation.
async fn bounded<T, F>(
    limit: Duration,
    cancel: &CancellationToken,
    stage: F,
    on_timeout: PipelineError,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        outcome = tokio::time::timeout(limit, stage) => outcome.unwrap_or(Err(on_timeout)),
    }
}
