//! Seams between the pipeline and the tools that do the heavy lifting.
//!
//! The pipeline only knows these traits; `infrastructure::source` and
//! `workers::transcoder` hold the yt-dlp and ffmpeg backed implementations.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::model::SourceMetadata;

/// Raw audio as it arrives from the source. Dropping it closes the transfer.
pub type AudioStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQuality {
    HighestAudio,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream host refused or does not have the content.
    #[error("{0}")]
    Unavailable(String),
    /// The provider itself could not be run or talked to.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait SourceStreamProvider: Send + Sync {
    /// Whether `url` is in the grammar this provider accepts. Pure; no I/O.
    fn validate(&self, url: &str) -> bool;

    async fn metadata(&self, url: &str) -> Result<SourceMetadata, SourceError>;

    async fn open_audio_stream(
        &self,
        url: &str,
        quality: AudioQuality,
    ) -> Result<AudioStream, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Mp3,
}

impl AudioCodec {
    pub fn encoder(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "libmp3lame",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeParams {
    pub bitrate_kbps: u32,
    pub codec: AudioCodec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeEvent {
    /// Output bytes written so far, as reported by the transcoder.
    Progress { output_bytes: u64 },
    Finished,
    Failed(String),
}

/// A running conversion. The pipeline reads events until it sees a terminal
/// one; dropping the session stops the work behind it.
pub struct TranscodeSession {
    events: mpsc::Receiver<TranscodeEvent>,
    driver: Option<JoinHandle<()>>,
}

impl TranscodeSession {
    pub fn new(events: mpsc::Receiver<TranscodeEvent>, driver: Option<JoinHandle<()>>) -> Self {
        Self { events, driver }
    }

    pub async fn next_event(&mut self) -> Option<TranscodeEvent> {
        self.events.recv().await
    }
}

impl Drop for TranscodeSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Starts converting `input` into `output`. Spawn failures are returned
    /// directly; everything after that arrives as events on the session.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        params: TranscodeParams,
    ) -> io::Result<TranscodeSession>;
}
