//! In-process stand-ins for yt-dlp and ffmpeg.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use super::model::SourceMetadata;
use super::provider::{
    AudioQuality, AudioStream, SourceError, SourceStreamProvider, TranscodeEvent, TranscodeParams,
    TranscodeSession, Transcoder,
};

/// Shared, ordered record of what the doubles were asked to do.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

#[derive(Clone)]
pub enum StreamBehavior {
    /// Yields the URL followed by `chunks` chunks of `chunk_len` bytes.
    Complete { chunks: usize, chunk_len: usize },
    /// Yields `chunks` chunks and then a transport error.
    BreakAfter { chunks: usize },
    /// Never yields anything.
    Stall,
}

pub struct FakeProvider {
    pub title: String,
    pub unavailable: Option<String>,
    pub stream: StreamBehavior,
    pub log: CallLog,
}

impl FakeProvider {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            unavailable: None,
            // ~10 seconds of 128 kbps audio
            stream: StreamBehavior::Complete {
                chunks: 10,
                chunk_len: 16 * 1024,
            },
            log: CallLog::default(),
        }
    }

    pub fn with_stream(mut self, stream: StreamBehavior) -> Self {
        self.stream = stream;
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    /// Bytes a `Complete` stream produces for `url`.
    pub fn expected_raw(url: &str, chunks: usize, chunk_len: usize) -> Vec<u8> {
        let mut raw = url.as_bytes().to_vec();
        for i in 0..chunks {
            raw.extend(std::iter::repeat_n(i as u8, chunk_len));
        }
        raw
    }
}

#[async_trait]
impl SourceStreamProvider for FakeProvider {
    fn validate(&self, url: &str) -> bool {
        Url::parse(url).is_ok()
    }

    async fn metadata(&self, url: &str) -> Result<SourceMetadata, SourceError> {
        self.log.push(format!("metadata {url}"));
        if let Some(reason) = &self.unavailable {
            return Err(SourceError::Unavailable(reason.clone()));
        }
        Ok(SourceMetadata {
            title: self.title.clone(),
            duration_seconds: 10,
        })
    }

    async fn open_audio_stream(
        &self,
        url: &str,
        quality: AudioQuality,
    ) -> Result<AudioStream, SourceError> {
        assert_eq!(quality, AudioQuality::HighestAudio);
        self.log.push(format!("open {url}"));

        let log = self.log.clone();
        let url_owned = url.to_string();
        let eof = stream::once(async move {
            log.push(format!("eof {url_owned}"));
            None::<io::Result<Bytes>>
        })
        .filter_map(future::ready);

        let stream = match self.stream {
            StreamBehavior::Complete { chunks, chunk_len } => {
                let mut items = vec![Ok(Bytes::copy_from_slice(url.as_bytes()))];
                items.extend((0..chunks).map(|i| Ok(Bytes::from(vec![i as u8; chunk_len]))));
                stream::iter(items).chain(eof).boxed()
            }
            StreamBehavior::BreakAfter { chunks } => {
                let mut items: Vec<io::Result<Bytes>> =
                    (0..chunks).map(|_| Ok(Bytes::from_static(b"chunk"))).collect();
                items.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer")));
                stream::iter(items).boxed()
            }
            StreamBehavior::Stall => stream::pending().boxed(),
        };
        Ok(stream)
    }
}

#[derive(Clone)]
pub enum TranscodeBehavior {
    /// Writes `MP3:` + the input after `delay`, then reports completion.
    Succeed { delay: Duration },
    /// Writes part of the output, then reports an error.
    FailAfterPartialWrite { reason: String },
    /// Goes away without ever sending a terminal event.
    VanishSilently,
    /// Never finishes.
    Stall,
}

pub struct FakeTranscoder {
    pub behavior: TranscodeBehavior,
    pub log: CallLog,
    /// Size of the input file at the moment `convert` was called.
    pub input_sizes: Arc<Mutex<Vec<u64>>>,
    active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl FakeTranscoder {
    pub fn new(behavior: TranscodeBehavior, log: CallLog) -> Self {
        Self {
            behavior,
            log,
            input_sizes: Arc::default(),
            active: Arc::default(),
            peak: Arc::default(),
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        params: TranscodeParams,
    ) -> io::Result<TranscodeSession> {
        assert_eq!(params.bitrate_kbps, 320);
        let raw = tokio::fs::read(input).await?;
        self.input_sizes.lock().unwrap().push(raw.len() as u64);
        self.log.push(format!("transcode {}", input.display()));

        let (tx, rx) = mpsc::channel(4);
        let behavior = self.behavior.clone();
        let output = output.to_path_buf();
        let active = self.active.clone();
        let peak = self.peak.clone();

        let driver = tokio::spawn(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);

            // Leave the gauge before the terminal event so the next queued
            // job can never overlap with this one.
            match behavior {
                TranscodeBehavior::Succeed { delay } => {
                    tokio::time::sleep(delay).await;
                    let mut encoded = b"MP3:".to_vec();
                    encoded.extend_from_slice(&raw);
                    tokio::fs::write(&output, &encoded).await.unwrap();
                    active.fetch_sub(1, Ordering::SeqCst);
                    let _ = tx
                        .send(TranscodeEvent::Progress {
                            output_bytes: encoded.len() as u64,
                        })
                        .await;
                    let _ = tx.send(TranscodeEvent::Finished).await;
                }
                TranscodeBehavior::FailAfterPartialWrite { reason } => {
                    tokio::fs::write(&output, b"MP3:partial").await.unwrap();
                    active.fetch_sub(1, Ordering::SeqCst);
                    let _ = tx.send(TranscodeEvent::Progress { output_bytes: 11 }).await;
                    let _ = tx.send(TranscodeEvent::Failed(reason)).await;
                }
                TranscodeBehavior::VanishSilently => {
                    active.fetch_sub(1, Ordering::SeqCst);
                    drop(tx);
                }
                TranscodeBehavior::Stall => future::pending::<()>().await,
            }
        });

        Ok(TranscodeSession::new(rx, Some(driver)))
    }
}
