use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, future, stream};
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::common::process::{self, StderrTail};
use crate::modules::download::model::SourceMetadata;
use crate::modules::download::provider::{
    AudioQuality, AudioStream, SourceError, SourceStreamProvider,
};

/// Hosts that carry the video id in a `v` query parameter.
const QUERY_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
];

/// `youtube.com` path prefixes whose next segment is the video id.
const ID_PATH_PREFIXES: &[&str] = &["embed", "v", "shorts", "live"];

const VIDEO_ID_LEN: usize = 11;

/// Extracts the 11 character video id from any URL shape YouTube hands out.
pub fn video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();

    let from_query = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());

    let id = match from_query {
        Some(id) => {
            if !QUERY_HOSTS.contains(&host.as_str()) {
                return None;
            }
            id
        }
        None => {
            let mut segments = url.path_segments()?;
            match host.as_str() {
                "youtu.be" => segments.next()?.to_string(),
                "youtube.com" | "www.youtube.com" => {
                    let prefix = segments.next()?;
                    if !ID_PATH_PREFIXES.contains(&prefix) {
                        return None;
                    }
                    segments.next()?.to_string()
                }
                _ => return None,
            }
        }
    };

    let id: String = id.chars().take(VIDEO_ID_LEN).collect();
    let valid = id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: String,
    #[serde(default)]
    duration: Option<f64>,
}

fn parse_metadata(json: &[u8]) -> Result<SourceMetadata, serde_json::Error> {
    let info: VideoInfo = serde_json::from_slice(json)?;
    Ok(SourceMetadata {
        title: info.title,
        duration_seconds: info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
    })
}

/// Source Stream Provider backed by the `yt-dlp` executable.
#[derive(Clone, Debug)]
pub struct YtDlpProvider {
    binary: String,
}

impl YtDlpProvider {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn format_selector(quality: AudioQuality) -> &'static str {
        match quality {
            AudioQuality::HighestAudio => "bestaudio/best",
        }
    }
}

#[async_trait]
impl SourceStreamProvider for YtDlpProvider {
    fn validate(&self, url: &str) -> bool {
        video_id(url).is_some()
    }

    async fn metadata(&self, url: &str) -> Result<SourceMetadata, SourceError> {
        let output = process::command(&self.binary)
            .args([
                "--dump-single-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                url,
            ])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("yt-dlp rejected the video")
                .trim()
                .to_string();
            return Err(SourceError::Unavailable(reason));
        }

        let metadata = parse_metadata(&output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        debug!(
            "Resolved {:?} ({}s) via yt-dlp",
            metadata.title, metadata.duration_seconds
        );
        Ok(metadata)
    }

    async fn open_audio_stream(
        &self,
        url: &str,
        quality: AudioQuality,
    ) -> Result<AudioStream, SourceError> {
        let mut child = process::command(&self.binary)
            .args([
                "--format",
                Self::format_selector(quality),
                "--no-playlist",
                "--no-part",
                "--quiet",
                "--no-warnings",
                "--output",
                "-",
                url,
            ])
            .spawn()?;
        info!("📺 yt-dlp started for {}", url);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("yt-dlp stdout was not captured"))?;
        let tail = StderrTail::default();
        let stderr_reader = child.stderr.take().map(|stderr| tail.collect("yt-dlp", stderr));

        // The stream owns the child: dropping it early kills yt-dlp, and a
        // non-zero exit after the last byte surfaces as a stream error.
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None::<io::Result<Bytes>>,
                Ok(status) => {
                    if let Some(reader) = stderr_reader {
                        let _ = reader.await;
                    }
                    let reason = tail
                        .last_line()
                        .await
                        .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
                    Some(Err(io::Error::other(reason)))
                }
                Err(e) => Some(Err(e)),
            }
        })
        .filter_map(future::ready);

        Ok(ReaderStream::new(stdout).chain(exit).boxed())
    }
}
