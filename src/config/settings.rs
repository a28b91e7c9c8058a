use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an unparseable value: {value:?}")]
    Unparseable { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

impl From<(&'static str, String)> for ConfigError {
    fn from((key, value): (&'static str, String)) -> Self {
        ConfigError::Unparseable { key, value }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub workspace_root: PathBuf,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub audio_bitrate_kbps: u32,
    pub max_concurrent_transcodes: usize,
    pub resolve_timeout: Duration,
    pub acquire_timeout: Duration,
    pub transcode_timeout: Duration,
    pub cors_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            workspace_root: std::env::temp_dir().join("song-downloader"),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            audio_bitrate_kbps: 320,
            max_concurrent_transcodes: 2,
            resolve_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(900),
            transcode_timeout: Duration::from_secs(900),
            cors_origin: "http://localhost:4200".to_string(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_port = match env::get_parsed::<u16>(EnvKey::ServerPort)? {
            Some(port) => port,
            None => env::get_parsed::<u16>(EnvKey::LegacyPort)?.unwrap_or(defaults.server_port),
        };

        let workspace_root = env::get(EnvKey::WorkspaceDir)
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);

        let audio_bitrate_kbps = env::get_parsed::<u32>(EnvKey::AudioBitrateKbps)?
            .unwrap_or(defaults.audio_bitrate_kbps);
        if audio_bitrate_kbps == 0 {
            return Err(ConfigError::Zero { key: EnvKey::AudioBitrateKbps.as_str() });
        }

        let max_concurrent_transcodes = env::get_parsed::<usize>(EnvKey::MaxConcurrentTranscodes)?
            .unwrap_or(defaults.max_concurrent_transcodes);
        if max_concurrent_transcodes == 0 {
            return Err(ConfigError::Zero { key: EnvKey::MaxConcurrentTranscodes.as_str() });
        }

        Ok(Self {
            server_port,
            workspace_root,
            ytdlp_path: env::get_or(EnvKey::YtDlpPath, &defaults.ytdlp_path),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, &defaults.ffmpeg_path),
            audio_bitrate_kbps,
            max_concurrent_transcodes,
            resolve_timeout: seconds(EnvKey::ResolveTimeoutSecs, defaults.resolve_timeout)?,
            acquire_timeout: seconds(EnvKey::AcquireTimeoutSecs, defaults.acquire_timeout)?,
            transcode_timeout: seconds(EnvKey::TranscodeTimeoutSecs, defaults.transcode_timeout)?,
            cors_origin: env::get_or(EnvKey::CorsOrigin, &defaults.cors_origin),
        })
    }
}

fn seconds(key: EnvKey, default: Duration) -> Result<Duration, ConfigError> {
    let name = key.as_str();
    match env::get_parsed::<u64>(key)? {
        Some(0) => Err(ConfigError::Zero { key: name }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
