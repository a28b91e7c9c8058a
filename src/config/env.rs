use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    LegacyPort,
    WorkspaceDir,
    YtDlpPath,
    FfmpegPath,
    AudioBitrateKbps,
    MaxConcurrentTranscodes,
    ResolveTimeoutSecs,
    AcquireTimeoutSecs,
    TranscodeTimeoutSecs,
    CorsOrigin,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::LegacyPort => "PORT",
            EnvKey::WorkspaceDir => "WORKSPACE_DIR",
            EnvKey::YtDlpPath => "YTDLP_PATH",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::AudioBitrateKbps => "AUDIO_BITRATE_KBPS",
            EnvKey::MaxConcurrentTranscodes => "MAX_CONCURRENT_TRANSCODES",
            EnvKey::ResolveTimeoutSecs => "RESOLVE_TIMEOUT_SECS",
            EnvKey::AcquireTimeoutSecs => "ACQUIRE_TIMEOUT_SECS",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::CorsOrigin => "CORS_ORIGIN",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Parses `key` when it is set. Unset yields `Ok(None)`; a value that does not
/// parse is reported back with the raw text so the caller can refuse to start.
pub fn get_parsed<T: FromStr>(key: EnvKey) -> Result<Option<T>, (&'static str, String)> {
    let name = key.as_str();
    match get(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| (name, val)),
        Err(_) => Ok(None),
    }
}
