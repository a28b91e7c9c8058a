use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::process::{self, StderrTail};
use crate::modules::download::provider::{
    TranscodeEvent, TranscodeParams, TranscodeSession, Transcoder,
};

/// One `key=value` line of `ffmpeg -progress` output that we care about.
#[derive(Debug, PartialEq, Eq)]
enum ProgressLine {
    TotalSize(u64),
    Continue,
    End,
}

fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "total_size" => value.parse().ok().map(ProgressLine::TotalSize),
        "progress" if value == "end" => Some(ProgressLine::End),
        "progress" => Some(ProgressLine::Continue),
        _ => None,
    }
}

/// ffmpeg can exit 0 after logging a stream error, so success needs all three:
/// a clean exit, the final `progress=end` marker and a silent stderr.
fn verdict(exit: Result<(), String>, saw_end: bool, stderr: &[String]) -> TranscodeEvent {
    if let Err(reason) = exit {
        let detail = stderr.last().cloned().unwrap_or(reason);
        return TranscodeEvent::Failed(detail);
    }
    if let Some(line) = stderr.iter().rev().find(|l| !l.trim().is_empty()) {
        return TranscodeEvent::Failed(line.clone());
    }
    if !saw_end {
        return TranscodeEvent::Failed("ffmpeg stopped before reporting completion".to_string());
    }
    TranscodeEvent::Finished
}

/// Transcoder backed by the `ffmpeg` executable.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn build_args(input: &Path, output: &Path, params: TranscodeParams) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-nostats",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend(["-i".to_string(), input.to_string_lossy().into_owned()]);
        args.push("-vn".to_string());
        args.extend(["-c:a".to_string(), params.codec.encoder().to_string()]);
        args.extend(["-b:a".to_string(), format!("{}k", params.bitrate_kbps)]);
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        params: TranscodeParams,
    ) -> io::Result<TranscodeSession> {
        let mut child = process::command(&self.binary)
            .args(Self::build_args(input, output, params))
            .spawn()?;
        info!(
            "🎵 ffmpeg started ({} @ {}k)",
            params.codec.encoder(),
            params.bitrate_kbps
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stdout was not captured"))?;
        let tail = StderrTail::default();
        let stderr_reader = child.stderr.take().map(|stderr| tail.collect("ffmpeg", stderr));

        let (tx, rx) = mpsc::channel(16);
        let driver = tokio::spawn(drive(child, stdout, tail, stderr_reader, tx));
        Ok(TranscodeSession::new(rx, Some(driver)))
    }
}

async fn drive<R>(
    mut child: Child,
    progress: R,
    tail: StderrTail,
    stderr_reader: Option<JoinHandle<()>>,
    tx: mpsc::Sender<TranscodeEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(progress).lines();
    let mut saw_end = false;

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_progress_line(&line) {
            Some(ProgressLine::TotalSize(bytes)) => {
                let _ = tx.send(TranscodeEvent::Progress { output_bytes: bytes }).await;
            }
            Some(ProgressLine::End) => saw_end = true,
            Some(ProgressLine::Continue) | None => {}
        }
    }

    let exit = match child.wait().await {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("ffmpeg exited with {status}")),
        Err(e) => Err(format!("failed to wait for ffmpeg: {e}")),
    };
    if let Some(reader) = stderr_reader {
        let _ = reader.await;
    }

    let event = verdict(exit, saw_end, &tail.lines().await);
    match &event {
        TranscodeEvent::Finished => debug!("ffmpeg reported completion"),
        TranscodeEvent::Failed(reason) => warn!("ffmpeg failed: {}", reason),
        TranscodeEvent::Progress { .. } => {}
    }
    let _ = tx.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::download::provider::AudioCodec;
    use std::path::PathBuf;

    #[test]
    fn builds_fixed_mp3_arguments() {
        let args = FfmpegTranscoder::build_args(
            &PathBuf::from("/tmp/ws/abc.raw"),
            &PathBuf::from("/tmp/ws/My_Song_abc.mp3"),
            TranscodeParams {
                bitrate_kbps: 320,
                codec: AudioCodec::Mp3,
            },
        );

        let joined = args.join(" ");
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.contains("-i /tmp/ws/abc.raw -vn -c:a libmp3lame -b:a 320k"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/ws/My_Song_abc.mp3"));
    }

    #[test]
    fn parses_progress_lines() {
        assert_eq!(parse_progress_line("total_size=4096"), Some(ProgressLine::TotalSize(4096)));
        assert_eq!(parse_progress_line("progress=continue"), Some(ProgressLine::Continue));
        assert_eq!(parse_progress_line("progress=end\n"), Some(ProgressLine::End));
        assert_eq!(parse_progress_line("out_time_us=1000000"), None);
        assert_eq!(parse_progress_line("total_size=N/A"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }

    #[test]
    fn clean_exit_with_end_marker_finishes() {
        assert_eq!(verdict(Ok(()), true, &[]), TranscodeEvent::Finished);
    }

    #[test]
    fn zero_exit_with_stderr_error_still_fails() {
        let stderr = vec!["Error while decoding stream #0:0: Invalid data found".to_string()];
        assert_eq!(
            verdict(Ok(()), true, &stderr),
            TranscodeEvent::Failed(stderr[0].clone())
        );
    }

    #[test]
    fn missing_end_marker_fails() {
        assert!(matches!(verdict(Ok(()), false, &[]), TranscodeEvent::Failed(_)));
    }

    #[test]
    fn non_zero_exit_prefers_stderr_detail() {
        let stderr = vec!["abc.raw: Invalid data found when processing input".to_string()];
        assert_eq!(
            verdict(Err("ffmpeg exited with exit status: 1".into()), false, &stderr),
            TranscodeEvent::Failed(stderr[0].clone())
        );
        assert_eq!(
            verdict(Err("ffmpeg exited with exit status: 1".into()), false, &[]),
            TranscodeEvent::Failed("ffmpeg exited with exit status: 1".into())
        );
    }

    #[tokio::test]
    async fn convert_fails_when_binary_is_missing() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-binary");
        let result = transcoder
            .convert(
                Path::new("in"),
                Path::new("out.mp3"),
                TranscodeParams {
                    bitrate_kbps: 320,
                    codec: AudioCodec::Mp3,
                },
            )
            .await;
        assert!(result.is_err());
    }
}
