//! Helpers shared by the child processes the pipeline drives (yt-dlp, ffmpeg).

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Lines kept from a child's stderr for error reporting.
const STDERR_TAIL: usize = 20;

/// Build a command that never inherits stdin and is killed if its handle is dropped.
pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Drains a child's stderr into tracing, keeping the last few lines around.
#[derive(Clone, Default)]
pub struct StderrTail {
    lines: Arc<Mutex<Vec<String>>>,
}

impl StderrTail {
    pub fn collect<R>(&self, tool: &'static str, stderr: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let lines = self.lines.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(tool, "stderr: {}", line);
                let mut tail = lines.lock().await;
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
        })
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    /// Last non-empty line, which is where both tools put their actual complaint.
    pub async fn last_line(&self) -> Option<String> {
        self.lines
            .lock()
            .await
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .cloned()
    }
}
