use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use uuid::Uuid;

use super::error::{FailureKind, PipelineError};

/// Longest display title kept after sanitizing.
pub const MAX_TITLE_LEN: usize = 50;

/// Used when sanitizing leaves nothing behind (e.g. an all-emoji title).
pub const FALLBACK_TITLE: &str = "audio";

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s]").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Turns an upstream title into something safe for a file name and a header.
///
/// 1. strip everything that is not an ASCII word character or whitespace
/// 2. collapse each whitespace run into a single `_`
/// 3. keep at most [`MAX_TITLE_LEN`] characters
pub fn sanitize_title(raw: &str) -> String {
    let stripped = NON_WORD.replace_all(raw, "");
    let collapsed = WHITESPACE.replace_all(&stripped, "_");
    collapsed.chars().take(MAX_TITLE_LEN).collect()
}

/// Descriptive data about a source, fetched before any media moves.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub title: String,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Resolving,
    Acquiring,
    Transcoding,
    Delivering,
    Completed,
    Failed(FailureKind),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }

    /// Forward edges of the job lifecycle. Any live state may fail.
    fn allows(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Resolving, Acquiring) => true,
            (Acquiring, Transcoding) => true,
            (Transcoding, Delivering) => true,
            (Delivering, Completed) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Resolving => f.write_str("resolving"),
            JobState::Acquiring => f.write_str("acquiring"),
            JobState::Transcoding => f.write_str("transcoding"),
            JobState::Delivering => f.write_str("delivering"),
            JobState::Completed => f.write_str("completed"),
            JobState::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Published on every job state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub state: JobState,
}

/// One end-to-end request. Owned by the pipeline invocation that created it.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub raw_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    state: JobState,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            title: None,
            raw_path: None,
            output_path: None,
            state: JobState::Resolving,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn event(&self) -> JobEvent {
        JobEvent {
            job_id: self.id,
            state: self.state.clone(),
        }
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), PipelineError> {
        if !self.state.allows(&next) {
            return Err(PipelineError::Internal(format!(
                "illegal job transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Name offered to the requester, e.g. `My_Song.mp3`.
    pub fn download_name(&self, extension: &str) -> String {
        let title = match self.title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => FALLBACK_TITLE,
        };
        format!("{title}.{extension}")
    }
}
