use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::Stream;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::fs::File;
use tokio::sync::broadcast;
use tokio_util::io::ReaderStream;
use tracing::{error, info};
use uuid::Uuid;

use super::error::PipelineError;
use super::model::{Job, JobEvent, JobState};
use crate::infrastructure::storage::workspace::Workspace;

/// A finished conversion waiting to be sent. Owns the job and its workspace
/// until the transfer ends one way or another.
#[derive(Debug)]
pub struct Artifact {
    job: Job,
    workspace: Workspace,
    file: File,
    len: u64,
    filename: String,
    content_type: String,
    events: broadcast::Sender<JobEvent>,
}

impl Artifact {
    pub(super) fn new(
        job: Job,
        workspace: Workspace,
        file: File,
        len: u64,
        filename: String,
        output_path: &Path,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        let content_type = mime_guess::from_path(output_path)
            .first_or_octet_stream()
            .to_string();
        Self {
            job,
            workspace,
            file,
            len,
            filename,
            content_type,
            events,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Name offered to the requester, e.g. `My_Song.mp3`.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_length(&self) -> u64 {
        self.len
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.job.output_path.as_deref()
    }

    pub fn into_stream(self) -> DeliveryStream {
        DeliveryStream {
            inner: ReaderStream::new(self.file),
            job: self.job,
            workspace: Some(self.workspace),
            events: self.events,
            len: self.len,
            sent: 0,
            cleanup: None,
            done: false,
        }
    }
}

impl IntoResponse for Artifact {
    fn into_response(self) -> Response {
        let headers = [
            (header::CONTENT_TYPE, self.content_type.clone()),
            (header::CONTENT_LENGTH, self.len.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", self.filename),
            ),
        ];
        (StatusCode::OK, headers, Body::from_stream(self.into_stream())).into_response()
    }
}

/// Streams the artifact file and concludes the job when the transfer ends.
///
/// Sending the last of the advertised `Content-Length` (or reaching end of
/// file) moves the job to `Completed`. hyper drops the body as soon as that
/// many bytes are out, so EOF alone is never observed there. A read error or
/// the body being dropped short of the length moves it to `Failed(Delivery)`.
/// Either way the workspace is torn down exactly once.
pub struct DeliveryStream {
    inner: ReaderStream<File>,
    job: Job,
    workspace: Option<Workspace>,
    events: broadcast::Sender<JobEvent>,
    len: u64,
    sent: u64,
    cleanup: Option<BoxFuture<'static, ()>>,
    done: bool,
}

impl DeliveryStream {
    fn conclude(&mut self, outcome: Result<(), PipelineError>) {
        let Some(workspace) = self.workspace.take() else {
            return;
        };

        let next = match outcome {
            Ok(()) => {
                info!("✅ File sent successfully ({} bytes)", self.sent);
                JobState::Completed
            }
            Err(err) => {
                error!("❌ Delivery failed after {} bytes: {}", self.sent, err);
                JobState::Failed(err.kind())
            }
        };

        match self.job.transition(next) {
            Ok(()) => {
                let _ = self.events.send(self.job.event());
            }
            Err(e) => error!("{}", e),
        }

        self.cleanup = Some(Box::pin(async move { workspace.teardown().await }));
    }
}

impl Stream for DeliveryStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(cleanup) = this.cleanup.as_mut() {
                ready!(cleanup.as_mut().poll(cx));
                this.cleanup = None;
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.sent += chunk.len() as u64;
                    if this.sent >= this.len {
                        this.done = true;
                        this.conclude(Ok(()));
                    }
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Some(Err(e)) => {
                    this.done = true;
                    this.conclude(Err(PipelineError::Delivery(e.to_string())));
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    this.conclude(Ok(()));
                }
            }
        }
    }
}

impl Drop for DeliveryStream {
    fn drop(&mut self) {
        if self.workspace.is_some() {
            self.conclude(Err(PipelineError::Delivery(
                "transfer interrupted before the end of the file".to_string(),
            )));
        }
        // An unpolled cleanup future still owns the workspace, whose own drop
        // removes the files.
    }
}
