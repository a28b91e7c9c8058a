use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

use crate::common::response::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInputReason {
    Missing,
    Malformed,
}

/// Every way a job can fail. Stages map their low-level errors into one of
/// these before returning.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0:?}")]
    InvalidInput(InvalidInputReason),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("acquisition failed: {0}")]
    Acquisition(String),
    #[error("transcode failed: {0}")]
    Transcode(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("job cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// The classification recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    SourceUnavailable,
    Acquisition,
    Transcode,
    Delivery,
    Cancelled,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::SourceUnavailable => "source_unavailable",
            FailureKind::Acquisition => "acquisition",
            FailureKind::Transcode => "transcode",
            FailureKind::Delivery => "delivery",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::InvalidInput(_) => FailureKind::InvalidInput,
            PipelineError::SourceUnavailable(_) => FailureKind::SourceUnavailable,
            PipelineError::Acquisition(_) => FailureKind::Acquisition,
            PipelineError::Transcode(_) => FailureKind::Transcode,
            PipelineError::Delivery(_) => FailureKind::Delivery,
            PipelineError::Cancelled => FailureKind::Cancelled,
            PipelineError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Acquisition(_)
            | PipelineError::Transcode(_)
            | PipelineError::Delivery(_)
            | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the requester. Details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(InvalidInputReason::Missing) => "YouTube URL is required",
            PipelineError::InvalidInput(InvalidInputReason::Malformed) => "Invalid YouTube URL",
            PipelineError::SourceUnavailable(_) => "Video is unavailable on YouTube",
            PipelineError::Acquisition(_) => "Error downloading video from YouTube",
            PipelineError::Transcode(_) => "Error converting video to MP3",
            PipelineError::Cancelled => "Request was cancelled",
            PipelineError::Delivery(_) | PipelineError::Internal(_) => "Internal server error",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err.public_message().to_string(), err.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_stage_failures_to_the_public_table() {
        let cases = [
            (PipelineError::InvalidInput(InvalidInputReason::Missing), 400, "YouTube URL is required"),
            (PipelineError::InvalidInput(InvalidInputReason::Malformed), 400, "Invalid YouTube URL"),
            (PipelineError::Acquisition("reset".into()), 500, "Error downloading video from YouTube"),
            (PipelineError::Transcode("corrupt".into()), 500, "Error converting video to MP3"),
            (PipelineError::Internal("boom".into()), 500, "Internal server error"),
        ];

        for (err, status, text) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.1.as_u16(), status);
            assert_eq!(api.0, text);
        }
    }

    #[test]
    fn upstream_problems_are_not_client_errors() {
        let err = PipelineError::SourceUnavailable("private video".into());
        assert_eq!(err.kind(), FailureKind::SourceUnavailable);
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
