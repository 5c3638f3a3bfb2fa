//! Error taxonomy shared by the retrieval pipeline and its binaries.

use thiserror::Error;

use crate::transcript_api::TranscriptError;
use crate::ytdlp::ToolError;

/// User-facing failure categories. The `Display` output is exactly the
/// `error` string written to standard output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no captions found")]
    NoCaptionsFound,
    #[error("captions are disabled for this video")]
    CaptionsDisabled,
    #[error("timed out while retrieving captions")]
    Timeout,
    #[error("{0}")]
    RetrievalFailure(String),
    #[error("{0}")]
    InvalidInput(String),
}

impl FetchError {
    pub fn missing_video_id() -> Self {
        FetchError::InvalidInput("missing video id".into())
    }

    pub fn invalid_video_id() -> Self {
        FetchError::InvalidInput("invalid video id".into())
    }

    /// Short machine-friendly label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::NoCaptionsFound => "no_captions_found",
            FetchError::CaptionsDisabled => "captions_disabled",
            FetchError::Timeout => "timeout",
            FetchError::RetrievalFailure(_) => "retrieval_failure",
            FetchError::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<TranscriptError> for FetchError {
    fn from(err: TranscriptError) -> Self {
        match err {
            TranscriptError::NotFound => FetchError::NoCaptionsFound,
            TranscriptError::Disabled => FetchError::CaptionsDisabled,
            TranscriptError::Timeout => FetchError::Timeout,
            TranscriptError::Other(message) => FetchError::RetrievalFailure(message),
        }
    }
}

impl From<ToolError> for FetchError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Timeout { .. } => FetchError::Timeout,
            other => FetchError::RetrievalFailure(other.to_string()),
        }
    }
}
