//! Request-scoped data exchanged between the retrieval pipeline and its
//! callers. The structs mirror the JSON written to standard output.

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::timestamp::round_millis;

/// One normalized caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl CaptionRecord {
    /// Builds a record with newlines folded into spaces, surrounding
    /// whitespace trimmed and both times clamped to zero and rounded to
    /// milliseconds.
    pub fn new(text: impl AsRef<str>, start: f64, duration: f64) -> Self {
        let text = text.as_ref().replace(['\r', '\n'], " ").trim().to_owned();
        Self {
            text,
            start: round_millis(start.max(0.0)),
            duration: round_millis(duration.max(0.0)),
        }
    }
}

/// One selectable caption variant offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    pub is_auto_generated: bool,
    /// Where the track's content can be fetched from. Empty for tracks that
    /// only exist as descriptors (tests, file-based listings).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl CaptionTrack {
    pub fn new(language_code: impl Into<String>, is_auto_generated: bool) -> Self {
        Self {
            language_code: language_code.into(),
            is_auto_generated,
            url: String::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// A timed text item as delivered by the structured transcript API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl From<TranscriptItem> for CaptionRecord {
    fn from(item: TranscriptItem) -> Self {
        CaptionRecord::new(item.text, item.start, item.duration)
    }
}

/// The single observable outcome of a retrieval request.
///
/// Serialized untagged so a success prints as
/// `{"videoId": .., "subtitles": [..], "title": ..}` and a failure as
/// `{"error": ..}`; the two shapes never mix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RetrievalResult {
    Success(CaptionSet),
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSet {
    pub video_id: String,
    pub subtitles: Vec<CaptionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl RetrievalResult {
    pub fn failure(error: &FetchError) -> Self {
        RetrievalResult::Failure {
            error: error.to_string(),
        }
    }

    /// Renders the result as one line of JSON.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            serde_json::json!({ "error": format!("failed to encode result: {err}") }).to_string()
        })
    }
}
