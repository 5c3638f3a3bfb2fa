#![forbid(unsafe_code)]

//! Prints the English captions of one YouTube video as a single JSON line.
//!
//! Usage: `get_subtitles <video id | watch url>`
//!
//! Standard output carries exactly one object, either
//! `{"videoId", "subtitles", "title"?}` or `{"error"}`. Progress goes to
//! standard error. Only invalid input exits non-zero; retrieval failures are
//! reported in the JSON and exit successfully.

use std::env;
use std::process::ExitCode;

use tracing::warn;
use yt_captions::config::Settings;
use yt_captions::error::FetchError;
use yt_captions::fetcher::CaptionFetcher;
use yt_captions::logging::{DEFAULT_FILTER, init_logging};
use yt_captions::model::RetrievalResult;
use yt_captions::video_id::extract_video_id;

fn main() -> ExitCode {
    init_logging(DEFAULT_FILTER);

    let args: Vec<String> = env::args().skip(1).collect();
    let (line, code) = run(&args, retrieve);
    println!("{line}");
    ExitCode::from(code)
}

/// Produces the output line and the exit status. Only rejected input exits
/// non-zero; `retrieve` is not called in that case.
fn run(args: &[String], retrieve: impl FnOnce(&str) -> RetrievalResult) -> (String, u8) {
    match video_id_from_args(args) {
        Ok(video_id) => (retrieve(&video_id).to_json_line(), 0),
        Err(err) => (RetrievalResult::failure(&err).to_json_line(), 1),
    }
}

/// Exactly one argument, either a video id or a URL pointing at one.
fn video_id_from_args(args: &[String]) -> Result<String, FetchError> {
    match args {
        [single] => extract_video_id(single).ok_or_else(FetchError::invalid_video_id),
        _ => Err(FetchError::missing_video_id()),
    }
}

fn retrieve(video_id: &str) -> RetrievalResult {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "invalid configuration");
            return RetrievalResult::failure(&FetchError::RetrievalFailure(format!("{err:#}")));
        }
    };
    match CaptionFetcher::from_settings(&settings) {
        Ok(fetcher) => fetcher.fetch(video_id),
        Err(err) => RetrievalResult::failure(&err),
    }
}
