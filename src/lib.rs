#![forbid(unsafe_code)]

//! Caption retrieval for YouTube videos.
//!
//! The pipeline asks the platform's transcript API for a caption track and,
//! when that fails, falls back to caption files downloaded with yt-dlp. Either
//! way the result is a list of timed [`model::CaptionRecord`]s, serialized as
//! a single JSON object by the binaries.

pub mod config;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod model;
pub mod proxy_check;
pub mod sanitize;
pub mod select;
pub mod timestamp;
pub mod transcript_api;
pub mod video_id;
pub mod vtt;
pub mod ytdlp;
