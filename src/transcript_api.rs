//! Structured caption retrieval straight from the platform's player API.
//!
//! The player endpoint lists the caption tracks of a video; each track's
//! `baseUrl` serves timed text as JSON (`fmt=json3`), which maps directly onto
//! [`TranscriptItem`]s without any markup parsing.

use std::io;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::model::{CaptionTrack, TranscriptItem};
use crate::select::select_track;

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";
const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "20.10.38";
const USER_AGENT: &str = "com.google.android.youtube/20.10.38 (Linux; U; Android 14)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("captions are disabled for this video")]
    Disabled,
    #[error("no caption track matches the requested languages")]
    NotFound,
    #[error("transcript request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// Narrow interface over the structured transcript service so the
/// orchestrator can be driven by fakes in tests.
pub trait TranscriptApi {
    fn list_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>, TranscriptError>;

    /// Picks the first track matching `languages`, highest priority first.
    fn find_track(
        &self,
        tracks: &[CaptionTrack],
        languages: &[&str],
    ) -> Result<CaptionTrack, TranscriptError> {
        select_track(tracks, languages)
            .cloned()
            .ok_or(TranscriptError::NotFound)
    }

    fn fetch_items(&self, track: &CaptionTrack) -> Result<Vec<TranscriptItem>, TranscriptError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrack {
    base_url: String,
    language_code: String,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    #[serde(rename = "dDurationMs", default)]
    duration_ms: u64,
    #[serde(default)]
    segs: Vec<TimedTextSegment>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

/// Blocking client for the platform's player and timed-text endpoints.
pub struct YoutubeTranscriptApi {
    agent: ureq::Agent,
}

impl YoutubeTranscriptApi {
    /// `proxy` must already carry a scheme (see
    /// [`normalize_proxy`](crate::credentials::normalize_proxy)).
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self, TranscriptError> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT);
        if let Some(proxy) = proxy {
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|err| TranscriptError::Other(format!("invalid proxy {proxy}: {err}")))?;
            builder = builder.proxy(proxy);
        }
        Ok(Self {
            agent: builder.build(),
        })
    }
}

impl TranscriptApi for YoutubeTranscriptApi {
    fn list_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>, TranscriptError> {
        debug!(video_id, "requesting player response");
        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });
        let response = self
            .agent
            .post(PLAYER_ENDPOINT)
            .send_json(body)
            .map_err(map_request_error)?;
        let player: PlayerResponse = response.into_json().map_err(map_io_error)?;
        tracks_from_player(player)
    }

    fn fetch_items(&self, track: &CaptionTrack) -> Result<Vec<TranscriptItem>, TranscriptError> {
        if track.url.is_empty() {
            return Err(TranscriptError::Other(format!(
                "caption track {} has no download address",
                track.language_code
            )));
        }
        let url = format!("{}&fmt=json3", track.url.replace("&fmt=srv3", ""));
        let response = self.agent.get(&url).call().map_err(map_request_error)?;
        let raw = response.into_string().map_err(map_io_error)?;
        if raw.trim().is_empty() {
            return Err(TranscriptError::Other(
                "transcript service returned an empty body".into(),
            ));
        }
        let timed: TimedText = serde_json::from_str(&raw)
            .map_err(|err| TranscriptError::Other(format!("decoding timed text: {err}")))?;
        Ok(items_from_timed_text(timed))
    }
}

fn tracks_from_player(player: PlayerResponse) -> Result<Vec<CaptionTrack>, TranscriptError> {
    if let Some(status) = &player.playability_status {
        let state = status.status.as_deref().unwrap_or("OK");
        if state != "OK" {
            let reason = status.reason.as_deref().unwrap_or("no reason given");
            return Err(TranscriptError::Other(format!(
                "video is not playable ({state}): {reason}"
            )));
        }
    }

    let tracks: Vec<CaptionTrack> = player
        .captions
        .and_then(|captions| captions.player_captions_tracklist_renderer)
        .map(|renderer| renderer.caption_tracks)
        .unwrap_or_default()
        .into_iter()
        .map(|raw| {
            CaptionTrack::new(raw.language_code, raw.kind.as_deref() == Some("asr"))
                .with_url(raw.base_url)
        })
        .collect();

    if tracks.is_empty() {
        return Err(TranscriptError::Disabled);
    }
    Ok(tracks)
}

fn items_from_timed_text(timed: TimedText) -> Vec<TranscriptItem> {
    timed
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|seg| seg.utf8.as_str()).collect();
            if text.trim().is_empty() {
                return None;
            }
            Some(TranscriptItem {
                text,
                start: event.start_ms as f64 / 1000.0,
                duration: event.duration_ms as f64 / 1000.0,
            })
        })
        .collect()
}

fn map_request_error(err: ureq::Error) -> TranscriptError {
    match err {
        ureq::Error::Status(404, _) => TranscriptError::NotFound,
        ureq::Error::Status(code, _) => {
            TranscriptError::Other(format!("transcript service returned HTTP {code}"))
        }
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                TranscriptError::Timeout
            } else {
                TranscriptError::Other(transport.to_string())
            }
        }
    }
}

fn map_io_error(err: io::Error) -> TranscriptError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TranscriptError::Timeout,
        _ => TranscriptError::Other(format!("reading transcript response: {err}")),
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        {
            return true;
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_are_read_from_player_response() {
        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": { "status": "OK" },
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        { "baseUrl": "https://t/en", "languageCode": "en" },
                        { "baseUrl": "https://t/asr", "languageCode": "en-GB", "kind": "asr" }
                    ]
                }
            }
        }))
        .unwrap();
        let tracks = tracks_from_player(player).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0], CaptionTrack::new("en", false).with_url("https://t/en"));
        assert!(tracks[1].is_auto_generated);
    }

    #[test]
    fn missing_caption_block_means_disabled() {
        let player: PlayerResponse =
            serde_json::from_value(json!({ "playabilityStatus": { "status": "OK" } })).unwrap();
        assert_eq!(tracks_from_player(player), Err(TranscriptError::Disabled));
    }

    #[test]
    fn unplayable_video_keeps_reason() {
        let player: PlayerResponse = serde_json::from_value(json!({
            "playabilityStatus": { "status": "ERROR", "reason": "Video unavailable" }
        }))
        .unwrap();
        let err = tracks_from_player(player).unwrap_err();
        assert_eq!(
            err.to_string(),
            "video is not playable (ERROR): Video unavailable"
        );
    }

    #[test]
    fn timed_text_events_become_items() {
        let timed: TimedText = serde_json::from_value(json!({
            "events": [
                { "tStartMs": 0, "dDurationMs": 1200, "segs": [{ "utf8": "Hi" }, { "utf8": " there" }] },
                { "tStartMs": 1200, "dDurationMs": 10, "segs": [{ "utf8": "\n" }] },
                { "tStartMs": 1300 },
                { "tStartMs": 2500, "dDurationMs": 800, "segs": [{ "utf8": "bye" }] }
            ]
        }))
        .unwrap();
        let items = items_from_timed_text(timed);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "Hi there");
        assert_eq!(items[0].duration, 1.2);
        assert_eq!(items[1].start, 2.5);
    }

    #[test]
    fn read_timeouts_map_to_timeout() {
        assert_eq!(
            map_io_error(io::Error::from(io::ErrorKind::TimedOut)),
            TranscriptError::Timeout
        );
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::UnexpectedEof)),
            TranscriptError::Other(_)
        ));
    }

    #[test]
    fn http_statuses_are_classified() -> anyhow::Result<()> {
        let not_found = ureq::Error::Status(404, ureq::Response::new(404, "Not Found", "")?);
        assert_eq!(map_request_error(not_found), TranscriptError::NotFound);
        let throttled = ureq::Error::Status(429, ureq::Response::new(429, "Too Many Requests", "")?);
        assert_eq!(
            map_request_error(throttled),
            TranscriptError::Other("transcript service returned HTTP 429".into())
        );
        Ok(())
    }

    #[test]
    fn silent_server_times_out() -> anyhow::Result<()> {
        // Accepted by the kernel backlog, never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let api = YoutubeTranscriptApi::new(None, Duration::from_millis(200))?;
        let track = CaptionTrack::new("en", false)
            .with_url(format!("http://{addr}/api/timedtext?v=abc&lang=en"));
        assert_eq!(api.fetch_items(&track), Err(TranscriptError::Timeout));
        drop(listener);
        Ok(())
    }

    #[test]
    fn default_find_track_reports_not_found() {
        struct Empty;
        impl TranscriptApi for Empty {
            fn list_tracks(&self, _: &str) -> Result<Vec<CaptionTrack>, TranscriptError> {
                Ok(Vec::new())
            }
            fn fetch_items(&self, _: &CaptionTrack) -> Result<Vec<TranscriptItem>, TranscriptError> {
                Ok(Vec::new())
            }
        }
        let tracks = vec![CaptionTrack::new("de", false)];
        assert_eq!(
            Empty.find_track(&tracks, &["en"]),
            Err(TranscriptError::NotFound)
        );
    }
}
