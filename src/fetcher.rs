//! End-to-end caption retrieval for one video.
//!
//! Two methods are tried in order: the structured transcript API, then caption
//! files downloaded by yt-dlp. Whatever happens, [`CaptionFetcher::fetch`]
//! produces exactly one [`RetrievalResult`]; nothing propagates to the caller.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::credentials::{CredentialHandle, normalize_proxy, resolve_credentials};
use crate::error::FetchError;
use crate::model::{CaptionRecord, CaptionSet, RetrievalResult};
use crate::select::{LANGUAGE_PREFERENCE, select_caption_file};
use crate::transcript_api::{TranscriptApi, YoutubeTranscriptApi};
use crate::vtt;
use crate::ytdlp::{CaptionDownload, DownloadTool, ToolError, YtDlp};

/// Per-request inputs resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Already normalized (scheme-prefixed) proxy URL.
    pub proxy: Option<String>,
    pub cookies_file: PathBuf,
    pub cookies_base64: Option<String>,
    /// Whether caption files may be downloaded when the API fails.
    pub file_fallback: bool,
}

impl FetchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            proxy: settings.proxy_url.as_deref().and_then(normalize_proxy),
            cookies_file: settings.cookies_file.clone(),
            cookies_base64: settings.cookies_base64.clone(),
            file_fallback: settings.ytdlp_fallback,
        }
    }
}

/// Result of the file-based method.
enum Attempt {
    Found(Vec<CaptionRecord>),
    Failed(FetchError),
    /// The method could not run at all: disabled, or the tool is missing.
    Unavailable,
}

pub struct CaptionFetcher<A, T> {
    api: A,
    tool: Option<T>,
    options: FetchOptions,
}

impl CaptionFetcher<YoutubeTranscriptApi, YtDlp> {
    /// Wires the real transcript API and yt-dlp from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        let options = FetchOptions::from_settings(settings);
        if options.proxy.is_some() {
            info!("routing requests through the configured proxy");
        }
        let api = YoutubeTranscriptApi::new(options.proxy.as_deref(), settings.http_timeout)
            .map_err(FetchError::from)?;
        let tool = YtDlp::new(
            settings.ytdlp_program.clone(),
            settings.tool_timeout,
            settings.title_timeout,
        );
        debug!(program = %tool.program().display(), "caption download tool");
        Ok(Self::new(api, Some(tool), options))
    }
}

impl<A, T> CaptionFetcher<A, T>
where
    A: TranscriptApi,
    T: DownloadTool,
{
    pub fn new(api: A, tool: Option<T>, options: FetchOptions) -> Self {
        Self { api, tool, options }
    }

    /// Retrieves captions for `video_id`, folding every failure into the
    /// `{error}` shape.
    pub fn fetch(&self, video_id: &str) -> RetrievalResult {
        match self.retrieve(video_id) {
            Ok(set) => {
                info!(
                    video_id = %set.video_id,
                    lines = set.subtitles.len(),
                    "captions retrieved"
                );
                RetrievalResult::Success(set)
            }
            Err(err) => {
                warn!(video_id, category = err.category(), error = %err, "caption retrieval failed");
                RetrievalResult::failure(&err)
            }
        }
    }

    pub fn retrieve(&self, video_id: &str) -> Result<CaptionSet, FetchError> {
        let video_id = video_id.trim();
        if video_id.is_empty() {
            return Err(FetchError::missing_video_id());
        }

        let credentials = resolve_credentials(
            &self.options.cookies_file,
            self.options.cookies_base64.as_deref(),
        );
        let cookies = credentials.as_ref().map(CredentialHandle::path);

        let title = self.lookup_title(video_id, cookies);
        let subtitles = self.run_attempts(video_id, cookies)?;

        Ok(CaptionSet {
            video_id: video_id.to_owned(),
            subtitles,
            title,
        })
    }

    /// Best-effort title lookup on its own, resolving credentials the same way
    /// [`retrieve`](Self::retrieve) does.
    pub fn title(&self, video_id: &str) -> Option<String> {
        let credentials = resolve_credentials(
            &self.options.cookies_file,
            self.options.cookies_base64.as_deref(),
        );
        self.lookup_title(video_id.trim(), credentials.as_ref().map(CredentialHandle::path))
    }

    /// Looks up the title without ever failing the request.
    fn lookup_title(&self, video_id: &str, cookies: Option<&Path>) -> Option<String> {
        let tool = self.tool.as_ref()?;
        match tool.title(video_id, self.options.proxy.as_deref(), cookies) {
            Ok(title) => title,
            Err(err) => {
                debug!(error = %err, "title lookup failed");
                None
            }
        }
    }

    fn run_attempts(
        &self,
        video_id: &str,
        cookies: Option<&Path>,
    ) -> Result<Vec<CaptionRecord>, FetchError> {
        let primary = match self.structured_attempt(video_id) {
            Ok(records) => return Ok(records),
            Err(err) => err,
        };
        info!(
            category = primary.category(),
            error = %primary,
            "transcript API failed, trying caption files"
        );

        match self.file_attempt(video_id, cookies) {
            Attempt::Found(records) => Ok(records),
            Attempt::Failed(secondary) => Err(combine(primary, secondary)),
            Attempt::Unavailable => Err(primary),
        }
    }

    fn structured_attempt(&self, video_id: &str) -> Result<Vec<CaptionRecord>, FetchError> {
        info!(video_id, "fetching captions from transcript API");
        let tracks = self.api.list_tracks(video_id)?;
        let track = self.api.find_track(&tracks, &LANGUAGE_PREFERENCE)?;
        info!(
            language = %track.language_code,
            auto_generated = track.is_auto_generated,
            "selected caption track"
        );
        let records: Vec<CaptionRecord> = self
            .api
            .fetch_items(&track)?
            .into_iter()
            .map(CaptionRecord::from)
            .collect();
        if records.is_empty() {
            return Err(FetchError::NoCaptionsFound);
        }
        Ok(records)
    }

    fn file_attempt(&self, video_id: &str, cookies: Option<&Path>) -> Attempt {
        let tool = match &self.tool {
            Some(tool) if self.options.file_fallback => tool,
            _ => return Attempt::Unavailable,
        };

        // Unique per request so concurrent runs never share files; removed
        // when it drops, whatever the outcome.
        let workdir = match tempfile::Builder::new().prefix("captions-").tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                return Attempt::Failed(FetchError::RetrievalFailure(format!(
                    "creating working directory: {err}"
                )));
            }
        };

        let request = CaptionDownload {
            video_id,
            languages: &LANGUAGE_PREFERENCE,
            manual: true,
            auto: true,
            output_dir: workdir.path(),
            proxy: self.options.proxy.as_deref(),
            cookies,
        };

        let files = match tool.download_captions(&request) {
            Ok(files) => files,
            Err(err @ ToolError::Spawn { .. }) => {
                warn!(error = %err, "caption download tool unavailable");
                return Attempt::Unavailable;
            }
            Err(err) => return Attempt::Failed(err.into()),
        };

        let Some(path) = select_caption_file(&files, video_id, &LANGUAGE_PREFERENCE) else {
            debug!(written = files.len(), "no caption file matched the preferred languages");
            return Attempt::Failed(FetchError::NoCaptionsFound);
        };
        info!(file = %path.display(), "parsing caption file");

        match read_records(&path) {
            Ok(records) if records.is_empty() => Attempt::Failed(FetchError::NoCaptionsFound),
            Ok(records) => Attempt::Found(records),
            Err(err) => Attempt::Failed(err),
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<CaptionRecord>, FetchError> {
    let document = fs::read_to_string(path).map_err(|err| {
        FetchError::RetrievalFailure(format!("reading {}: {err}", path.display()))
    })?;
    vtt::to_records(&document).map_err(|err| {
        FetchError::RetrievalFailure(format!("parsing {}: {err}", path.display()))
    })
}

/// Picks the error reported when both methods failed. A definitive "nothing
/// here" from the file method defers to the API's more specific "disabled";
/// any other file-method failure (timeout included) is reported as is.
fn combine(primary: FetchError, secondary: FetchError) -> FetchError {
    match secondary {
        FetchError::NoCaptionsFound if primary == FetchError::CaptionsDisabled => primary,
        other => other,
    }
}
