#![forbid(unsafe_code)]

//! HTTP front-end for the caption pipeline.
//!
//! `POST /api/subtitles` takes `{"url": "<watch url or id>"}` and answers with
//! the same object the CLI prints. Successful lookups are cached in memory,
//! bounded to the most recently stored entries.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::{signal, task};
use tracing::{info, warn};
use yt_captions::{
    config::Settings,
    credentials::normalize_proxy,
    error::FetchError,
    fetcher::CaptionFetcher,
    logging::init_logging,
    model::CaptionSet,
    proxy_check::{IP_ECHO_ENDPOINT, ProxyReport, check_proxy},
    video_id::extract_video_id,
};

const CACHE_CAPACITY: usize = 200;
const MAX_RECENT_VIDEOS: usize = 5;
const PROXY_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve YouTube captions as JSON over HTTP.")]
struct Cli {
    #[arg(long, value_name = "HOST", help = "Bind address (default from CAPTIONS_HOST)")]
    host: Option<String>,
    #[arg(long, value_name = "PORT", help = "Bind port (default from CAPTIONS_PORT)")]
    port: Option<u16>,
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    cache: Arc<ResultCache>,
}

impl AppState {
    fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            cache: Arc::new(ResultCache::new(CACHE_CAPACITY)),
        }
    }
}

struct ResultCache {
    captions: RwLock<BoundedMap<CaptionSet>>,
    titles: RwLock<BoundedMap<String>>,
    recent: Mutex<RecentVideos>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            captions: RwLock::new(BoundedMap::new(capacity)),
            titles: RwLock::new(BoundedMap::new(capacity)),
            recent: Mutex::new(RecentVideos::default()),
        }
    }
}

/// Map that forgets its oldest insertions once `capacity` is exceeded.
struct BoundedMap<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> BoundedMap<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != key);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecentVideo {
    video_id: String,
    title: String,
    /// Milliseconds since the Unix epoch.
    timestamp: u64,
}

/// Most recent first, one entry per video.
#[derive(Default)]
struct RecentVideos {
    entries: VecDeque<RecentVideo>,
}

impl RecentVideos {
    fn record(&mut self, video_id: &str, title: &str, timestamp: u64) {
        self.entries.retain(|entry| entry.video_id != video_id);
        self.entries.push_front(RecentVideo {
            video_id: video_id.to_owned(),
            title: title.to_owned(),
            timestamp,
        });
        self.entries.truncate(MAX_RECENT_VIDEOS);
    }

    fn list(&self) -> Vec<RecentVideo> {
        self.entries.iter().cloned().collect()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        let status = match &err {
            FetchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FetchError::NoCaptionsFound | FetchError::CaptionsDisabled => StatusCode::NOT_FOUND,
            FetchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FetchError::RetrievalFailure(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("yt_captions=info,caption_server=info");
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;

    let host = cli.host.unwrap_or_else(|| settings.host.clone());
    let port = cli.port.unwrap_or(settings.port);

    let state = AppState::new(settings);

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/subtitles", post(subtitles))
        .route("/api/video-title", get(video_title))
        .route("/api/recent-videos", get(recent_videos))
        .route("/api/clear-cache", post(clear_cache))
        .route("/api/debug-proxy", get(debug_proxy))
        .with_state(state);

    let addr = SocketAddr::new(
        host.parse()
            .with_context(|| format!("parsing bind address {host}"))?,
        port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("caption server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
}

async fn health() -> Json<HealthPayload> {
    Json(HealthPayload { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct SubtitleRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "videoId")]
    video_id: Option<String>,
}

async fn subtitles(
    State(state): State<AppState>,
    Json(request): Json<SubtitleRequest>,
) -> ApiResult<Json<CaptionSet>> {
    let video_id = requested_video_id(request.url.or(request.video_id))?;

    let cached = state.cache.captions.read().get(&video_id);
    if let Some(cached) = cached {
        remember(&state, &cached);
        return Ok(Json(cached));
    }

    let settings = state.settings.clone();
    let result = task::spawn_blocking({
        let video_id = video_id.clone();
        move || -> Result<CaptionSet, FetchError> {
            CaptionFetcher::from_settings(&settings)?.retrieve(&video_id)
        }
    })
    .await
    .map_err(|err| ApiError::internal(format!("task join error: {err}")))?;

    match result {
        Ok(set) => {
            info!(video_id = %video_id, lines = set.subtitles.len(), "captions served");
            remember(&state, &set);
            state
                .cache
                .captions
                .write()
                .insert(video_id, set.clone());
            Ok(Json(set))
        }
        Err(err) => {
            warn!(video_id = %video_id, category = err.category(), error = %err, "caption request failed");
            Err(err.into())
        }
    }
}

/// Records a served video in the recent list and its title in the cache.
fn remember(state: &AppState, set: &CaptionSet) {
    if let Some(title) = &set.title {
        state
            .cache
            .titles
            .write()
            .insert(set.video_id.clone(), title.clone());
    }
    let title = set.title.as_deref().unwrap_or(&set.video_id);
    state
        .cache
        .recent
        .lock()
        .record(&set.video_id, title, now_millis());
}

#[derive(Debug, Deserialize)]
struct TitleQuery {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TitlePayload {
    video_id: String,
    title: String,
}

async fn video_title(
    State(state): State<AppState>,
    Query(query): Query<TitleQuery>,
) -> ApiResult<Json<TitlePayload>> {
    let video_id = requested_video_id(query.video_id)?;

    let cached = state.cache.titles.read().get(&video_id);
    if let Some(title) = cached {
        return Ok(Json(TitlePayload { video_id, title }));
    }

    let settings = state.settings.clone();
    let title = task::spawn_blocking({
        let video_id = video_id.clone();
        move || -> Result<Option<String>, FetchError> {
            Ok(CaptionFetcher::from_settings(&settings)?.title(&video_id))
        }
    })
    .await
    .map_err(|err| ApiError::internal(format!("task join error: {err}")))??
    .ok_or_else(|| ApiError::not_found("title not available"))?;

    state
        .cache
        .titles
        .write()
        .insert(video_id.clone(), title.clone());
    Ok(Json(TitlePayload { video_id, title }))
}

#[derive(Serialize)]
struct RecentPayload {
    videos: Vec<RecentVideo>,
}

async fn recent_videos(State(state): State<AppState>) -> Json<RecentPayload> {
    Json(RecentPayload {
        videos: state.cache.recent.lock().list(),
    })
}

#[derive(Debug, Deserialize)]
struct ClearRequest {
    #[serde(default, rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearPayload {
    success: bool,
    video_id: String,
    cleared: bool,
}

async fn clear_cache(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> ApiResult<Json<ClearPayload>> {
    let video_id = requested_video_id(request.video_id)?;
    let captions = state.cache.captions.write().remove(&video_id);
    let title = state.cache.titles.write().remove(&video_id);
    info!(video_id = %video_id, cleared = captions || title, "cache cleared");
    Ok(Json(ClearPayload {
        success: true,
        video_id,
        cleared: captions || title,
    }))
}

async fn debug_proxy(State(state): State<AppState>) -> ApiResult<Json<ProxyReport>> {
    let proxy = state.settings.proxy_url.as_deref().and_then(normalize_proxy);
    let report = task::spawn_blocking(move || {
        check_proxy(proxy.as_deref(), IP_ECHO_ENDPOINT, PROXY_CHECK_TIMEOUT)
    })
    .await
    .map_err(|err| ApiError::internal(format!("task join error: {err}")))?;
    Ok(Json(report))
}

fn requested_video_id(input: Option<String>) -> ApiResult<String> {
    let input = input
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(FetchError::missing_video_id)?;
    extract_video_id(&input).ok_or_else(|| FetchError::invalid_video_id().into())
}
