#![forbid(unsafe_code)]

//! HTTP front of the Shorts bundler.
//!
//! Listing requests resolve synchronously; download requests only validate
//! and then hand the work to the job manager, which runs it in the
//! background. Every route except the archive download sits behind the
//! bearer-token middleware.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use shorts_bundler::config::{SettingsOverrides, resolve_settings};
use shorts_bundler::downloader::{MediaDownloader, SelectionRange};
use shorts_bundler::error::PipelineError;
use shorts_bundler::jobs::{JobManager, JobSnapshot, Pipeline, RemoveOutcome};
use shorts_bundler::progress::ProgressRecord;
use shorts_bundler::resolver::{ChannelLister, require_items, resolve_shorts};
use shorts_bundler::security::{CredentialCheck, StaticToken, require_bearer};
use shorts_bundler::tools::ensure_program_available;
use shorts_bundler::transcoder::{Ffmpeg, Transcoder};
use shorts_bundler::ytdlp::YtDlp;
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

const STARTED_MESSAGE: &str = "Download started. Please check progress.";

#[derive(Debug, Parser)]
#[command(
    name = "shorts_server",
    about = "Serve the Shorts listing, bundling and download API"
)]
struct ServerArgs {
    /// `.env` file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Bind address (overrides SHORTS_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides SHORTS_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Parent of per-job working directories.
    #[arg(long)]
    work_root: Option<PathBuf>,
    /// Directory archives are published from.
    #[arg(long)]
    archive_dir: Option<PathBuf>,
}

impl ServerArgs {
    fn into_overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            host: self.host,
            port: self.port,
            work_root: self.work_root,
            archive_dir: self.archive_dir,
            env_path: self.env_file,
        }
    }
}

#[derive(Clone)]
struct AppState {
    lister: Arc<dyn ChannelLister>,
    jobs: JobManager,
    playlist_end: usize,
    credentials: Arc<dyn CredentialCheck>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Creates a 400 error with the provided message.
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Creates a 404 error with the provided message.
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Creates a 409 error with the provided message.
    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    /// Creates a 500 error with the provided message.
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::NotFound => Self::not_found(message),
            client if client.is_client_error() => Self::bad_request(message),
            _ => Self::internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ShortsRequest {
    channel_url: String,
    #[serde(default)]
    start_index: Option<usize>,
    #[serde(default)]
    end_index: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ShortsListing {
    shorts_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DownloadStarted {
    message: &'static str,
    download_link: String,
    job_id: String,
    status_link: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = ServerArgs::parse();
    let settings = resolve_settings(args.into_overrides())?;

    ensure_program_available(&settings.yt_dlp_bin, "--version")?;
    ensure_program_available(&settings.ffmpeg_bin, "-version")?;

    let host = settings.host.parse::<IpAddr>().with_context(|| {
        format!("expected a valid IP address for SHORTS_HOST, got {}", settings.host)
    })?;

    let ytdlp = Arc::new(YtDlp::new(settings.yt_dlp_bin.clone()));
    let lister: Arc<dyn ChannelLister> = ytdlp.clone();
    let downloader: Arc<dyn MediaDownloader> = ytdlp;
    let transcoder: Arc<dyn Transcoder> = Arc::new(Ffmpeg::new(settings.ffmpeg_bin.clone()));

    let jobs = JobManager::new(Pipeline {
        downloader,
        transcoder,
        work_root: settings.work_root.clone(),
        archive_dir: settings.archive_dir.clone(),
    });
    let state = AppState {
        lister,
        jobs,
        playlist_end: settings.playlist_end,
        credentials: Arc::new(StaticToken::new(settings.api_token.clone())),
    };
    let app = build_router(state, &settings.cors_origins);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        %addr,
        work_root = %settings.work_root.display(),
        archive_dir = %settings.archive_dir.display(),
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to install Ctrl+C handler");
    }
    info!("shutting down");
}

fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/get-shorts", post(get_shorts))
        .route("/download-shorts", post(download_shorts))
        .route("/download-progress", get(download_progress))
        .route("/covertion-progress", get(conversion_progress))
        .route("/conversion-progress", get(conversion_progress))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route_layer(middleware::from_fn_with_state(
            state.credentials.clone(),
            require_bearer,
        ));

    Router::new()
        .merge(protected)
        .route("/download/{filename}", get(download_archive))
        .with_state(state)
        .layer(build_cors_layer(cors_origins))
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn get_shorts(
    State(state): State<AppState>,
    Json(request): Json<ShortsRequest>,
) -> ApiResult<Json<ShortsListing>> {
    let shorts_urls = resolve_items(&state, request.channel_url).await?;
    Ok(Json(ShortsListing { shorts_urls }))
}

async fn download_shorts(
    State(state): State<AppState>,
    Json(request): Json<ShortsRequest>,
) -> ApiResult<Json<DownloadStarted>> {
    let (Some(start), Some(end)) = (request.start_index, request.end_index) else {
        return Err(ApiError::bad_request(
            "start_index and end_index are required",
        ));
    };
    let items = resolve_items(&state, request.channel_url).await?;
    let ticket = state.jobs.schedule(items, SelectionRange::new(start, end))?;

    Ok(Json(DownloadStarted {
        message: STARTED_MESSAGE,
        status_link: format!("/jobs/{}", ticket.id),
        download_link: ticket.download_link,
        job_id: ticket.id,
    }))
}

async fn download_progress(State(state): State<AppState>) -> Json<ProgressRecord> {
    Json(state.jobs.latest_download_progress())
}

async fn conversion_progress(State(state): State<AppState>) -> Json<ProgressRecord> {
    Json(state.jobs.latest_conversion_progress())
}

async fn get_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<JobSnapshot>> {
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("job not found"))
}

async fn delete_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    match state.jobs.remove(&id) {
        RemoveOutcome::Removed => Ok(StatusCode::NO_CONTENT),
        RemoveOutcome::Unfinished => Err(ApiError::conflict("job has not finished yet")),
        RemoveOutcome::Missing => Err(ApiError::not_found("job not found")),
    }
}

async fn download_archive(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&filename)?;
    if !filename.ends_with(".zip") {
        return Err(ApiError::not_found("file not found"));
    }
    let path = state.jobs.archive_dir().join(&filename);
    stream_archive(path, &filename).await
}

/// Lists the channel on a blocking thread and rejects empty results.
async fn resolve_items(state: &AppState, channel_url: String) -> ApiResult<Vec<String>> {
    let channel_url = channel_url.trim().to_string();
    if channel_url.is_empty() {
        return Err(ApiError::bad_request("channel_url is required"));
    }
    let lister = state.lister.clone();
    let limit = state.playlist_end;
    let items =
        tokio::task::spawn_blocking(move || resolve_shorts(lister.as_ref(), &channel_url, limit))
            .await
            .map_err(|err| ApiError::internal(format!("listing task failed: {err}")))??;
    Ok(require_items(items)?)
}

/// Validates that a single dynamic path segment never escapes its base folder.
fn ensure_safe_path_segment(value: &str) -> ApiResult<()> {
    if value.is_empty()
        || Path::new(value)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }

    Ok(())
}

async fn stream_archive(path: PathBuf, filename: &str) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("file not found"));
    }

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::{Value, json};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const TOKEN: &str = "mysecrettoken";

    struct FakeLister {
        entries: Vec<String>,
        calls: AtomicUsize,
    }

    impl ChannelLister for FakeLister {
        fn list_entries(&self, _channel_url: &str, limit: usize) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.iter().take(limit).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeDownloader {
        attempts: AtomicUsize,
        fail: bool,
    }

    impl MediaDownloader for FakeDownloader {
        fn download(&self, item_url: &str, output_dir: &Path) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("ERROR: Video unavailable");
            }
            let name = item_url.rsplit('/').next().unwrap_or("item");
            fs::write(output_dir.join(format!("{name}.webm")), item_url)?;
            Ok(())
        }
    }

    struct CopyTranscoder;

    impl Transcoder for CopyTranscoder {
        fn transcode(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
            fs::copy(input, output)?;
            Ok(())
        }
    }

    struct TestApp {
        _temp: TempDir,
        archive_dir: PathBuf,
        router: Router,
        lister: Arc<FakeLister>,
        downloader: Arc<FakeDownloader>,
    }

    impl TestApp {
        fn new(entries: Vec<String>) -> Self {
            Self::with_downloader(entries, FakeDownloader::default())
        }

        fn with_downloader(entries: Vec<String>, downloader: FakeDownloader) -> Self {
            let temp = tempdir().unwrap();
            let archive_dir = temp.path().join("archives");
            let lister = Arc::new(FakeLister {
                entries,
                calls: AtomicUsize::new(0),
            });
            let downloader = Arc::new(downloader);
            let jobs = JobManager::new(Pipeline {
                downloader: downloader.clone(),
                transcoder: Arc::new(CopyTranscoder),
                work_root: temp.path().join("work"),
                archive_dir: archive_dir.clone(),
            });
            let state = AppState {
                lister: lister.clone(),
                jobs,
                playlist_end: 1000,
                credentials: Arc::new(StaticToken::new(TOKEN)),
            };
            let router = build_router(state, &["http://localhost:3000".to_string()]);
            Self {
                _temp: temp,
                archive_dir,
                router,
                lister,
                downloader,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Response) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            (response.status(), response)
        }

        async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
            let (status, response) = self.send(request).await;
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn wait_for_job(&self, id: &str) -> Value {
            for _ in 0..500 {
                let (status, body) = self.json(authed_get(&format!("/jobs/{id}"))).await;
                assert_eq!(status, StatusCode::OK);
                if body["status"] == "succeeded" || body["status"] == "failed" {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {id} did not finish");
        }
    }

    fn channel(shorts: usize, longs: usize) -> Vec<String> {
        let mut entries: Vec<String> = (0..shorts)
            .map(|i| format!("https://www.youtube.com/shorts/s{i}"))
            .collect();
        entries.extend((0..longs).map(|i| format!("https://www.youtube.com/watch?v=l{i}")));
        entries
    }

    fn authed_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    fn authed_delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    fn anonymous_get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn get_shorts_filters_the_listing() {
        let app = TestApp::new(channel(3, 2));
        let (status, body) = app
            .json(authed_post(
                "/get-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["shorts_urls"],
            json!([
                "https://www.youtube.com/shorts/s0",
                "https://www.youtube.com/shorts/s1",
                "https://www.youtube.com/shorts/s2"
            ])
        );
    }

    #[tokio::test]
    async fn selected_range_is_bundled_and_downloadable() {
        let app = TestApp::new(channel(12, 4));

        let (status, started) = app
            .json(authed_post(
                "/download-shorts",
                json!({
                    "channel_url": "https://www.youtube.com/@chan",
                    "start_index": 2,
                    "end_index": 5
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["message"], STARTED_MESSAGE);
        let job_id = started["job_id"].as_str().unwrap().to_string();
        assert_eq!(started["status_link"], format!("/jobs/{job_id}"));

        let job = app.wait_for_job(&job_id).await;
        assert_eq!(job["status"], "succeeded", "{job}");
        assert_eq!(
            job["downloaded"],
            json!([
                "https://www.youtube.com/shorts/s2",
                "https://www.youtube.com/shorts/s3",
                "https://www.youtube.com/shorts/s4"
            ])
        );
        assert_eq!(job["archive_entries"], json!(["s2.mp4", "s3.mp4", "s4.mp4"]));
        assert_eq!(app.downloader.attempts.load(Ordering::SeqCst), 3);

        let (status, progress) = app.json(authed_get("/download-progress")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            progress,
            json!({"stage": "Completed", "total": 3, "completed": 3})
        );
        let (_, conversion) = app.json(authed_get("/covertion-progress")).await;
        assert_eq!(conversion["stage"], "Completed");
        let (_, alias) = app.json(authed_get("/conversion-progress")).await;
        assert_eq!(alias, conversion);

        let link = started["download_link"].as_str().unwrap();
        let (status, response) = app.send(anonymous_get(link)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains(&format!("{job_id}-shorts.zip")));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    fn request_with_auth(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let body = if method == "POST" {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(
                json!({
                    "channel_url": "https://www.youtube.com/@chan",
                    "start_index": 0,
                    "end_index": 1
                })
                .to_string(),
            )
        } else {
            Body::empty()
        };
        builder.body(body).unwrap()
    }

    #[tokio::test]
    async fn every_protected_route_rejects_bad_tokens_without_side_effects() {
        let app = TestApp::new(channel(12, 0));
        let routes = [
            ("POST", "/get-shorts"),
            ("POST", "/download-shorts"),
            ("GET", "/download-progress"),
            ("GET", "/covertion-progress"),
            ("GET", "/conversion-progress"),
            ("GET", "/jobs/job-1"),
            ("DELETE", "/jobs/job-1"),
        ];
        let wrong_token = format!("Bearer {TOKEN}x");
        let bare_token = TOKEN.to_string();

        for (method, uri) in routes {
            for auth in [None, Some(wrong_token.as_str()), Some(bare_token.as_str())] {
                let (status, body) = app.json(request_with_auth(method, uri, auth)).await;
                assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri} {auth:?}");
                assert_eq!(body["error"], "Invalid or missing token");
            }
        }

        assert_eq!(app.lister.calls.load(Ordering::SeqCst), 0);
        assert_eq!(app.downloader.attempts.load(Ordering::SeqCst), 0);
        let (_, progress) = app.json(authed_get("/download-progress")).await;
        assert_eq!(progress, json!({"stage": "Idle", "total": 0, "completed": 0}));
        let (status, _) = app.json(authed_get("/jobs/job-1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clearing_a_job_needs_the_token_and_removes_its_archive() {
        let app = TestApp::new(channel(3, 0));
        let (_, started) = app
            .json(authed_post(
                "/download-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan", "start_index": 0, "end_index": 2}),
            ))
            .await;
        let job_id = started["job_id"].as_str().unwrap().to_string();
        let link = started["download_link"].as_str().unwrap().to_string();
        app.wait_for_job(&job_id).await;
        let archive = app.archive_dir.join(format!("{job_id}-shorts.zip"));
        assert!(archive.exists());

        let uri = format!("/jobs/{job_id}");
        let (status, _) = app
            .json(request_with_auth("DELETE", &uri, Some("Bearer nope")))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(archive.exists());

        let (status, _) = app.json(authed_delete(&uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!archive.exists());
        let (status, _) = app.json(anonymous_get(&link)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn option_like_channel_url_is_rejected() {
        let app = TestApp::new(channel(3, 0));
        for uri in ["/get-shorts", "/download-shorts"] {
            let (status, body) = app
                .json(authed_post(
                    uri,
                    json!({"channel_url": "--exec=touch /tmp/x", "start_index": 0, "end_index": 1}),
                ))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].as_str().unwrap().contains("http(s)"));
        }
        assert_eq!(app.lister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_listing_is_not_found_on_both_endpoints() {
        let app = TestApp::new(channel(0, 3));
        for (uri, body) in [
            ("/get-shorts", json!({"channel_url": "https://www.youtube.com/@chan"})),
            (
                "/download-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan", "start_index": 0, "end_index": 1}),
            ),
        ] {
            let (status, body) = app.json(authed_post(uri, body)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"], "no Shorts URLs found");
        }
        assert_eq!(app.downloader.attempts.load(Ordering::SeqCst), 0);
        let (status, _) = app.json(authed_get("/jobs/job-1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_request_is_rejected() {
        let app = TestApp::new(channel(12, 0));
        let (status, body) = app
            .json(authed_post(
                "/download-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan", "start_index": 10, "end_index": 13}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("only 12 Shorts"));

        let (status, _) = app.json(authed_get("/jobs/job-1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, progress) = app.json(authed_get("/download-progress")).await;
        assert_eq!(progress["stage"], "Idle");
    }

    #[tokio::test]
    async fn missing_indices_are_a_bad_request() {
        let app = TestApp::new(channel(3, 0));
        let (status, body) = app
            .json(authed_post(
                "/download-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan"}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("start_index"));
        assert_eq!(app.lister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_job_is_reported_and_can_be_cleared() {
        let app = TestApp::with_downloader(
            channel(4, 0),
            FakeDownloader {
                fail: true,
                ..FakeDownloader::default()
            },
        );
        let (status, started) = app
            .json(authed_post(
                "/download-shorts",
                json!({"channel_url": "https://www.youtube.com/@chan", "start_index": 0, "end_index": 4}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let job_id = started["job_id"].as_str().unwrap().to_string();

        let job = app.wait_for_job(&job_id).await;
        assert_eq!(job["status"], "failed");
        assert_eq!(job["stage"], "Failed");
        assert!(job["error"].as_str().unwrap().contains("Video unavailable"));
        assert_eq!(job["downloaded"], json!([]));
        let (_, progress) = app.json(authed_get("/download-progress")).await;
        assert_eq!(progress["stage"], "Failed");

        let (status, _) = app.json(authed_delete(&format!("/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.json(authed_delete(&format!("/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_rejects_missing_and_unsafe_names() {
        let app = TestApp::new(channel(1, 0));
        fs::create_dir_all(&app.archive_dir).unwrap();
        fs::write(app.archive_dir.join("notes.txt"), "not an archive").unwrap();

        for uri in [
            "/download/missing.zip",
            "/download/notes.txt",
            "/download/..%2F..%2Fetc%2Fpasswd",
        ] {
            let (status, body) = app.json(anonymous_get(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"], "file not found");
        }
    }

    #[test]
    fn safe_path_segment_accepts_plain_names_only() {
        assert!(ensure_safe_path_segment("job-1-shorts.zip").is_ok());
        assert!(ensure_safe_path_segment("").is_err());
        assert!(ensure_safe_path_segment("../a.zip").is_err());
        assert!(ensure_safe_path_segment("/etc/passwd").is_err());
    }

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (PipelineError::NotFound, StatusCode::NOT_FOUND),
            (
                PipelineError::Resolution("boom".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::Range {
                    start: 4,
                    end: 2,
                    available: 3,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::Transcode {
                    file: "a.webm".into(),
                    reason: "codec".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn cli_flags_become_overrides() {
        let args = ServerArgs::parse_from([
            "shorts_server",
            "--port",
            "9000",
            "--archive-dir",
            "/srv/archives",
            "--env-file",
            "custom.env",
        ]);
        let overrides = args.into_overrides();
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.archive_dir, Some(PathBuf::from("/srv/archives")));
        assert_eq!(overrides.env_path, Some(PathBuf::from("custom.env")));
        assert!(overrides.host.is_none());
    }
}
