//! Analysis Backend
//!
//! Client for the remote analysis service. The service exposes four
//! endpoints under a configurable base URL:
//!
//! - `POST {base}/upload` (multipart, field `video`)
//! - `POST {base}/youtube` (JSON `{ youtubeUrl }`)
//! - `GET {base}/status/{id}`
//! - `GET {base}/results/{id}`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::input_validation::validate_base_url;
use super::models::{AnalysisResults, AnalysisStage, AnalysisStatus, VideoUpload};
use crate::core::{AnalysisId, CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

/// Default analysis service
pub const DEFAULT_API_URL: &str = "https://football-analysis-csharp-api.onrender.com/api/analysis";

/// Default per-request timeout (uploads can be large)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Multipart field carrying the video
const UPLOAD_FIELD: &str = "video";

/// Maximum number of response-body characters kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct YouTubeRequest<'a> {
    #[serde(rename = "youtubeUrl")]
    youtube_url: &'a str,
}

/// Submission response. Upload answers with `analysisId`, YouTube with
/// `analysis_id`; both spellings are accepted on both endpoints.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default, rename = "analysisId", alias = "analysis_id")]
    analysis_id: Option<serde_json::Value>,
}

impl SubmitResponse {
    fn into_analysis_id(self) -> CoreResult<AnalysisId> {
        let id = match self.analysis_id {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => String::new(),
        };

        if id.trim().is_empty() {
            return Err(CoreError::MalformedResponse(
                "submission response is missing the analysis id".to_string(),
            ));
        }
        Ok(id)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Operations the client needs from an analysis service
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Base URL requests are sent to
    fn base_url(&self) -> &str;

    /// Uploads a video file and returns the analysis identifier
    async fn submit_upload(&self, upload: &VideoUpload) -> CoreResult<AnalysisId>;

    /// Submits a YouTube URL and returns the analysis identifier
    async fn submit_youtube(&self, url: &str) -> CoreResult<AnalysisId>;

    /// Fetches the current status of an analysis
    async fn fetch_status(&self, analysis_id: &str) -> CoreResult<AnalysisStatus>;

    /// Fetches the results of a completed analysis
    async fn fetch_results(&self, analysis_id: &str) -> CoreResult<AnalysisResults>;
}

// =============================================================================
// HttpAnalysisBackend
// =============================================================================

/// reqwest-based client for the analysis service
pub struct HttpAnalysisBackend {
    /// HTTP client with configured timeout
    client: reqwest::Client,
    /// Normalized base URL (no trailing slash)
    base_url: String,
}

impl std::fmt::Debug for HttpAnalysisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpAnalysisBackend {
    /// Create a client for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        let base_url = validate_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Build an endpoint URL, percent-encoding each path segment
    fn endpoint(&self, segments: &[&str]) -> CoreResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CoreError::ValidationError(format!("Invalid API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                CoreError::ValidationError(format!(
                    "API URL '{}' cannot take path segments",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Parse an error response body
    fn parse_api_error(status: StatusCode, body: &str) -> CoreError {
        let message = serde_json::from_str::<ApiErrorResponse>(body)
            .ok()
            .and_then(|resp| resp.error.or(resp.message))
            .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect());

        let message = if message.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        } else {
            message
        };

        CoreError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    /// Read a response body, failing on non-success statuses
    async fn read_json<T>(operation: &str, resp: reqwest::Response) -> CoreResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::transport(operation, e))?;

        if !status.is_success() {
            return Err(Self::parse_api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            CoreError::MalformedResponse(format!("Failed to parse {} response: {}", operation, e))
        })
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn submit_upload(&self, upload: &VideoUpload) -> CoreResult<AnalysisId> {
        let url = self.endpoint(&["upload"])?;

        let file = tokio::fs::File::open(&upload.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CoreError::FileNotFound(upload.path.display().to_string())
            }
            _ => CoreError::IoError(e),
        })?;

        let part = reqwest::multipart::Part::stream_with_length(file, upload.size_bytes)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| {
                CoreError::ValidationError(format!(
                    "Invalid MIME type '{}': {}",
                    upload.mime_type, e
                ))
            })?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        debug!(
            "Uploading {} ({} bytes) to {}",
            upload.file_name, upload.size_bytes, url
        );

        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::transport("upload", e))?;

        let analysis_id = Self::read_json::<SubmitResponse>("upload", resp)
            .await?
            .into_analysis_id()?;

        info!("Video uploaded: analysis_id={}", analysis_id);
        Ok(analysis_id)
    }

    async fn submit_youtube(&self, url: &str) -> CoreResult<AnalysisId> {
        let endpoint = self.endpoint(&["youtube"])?;

        let resp = self
            .client
            .post(endpoint)
            .json(&YouTubeRequest { youtube_url: url })
            .send()
            .await
            .map_err(|e| CoreError::transport("YouTube submission", e))?;

        let analysis_id = Self::read_json::<SubmitResponse>("YouTube submission", resp)
            .await?
            .into_analysis_id()?;

        info!("YouTube video submitted: analysis_id={}", analysis_id);
        Ok(analysis_id)
    }

    async fn fetch_status(&self, analysis_id: &str) -> CoreResult<AnalysisStatus> {
        let url = self.endpoint(&["status", analysis_id])?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::transport("status check", e))?;

        Self::read_json("status check", resp).await
    }

    async fn fetch_results(&self, analysis_id: &str) -> CoreResult<AnalysisResults> {
        let url = self.endpoint(&["results", analysis_id])?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::transport("results fetch", e))?;

        Self::read_json("results fetch", resp).await
    }
}

// ============================================================================
// Scripted Backend for Testing
// ============================================================================

/// In-memory backend that replays scripted replies and counts calls.
///
/// Once the scripted statuses run out, every further status check reports
/// `processing`.
#[derive(Debug)]
pub struct ScriptedBackend {
    analysis_id: AnalysisId,
    submit_failure: Mutex<Option<CoreError>>,
    statuses: Mutex<VecDeque<CoreResult<AnalysisStatus>>>,
    results: Mutex<Option<CoreResult<AnalysisResults>>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    results_calls: AtomicUsize,
}

impl ScriptedBackend {
    /// Creates a backend that accepts every submission under `analysis_id`
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            submit_failure: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            results: Mutex::new(None),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            results_calls: AtomicUsize::new(0),
        }
    }

    /// Makes the next submission fail
    pub fn with_submit_failure(self, error: CoreError) -> Self {
        *lock(&self.submit_failure) = Some(error);
        self
    }

    /// Queues a status reply
    pub fn with_status(self, status: AnalysisStatus) -> Self {
        lock(&self.statuses).push_back(Ok(status));
        self
    }

    /// Queues a failing status reply
    pub fn with_status_failure(self, error: CoreError) -> Self {
        lock(&self.statuses).push_back(Err(error));
        self
    }

    /// Sets the results reply
    pub fn with_results(self, results: CoreResult<AnalysisResults>) -> Self {
        *lock(&self.results) = Some(results);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn results_calls(&self) -> usize {
        self.results_calls.load(Ordering::SeqCst)
    }

    fn submit(&self) -> CoreResult<AnalysisId> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.submit_failure).take() {
            Some(error) => Err(error),
            None => Ok(self.analysis_id.clone()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn base_url(&self) -> &str {
        "scripted://backend"
    }

    async fn submit_upload(&self, _upload: &VideoUpload) -> CoreResult<AnalysisId> {
        self.submit()
    }

    async fn submit_youtube(&self, _url: &str) -> CoreResult<AnalysisId> {
        self.submit()
    }

    async fn fetch_status(&self, analysis_id: &str) -> CoreResult<AnalysisStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if analysis_id != self.analysis_id {
            return Err(CoreError::Rejected {
                status: 404,
                message: format!("Unknown analysis {}", analysis_id),
            });
        }
        lock(&self.statuses)
            .pop_front()
            .unwrap_or_else(|| Ok(AnalysisStatus::new(AnalysisStage::Processing)))
    }

    async fn fetch_results(&self, _analysis_id: &str) -> CoreResult<AnalysisResults> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.results).take().unwrap_or_else(|| {
            Err(CoreError::Rejected {
                status: 404,
                message: "No results scripted".to_string(),
            })
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
