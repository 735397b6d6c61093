//! Analysis Data Models
//!
//! Requests, statuses and results exchanged with the analysis backend.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::core::{normalize_progress, AnalysisId, Percent, SessionId};

// =============================================================================
// Request
// =============================================================================

/// A video file prepared for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoUpload {
    /// Path on the local filesystem
    pub path: PathBuf,
    /// File name sent in the multipart part
    pub file_name: String,
    /// MIME type guessed from the extension
    pub mime_type: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// What the user asked to analyze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisRequest {
    /// Local video file sent as multipart upload
    Upload(VideoUpload),
    /// Video the backend downloads from YouTube
    YouTube { url: String },
}

impl AnalysisRequest {
    /// Stage the analysis is in right after a successful submission
    pub fn initial_stage(&self) -> AnalysisStage {
        match self {
            AnalysisRequest::Upload(_) => AnalysisStage::Uploaded,
            AnalysisRequest::YouTube { .. } => AnalysisStage::Downloading,
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle stage reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// File received by the backend
    Uploaded,
    /// Backend is fetching the YouTube video
    Downloading,
    /// Analysis is running
    Processing,
    /// Results are ready
    Completed,
    /// Analysis failed on the backend
    Error,
    /// Any value this client does not know about, including none at all
    #[default]
    #[serde(other)]
    Unknown,
}

impl AnalysisStage {
    /// Whether polling should stop at this stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStage::Completed | AnalysisStage::Error)
    }

    /// User-facing label
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisStage::Uploaded => "Video uploaded",
            AnalysisStage::Downloading => "Downloading video...",
            AnalysisStage::Processing => "Analyzing video...",
            AnalysisStage::Completed => "Analysis complete",
            AnalysisStage::Error => "Analysis failed",
            AnalysisStage::Unknown => "Waiting...",
        }
    }
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Status snapshot returned by `GET /status/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    /// Missing or null on the wire reads as `Unknown` and polling goes on
    #[serde(rename = "status", default, deserialize_with = "null_as_default")]
    pub stage: AnalysisStage,
    #[serde(
        default,
        deserialize_with = "deserialize_progress",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<Percent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisStatus {
    pub fn new(stage: AnalysisStage) -> Self {
        Self {
            stage,
            progress: None,
            error: None,
        }
    }

    pub fn with_progress(mut self, progress: Percent) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Error message to surface when the stage is `Error`
    pub fn error_message(&self) -> String {
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<Option<Percent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.and_then(normalize_progress))
}

// =============================================================================
// Results
// =============================================================================

/// Movement intensity as reported by the backend, either a label or a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MovementIntensity {
    Score(f64),
    Label(String),
}

impl std::fmt::Display for MovementIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementIntensity::Score(score) => write!(f, "{}", score),
            MovementIntensity::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Performance metrics computed by the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub total_distance_meters: Option<f64>,
    #[serde(default)]
    pub average_speed_pixels_per_sec: Option<f64>,
    #[serde(default)]
    pub movement_intensity: Option<MovementIntensity>,
}

/// Final results returned by `GET /results/{id}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: PerformanceMetrics,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Ticket
// =============================================================================

/// Receipt for an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTicket {
    /// Backend-assigned identifier used for status and results queries
    pub analysis_id: AnalysisId,
    /// Stage right after submission
    pub stage: AnalysisStage,
    /// Local session that made the submission
    pub session_id: SessionId,
    /// Unix timestamp of the submission
    pub submitted_at: i64,
}

impl AnalysisTicket {
    pub fn new(analysis_id: AnalysisId, stage: AnalysisStage, session_id: SessionId) -> Self {
        Self {
            analysis_id,
            stage,
            session_id,
            submitted_at: chrono::Utc::now().timestamp(),
        }
    }
}
