//! Analysis Module
//!
//! Submission, status polling and result rendering for the football
//! analysis service.

mod backend;
mod input_validation;
mod models;
mod poller;
pub mod render;
mod session;

pub use backend::{
    AnalysisBackend, HttpAnalysisBackend, ScriptedBackend, DEFAULT_API_URL,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use input_validation::{
    prepare_video_upload, validate_base_url, validate_youtube_url, video_mime_type,
    MAX_UPLOAD_BYTES,
};
pub use models::{
    AnalysisRequest, AnalysisResults, AnalysisStage, AnalysisStatus, AnalysisTicket,
    MovementIntensity, PerformanceMetrics, VideoUpload,
};
pub use poller::{
    AnalysisEvent, PollHandle, PollOutcome, PollerConfig, StatusPoller, DEFAULT_MAX_POLLS,
    DEFAULT_POLL_INTERVAL, DEFAULT_TRANSPORT_RETRIES,
};
pub use render::{render_results, render_status, status_text, ResultsView, StatusView};
pub use session::{AnalysisController, AnalysisSession, SessionUpdate};
