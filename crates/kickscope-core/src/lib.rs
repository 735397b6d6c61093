//! Kickscope Core Library
//!
//! Client-side engine for submitting football videos to a remote analysis
//! service, following the analysis to completion and rendering the returned
//! performance metrics.

pub mod core;
pub mod logging;

pub use crate::core::analysis::{
    AnalysisBackend, AnalysisController, AnalysisEvent, AnalysisRequest, AnalysisResults,
    AnalysisSession, AnalysisStage, AnalysisStatus, AnalysisTicket, HttpAnalysisBackend,
    PollHandle, PollOutcome, PollerConfig, SessionUpdate, StatusPoller,
};
pub use crate::core::settings::{ClientSettings, SettingsManager, SettingsOverrides};
pub use crate::logging::{init_logging, LoggingOptions};
pub use crate::core::{CoreError, CoreResult};
