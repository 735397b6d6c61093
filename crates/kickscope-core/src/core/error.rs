//! Kickscope Error Definitions
//!
//! Every failure of an analysis attempt maps to one of these variants and is
//! terminal for that attempt.

use thiserror::Error;

/// HTTP statuses worth retrying while polling
const TRANSIENT_HTTP_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Submission Errors
    // =========================================================================
    #[error("Nothing to analyze: {0}")]
    EmptySubmission(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("An analysis is already in progress")]
    Busy,

    // =========================================================================
    // Server Errors
    // =========================================================================
    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected server response: {0}")]
    MalformedResponse(String),

    // =========================================================================
    // Analysis Errors
    // =========================================================================
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Analysis still running after {0} status checks")]
    PollingTimedOut(u32),

    #[error("Analysis polling cancelled")]
    Cancelled,

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Returns true when the failure is likely transient (network hiccup,
    /// rate limiting, gateway errors).
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Transport(_) => true,
            CoreError::Rejected { status, .. } => TRANSIENT_HTTP_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Builds a transport error from a reqwest failure
    pub(crate) fn transport(operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CoreError::Transport(format!("{} timed out: {}", operation, err))
        } else {
            CoreError::Transport(format!("{} failed: {}", operation, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_transient() {
        assert!(CoreError::Transport("connection reset".to_string()).is_transient());
    }

    #[test]
    fn test_gateway_rejections_are_transient() {
        for status in [429, 502, 503, 504] {
            let err = CoreError::Rejected {
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "{} should be transient", status);
        }
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        let err = CoreError::Rejected {
            status: 404,
            message: "unknown analysis".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!CoreError::AnalysisFailed("decode failed".to_string()).is_transient());
        assert!(!CoreError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = CoreError::Rejected {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Server rejected request (500): boom");
        assert_eq!(
            CoreError::AnalysisFailed("decode failed".to_string()).to_string(),
            "Analysis failed: decode failed"
        );
    }
}
