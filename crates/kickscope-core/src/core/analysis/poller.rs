//! Status Poller
//!
//! Follows one analysis until it reaches a terminal stage. The loop runs as
//! a spawned task owned by a [`PollHandle`]; cancelling or dropping the
//! handle stops it at the next await point.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::backend::AnalysisBackend;
use super::models::{AnalysisResults, AnalysisStage, AnalysisStatus};
use crate::core::{AnalysisId, CoreError, CoreResult, SessionId};

// =============================================================================
// Constants
// =============================================================================

/// Delay between two status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status checks before giving up (30 minutes at the default interval)
pub const DEFAULT_MAX_POLLS: u32 = 900;

/// Consecutive transient failures tolerated before polling stops
pub const DEFAULT_TRANSPORT_RETRIES: u32 = 2;

/// Upper bound for the retry backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration
// =============================================================================

/// Polling cadence and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Fixed delay between status checks
    pub interval: Duration,
    /// Maximum number of status checks
    pub max_polls: u32,
    /// Consecutive transient failures retried before giving up
    pub transport_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }

    /// Delay before retry number `attempt` (1-based): the interval doubled
    /// per attempt, capped. Never shorter than the interval.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let cap = MAX_RETRY_DELAY.max(self.interval);
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.interval.checked_mul(factor).unwrap_or(cap).min(cap)
    }
}

// =============================================================================
// Events & Outcome
// =============================================================================

/// Progress notifications emitted while polling
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// A status check succeeded
    StatusUpdated {
        analysis_id: AnalysisId,
        status: AnalysisStatus,
        poll: u32,
    },
    /// A transient failure will be retried
    RetryScheduled {
        analysis_id: AnalysisId,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// Results were fetched after completion
    ResultsReady {
        analysis_id: AnalysisId,
        results: AnalysisResults,
    },
}

/// How a polling cycle ended. Exactly one outcome per cycle.
#[derive(Debug)]
pub enum PollOutcome {
    /// Analysis completed and results were fetched
    Completed(AnalysisResults),
    /// Backend reported the analysis as failed
    Failed(String),
    /// Status or results could not be retrieved
    TransportFailed(CoreError),
    /// Still not terminal after the configured number of checks
    TimedOut { polls: u32 },
    /// Polling was cancelled by its owner
    Cancelled,
}

impl PollOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }

    /// Converts the outcome into the results or the error to surface
    pub fn into_result(self) -> CoreResult<AnalysisResults> {
        match self {
            PollOutcome::Completed(results) => Ok(results),
            PollOutcome::Failed(message) => Err(CoreError::AnalysisFailed(message)),
            PollOutcome::TransportFailed(error) => Err(error),
            PollOutcome::TimedOut { polls } => Err(CoreError::PollingTimedOut(polls)),
            PollOutcome::Cancelled => Err(CoreError::Cancelled),
        }
    }
}

// =============================================================================
// Poll Handle
// =============================================================================

/// Handle to a running polling task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    analysis_id: AnalysisId,
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    /// Identifier being polled
    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    /// Requests cancellation. Returns false if the task already ended or
    /// was already cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.cancel_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Whether the polling task has ended
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Waits for the polling task to end
    pub async fn join(mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Cancelled;
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PollOutcome::Cancelled,
            Err(e) => PollOutcome::TransportFailed(CoreError::Internal(format!(
                "Polling task failed: {}",
                e
            ))),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

// =============================================================================
// StatusPoller
// =============================================================================

/// Spawns polling tasks against an analysis backend
#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn AnalysisBackend>,
    config: PollerConfig,
    session_id: Option<SessionId>,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("base_url", &self.backend.base_url())
            .field("config", &self.config)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: PollerConfig) -> Self {
        Self {
            backend,
            config,
            session_id: None,
        }
    }

    /// Tags every polling span with the owning session
    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Starts polling `analysis_id`, reporting progress on `events`.
    ///
    /// The event channel is closed when the task ends.
    pub fn spawn(
        &self,
        analysis_id: AnalysisId,
        events: mpsc::UnboundedSender<AnalysisEvent>,
    ) -> PollHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let span = info_span!(
            "poll",
            session = self.session_id.as_deref().unwrap_or("-"),
            analysis_id = %analysis_id
        );

        let task = tokio::spawn(
            poll_loop(
                Arc::clone(&self.backend),
                self.config,
                analysis_id.clone(),
                events,
                cancel_rx,
            )
            .instrument(span),
        );

        PollHandle {
            analysis_id,
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        }
    }
}

async fn poll_loop(
    backend: Arc<dyn AnalysisBackend>,
    config: PollerConfig,
    analysis_id: AnalysisId,
    events: mpsc::UnboundedSender<AnalysisEvent>,
    mut cancel: oneshot::Receiver<()>,
) -> PollOutcome {
    let mut polls: u32 = 0;
    let mut failures: u32 = 0;

    loop {
        if polls >= config.max_polls {
            info!("Giving up after {} status checks", polls);
            return PollOutcome::TimedOut { polls };
        }
        polls += 1;

        let reply = tokio::select! {
            biased;
            _ = &mut cancel => return PollOutcome::Cancelled,
            reply = backend.fetch_status(&analysis_id) => reply,
        };

        let delay = match reply {
            Ok(status) => {
                failures = 0;
                debug!(
                    "Status check {}: stage={:?} progress={:?}",
                    polls, status.stage, status.progress
                );

                let stage = status.stage;
                let error_message = status.error_message();
                let _ = events.send(AnalysisEvent::StatusUpdated {
                    analysis_id: analysis_id.clone(),
                    status,
                    poll: polls,
                });

                match stage {
                    AnalysisStage::Completed => {
                        return fetch_results(&*backend, &analysis_id, &events, &mut cancel).await;
                    }
                    AnalysisStage::Error => {
                        info!("Analysis reported an error: {}", error_message);
                        return PollOutcome::Failed(error_message);
                    }
                    _ => config.interval,
                }
            }
            Err(e) if e.is_transient() && failures < config.transport_retries => {
                failures += 1;
                let delay = config.retry_delay(failures);
                warn!(
                    "Status check {} failed (retry {}/{} in {}ms): {}",
                    polls,
                    failures,
                    config.transport_retries,
                    delay.as_millis(),
                    e
                );
                let _ = events.send(AnalysisEvent::RetryScheduled {
                    analysis_id: analysis_id.clone(),
                    attempt: failures,
                    delay_ms: delay.as_millis() as u64,
                    reason: e.to_string(),
                });
                delay
            }
            Err(e) => {
                info!("Status check {} failed, stopping: {}", polls, e);
                return PollOutcome::TransportFailed(e);
            }
        };

        tokio::select! {
            biased;
            _ = &mut cancel => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn fetch_results(
    backend: &dyn AnalysisBackend,
    analysis_id: &str,
    events: &mpsc::UnboundedSender<AnalysisEvent>,
    cancel: &mut oneshot::Receiver<()>,
) -> PollOutcome {
    let reply = tokio::select! {
        biased;
        _ = cancel => return PollOutcome::Cancelled,
        reply = backend.fetch_results(analysis_id) => reply,
    };

    match reply {
        Ok(results) => {
            info!(
                "Analysis complete with {} suggestion(s)",
                results.suggestions.len()
            );
            let _ = events.send(AnalysisEvent::ResultsReady {
                analysis_id: analysis_id.to_string(),
                results: results.clone(),
            });
            PollOutcome::Completed(results)
        }
        Err(e) => {
            info!("Failed to fetch results: {}", e);
            PollOutcome::TransportFailed(e)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
