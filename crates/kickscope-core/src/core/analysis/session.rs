//! Analysis Session
//!
//! The client-side state store ([`AnalysisSession`]) and the controller that
//! drives submissions and polling against it ([`AnalysisController`]).
//!
//! The session is owned by the controller and only mutated from the task that
//! owns the controller; polling tasks talk to it through an event channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, info_span, Instrument};

use super::backend::AnalysisBackend;
use super::input_validation::{prepare_video_upload, validate_youtube_url};
use super::models::{AnalysisRequest, AnalysisResults, AnalysisStatus, AnalysisTicket};
use super::poller::{AnalysisEvent, PollHandle, PollOutcome, PollerConfig, StatusPoller};
use crate::core::{new_session_id, AnalysisId, CoreError, CoreResult, SessionId};

// =============================================================================
// AnalysisSession
// =============================================================================

/// Client state for one user session
#[derive(Debug, Clone, Default)]
pub struct AnalysisSession {
    session_id: SessionId,
    selected_file: Option<PathBuf>,
    youtube_url: String,
    ticket: Option<AnalysisTicket>,
    status: Option<AnalysisStatus>,
    results: Option<AnalysisResults>,
    busy: bool,
    alert: Option<String>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self {
            session_id: new_session_id(),
            ..Default::default()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Selects a video file. Clears the previous status and results.
    pub fn select_file(&mut self, path: impl Into<PathBuf>) {
        self.selected_file = Some(path.into());
        self.status = None;
        self.results = None;
    }

    pub fn selected_file(&self) -> Option<&Path> {
        self.selected_file.as_deref()
    }

    pub fn set_youtube_url(&mut self, url: impl Into<String>) {
        self.youtube_url = url.into();
    }

    pub fn youtube_url(&self) -> &str {
        &self.youtube_url
    }

    pub fn ticket(&self) -> Option<&AnalysisTicket> {
        self.ticket.as_ref()
    }

    pub fn status(&self) -> Option<&AnalysisStatus> {
        self.status.as_ref()
    }

    pub fn results(&self) -> Option<&AnalysisResults> {
        self.results.as_ref()
    }

    /// Whether an analysis is being submitted or followed
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Last alert raised, if any
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    /// Raises a user-visible alert
    pub fn raise_alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(session = %self.session_id, "Alert: {}", message);
        self.alert = Some(message);
    }

    /// Enters the busy state for a new analysis, discarding the previous one
    fn start(&mut self) {
        self.busy = true;
        self.ticket = None;
        self.status = None;
        self.results = None;
        self.alert = None;
    }

    /// Records an accepted submission
    fn begin(&mut self, ticket: &AnalysisTicket) {
        self.status = Some(AnalysisStatus::new(ticket.stage));
        self.ticket = Some(ticket.clone());
    }

    /// Applies a polling event
    pub fn apply(&mut self, event: &AnalysisEvent) {
        match event {
            AnalysisEvent::StatusUpdated { status, .. } => {
                self.status = Some(status.clone());
            }
            AnalysisEvent::ResultsReady { results, .. } => {
                self.results = Some(results.clone());
            }
            AnalysisEvent::RetryScheduled { .. } => {}
        }
    }

    /// Records how polling ended and clears the busy flag
    pub fn finish(&mut self, outcome: &PollOutcome) {
        self.busy = false;
        match outcome {
            PollOutcome::Completed(results) => {
                self.results = Some(results.clone());
            }
            PollOutcome::Failed(message) => {
                self.raise_alert(format!("Analysis failed: {}", message));
            }
            PollOutcome::TransportFailed(error) => {
                self.raise_alert(format!("Could not check the analysis status. {}", error));
            }
            PollOutcome::TimedOut { polls } => {
                self.raise_alert(format!(
                    "The analysis did not finish after {} status checks.",
                    polls
                ));
            }
            PollOutcome::Cancelled => {}
        }
    }

    /// Records a failed submission and clears the busy flag
    fn fail(&mut self, error: &CoreError) {
        self.busy = false;
        self.raise_alert(submission_alert(error));
    }
}

fn submission_alert(error: &CoreError) -> String {
    match error {
        CoreError::Transport(_) | CoreError::Rejected { .. } | CoreError::MalformedResponse(_) => {
            format!(
                "Could not reach the analysis server. Check that the API URL is correct. ({})",
                error
            )
        }
        other => other.to_string(),
    }
}

// =============================================================================
// AnalysisController
// =============================================================================

/// Progress reported by [`AnalysisController::next_update`]
#[derive(Debug)]
pub enum SessionUpdate {
    /// A polling event, already applied to the session
    Event(AnalysisEvent),
    /// Polling ended; the session is no longer busy
    Finished(PollOutcome),
}

/// Submits analyses and follows them, keeping the session up to date.
///
/// At most one polling task is active; dropping the controller cancels it.
pub struct AnalysisController {
    backend: Arc<dyn AnalysisBackend>,
    poller: StatusPoller,
    session: AnalysisSession,
    active: Option<ActivePoll>,
}

#[derive(Debug)]
struct ActivePoll {
    handle: PollHandle,
    events: mpsc::UnboundedReceiver<AnalysisEvent>,
}

impl std::fmt::Debug for AnalysisController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisController")
            .field("base_url", &self.backend.base_url())
            .field("session", &self.session)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl AnalysisController {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: PollerConfig) -> Self {
        let session = AnalysisSession::new();
        Self {
            poller: StatusPoller::new(Arc::clone(&backend), config)
                .with_session_id(session.session_id.clone()),
            backend,
            session,
            active: None,
        }
    }

    pub fn session(&self) -> &AnalysisSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AnalysisSession {
        &mut self.session
    }

    /// Whether a polling task is running
    pub fn is_polling(&self) -> bool {
        self.active.is_some()
    }

    /// Uploads the selected file and starts polling
    pub async fn submit_file(&mut self) -> CoreResult<AnalysisTicket> {
        let request = match self.session.selected_file.clone() {
            None => Err(CoreError::EmptySubmission(
                "Please select a video file.".to_string(),
            )),
            Some(path) => prepare_video_upload(&path).map(AnalysisRequest::Upload),
        };
        self.submit(request).await
    }

    /// Submits the entered YouTube URL and starts polling
    pub async fn submit_youtube(&mut self) -> CoreResult<AnalysisTicket> {
        let request = validate_youtube_url(&self.session.youtube_url)
            .map(|url| AnalysisRequest::YouTube { url });
        self.submit(request).await
    }

    async fn submit(
        &mut self,
        request: CoreResult<AnalysisRequest>,
    ) -> CoreResult<AnalysisTicket> {
        if self.session.is_busy() {
            return Err(CoreError::Busy);
        }

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                self.session.raise_alert(e.to_string());
                return Err(e);
            }
        };

        self.session.start();
        let span = info_span!(
            "submit",
            session = %self.session.session_id,
            analysis_id = tracing::field::Empty
        );
        let backend = Arc::clone(&self.backend);
        let reply = async {
            match &request {
                AnalysisRequest::Upload(upload) => {
                    info!("Submitting {} for analysis", upload.file_name);
                    backend.submit_upload(upload).await
                }
                AnalysisRequest::YouTube { url } => {
                    info!("Submitting {} for analysis", url);
                    backend.submit_youtube(url).await
                }
            }
        }
        .instrument(span.clone())
        .await;

        match reply {
            Ok(analysis_id) => {
                span.record("analysis_id", analysis_id.as_str());
                let ticket = AnalysisTicket::new(
                    analysis_id,
                    request.initial_stage(),
                    self.session.session_id.clone(),
                );
                self.session.begin(&ticket);
                self.start_polling(ticket.analysis_id.clone());
                Ok(ticket)
            }
            Err(e) => {
                self.session.fail(&e);
                Err(e)
            }
        }
    }

    /// Follows an analysis submitted earlier
    pub fn watch(&mut self, analysis_id: impl Into<AnalysisId>) -> CoreResult<()> {
        if self.session.is_busy() {
            return Err(CoreError::Busy);
        }

        let analysis_id = analysis_id.into();
        if analysis_id.trim().is_empty() {
            let error = CoreError::EmptySubmission("Please enter an analysis id.".to_string());
            self.session.raise_alert(error.to_string());
            return Err(error);
        }

        self.session.start();
        self.start_polling(analysis_id);
        Ok(())
    }

    fn start_polling(&mut self, analysis_id: AnalysisId) {
        self.cancel_active();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.poller.spawn(analysis_id, tx);
        self.active = Some(ActivePoll { handle, events: rx });
    }

    fn cancel_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.cancel();
        }
    }

    /// Stops following the current analysis and clears the busy flag
    pub fn cancel(&mut self) {
        if let Some(active) = &self.active {
            info!("Cancelling analysis {}", active.handle.analysis_id());
        }
        self.cancel_active();
        self.session.finish(&PollOutcome::Cancelled);
    }

    /// Waits for the next polling update and applies it to the session.
    ///
    /// Returns `None` when nothing is being polled.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let active = self.active.as_mut()?;

        if let Some(event) = active.events.recv().await {
            self.session.apply(&event);
            return Some(SessionUpdate::Event(event));
        }

        // Channel closed: the polling task has ended.
        let active = self.active.take()?;
        let outcome = active.handle.join().await;
        self.session.finish(&outcome);
        Some(SessionUpdate::Finished(outcome))
    }

    /// Drives polling to the end and returns the results or the error that
    /// ended the analysis.
    pub async fn wait(&mut self) -> CoreResult<AnalysisResults> {
        loop {
            match self.next_update().await {
                Some(SessionUpdate::Event(_)) => continue,
                Some(SessionUpdate::Finished(outcome)) => return outcome.into_result(),
                None => {
                    return self
                        .session
                        .results()
                        .cloned()
                        .ok_or_else(|| CoreError::Internal("No analysis in progress".to_string()))
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::backend::ScriptedBackend;
    use crate::core::analysis::models::{AnalysisStage, PerformanceMetrics};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_config() -> PollerConfig {
        PollerConfig::default()
            .with_interval(Duration::from_millis(5))
            .with_transport_retries(0)
    }

    fn controller(backend: &Arc<ScriptedBackend>) -> AnalysisController {
        AnalysisController::new(backend.clone(), fast_config())
    }

    fn results_with_distance(distance: f64) -> AnalysisResults {
        AnalysisResults {
            metrics: PerformanceMetrics {
                total_distance_meters: Some(distance),
                ..Default::default()
            },
            suggestions: vec![],
        }
    }

    // =========================================================================
    // Session Tests
    // =========================================================================

    #[test]
    fn test_new_session_is_idle() {
        let session = AnalysisSession::new();
        assert!(!session.is_busy());
        assert!(session.status().is_none());
        assert!(session.results().is_none());
        assert!(!session.session_id().is_empty());
    }

    #[test]
    fn test_select_file_clears_previous_analysis() {
        let mut session = AnalysisSession::new();
        session.status = Some(AnalysisStatus::new(AnalysisStage::Completed));
        session.results = Some(results_with_distance(10.0));

        session.select_file("match.mp4");

        assert_eq!(session.selected_file(), Some(Path::new("match.mp4")));
        assert!(session.status().is_none());
        assert!(session.results().is_none());
    }

    #[test]
    fn test_finish_failed_raises_alert_and_clears_busy() {
        let mut session = AnalysisSession::new();
        session.start();
        assert!(session.is_busy());

        session.finish(&PollOutcome::Failed("decode failed".to_string()));

        assert!(!session.is_busy());
        assert_eq!(session.alert(), Some("Analysis failed: decode failed"));
        assert_eq!(
            session.take_alert().as_deref(),
            Some("Analysis failed: decode failed")
        );
        assert!(session.alert().is_none());
    }

    // =========================================================================
    // Controller Tests
    // =========================================================================

    #[tokio::test]
    async fn test_empty_submission_issues_no_request() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let mut controller = controller(&backend);

        let err = controller.submit_file().await.unwrap_err();
        assert!(matches!(err, CoreError::EmptySubmission(_)));

        controller.session_mut().set_youtube_url("   ");
        let err = controller.submit_youtube().await.unwrap_err();
        assert!(matches!(err, CoreError::EmptySubmission(_)));

        assert_eq!(backend.submit_calls(), 0);
        assert_eq!(backend.status_calls(), 0);
        assert!(!controller.session().is_busy());
        assert!(controller.session().alert().is_some());
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_invalid_file_issues_no_request() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let mut controller = controller(&backend);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a video").unwrap();

        controller.session_mut().select_file(&path);
        assert!(controller.submit_file().await.is_err());
        assert_eq!(backend.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_youtube_submission_polls_returned_id() {
        let backend = Arc::new(
            ScriptedBackend::new("yt-42")
                .with_status(AnalysisStatus::new(AnalysisStage::Processing).with_progress(40))
                .with_status(AnalysisStatus::new(AnalysisStage::Completed))
                .with_results(Ok(results_with_distance(1500.2))),
        );
        let mut controller = controller(&backend);
        controller
            .session_mut()
            .set_youtube_url("https://www.youtube.com/watch?v=abc");

        let ticket = controller.submit_youtube().await.unwrap();
        assert_eq!(ticket.analysis_id, "yt-42");
        assert_eq!(ticket.stage, AnalysisStage::Downloading);
        assert!(controller.session().is_busy());
        assert_eq!(
            controller.session().status().map(|s| s.stage),
            Some(AnalysisStage::Downloading)
        );

        let results = controller.wait().await.unwrap();
        assert_eq!(results.metrics.total_distance_meters, Some(1500.2));
        assert!(!controller.session().is_busy());
        assert_eq!(controller.session().results(), Some(&results));
        assert_eq!(
            controller.session().status().map(|s| s.stage),
            Some(AnalysisStage::Completed)
        );
        assert_eq!(backend.submit_calls(), 1);
        assert_eq!(backend.status_calls(), 2);
        assert_eq!(backend.results_calls(), 1);
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_file_submission_starts_uploaded() {
        let backend = Arc::new(
            ScriptedBackend::new("up-1")
                .with_status(AnalysisStatus::new(AnalysisStage::Completed))
                .with_results(Ok(results_with_distance(3.0))),
        );
        let mut controller = controller(&backend);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match.mp4");
        std::fs::write(&path, b"video").unwrap();

        controller.session_mut().select_file(&path);
        let ticket = controller.submit_file().await.unwrap();

        assert_eq!(ticket.stage, AnalysisStage::Uploaded);
        assert!(controller.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_submission_failure_resets_busy() {
        let backend = Arc::new(
            ScriptedBackend::new("job-1")
                .with_submit_failure(CoreError::Transport("connection refused".to_string())),
        );
        let mut controller = controller(&backend);
        controller.session_mut().set_youtube_url("https://youtu.be/abc");

        let err = controller.submit_youtube().await.unwrap_err();

        assert!(matches!(err, CoreError::Transport(_)));
        assert!(!controller.session().is_busy());
        assert!(controller
            .session()
            .alert()
            .unwrap()
            .contains("Check that the API URL is correct"));
        assert!(!controller.is_polling());
        assert_eq!(backend.submit_calls(), 1);
        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_analysis_error_surfaces_alert() {
        let backend = Arc::new(ScriptedBackend::new("job-1").with_status(
            AnalysisStatus::new(AnalysisStage::Error).with_error("decode failed"),
        ));
        let mut controller = controller(&backend);
        controller.session_mut().set_youtube_url("https://youtu.be/abc");
        controller.submit_youtube().await.unwrap();

        let err = controller.wait().await.unwrap_err();

        assert!(matches!(err, CoreError::AnalysisFailed(ref msg) if msg == "decode failed"));
        assert!(!controller.session().is_busy());
        assert_eq!(
            controller.session().alert(),
            Some("Analysis failed: decode failed")
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let mut controller = controller(&backend);
        controller.session_mut().set_youtube_url("https://youtu.be/abc");
        controller.submit_youtube().await.unwrap();

        let err = controller.submit_youtube().await.unwrap_err();

        assert!(matches!(err, CoreError::Busy));
        assert_eq!(backend.submit_calls(), 1);
        controller.cancel();
    }

    #[tokio::test]
    async fn test_cancel_clears_busy_and_stops_polling() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let mut controller = controller(&backend);
        controller.watch("job-1").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        controller.cancel();

        assert!(!controller.session().is_busy());
        assert!(!controller.is_polling());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.status_calls(), calls);
    }

    #[test]
    fn test_poller_carries_session_id() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let controller = controller(&backend);
        assert_eq!(
            controller.poller.session_id(),
            Some(controller.session().session_id())
        );
    }

    #[tokio::test]
    async fn test_next_update_without_poll_returns_none() {
        let backend = Arc::new(ScriptedBackend::new("job-1"));
        let mut controller = controller(&backend);
        assert!(controller.next_update().await.is_none());
        assert!(controller.watch("  ").is_err());
    }
}
