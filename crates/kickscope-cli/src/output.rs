//! Terminal output: human-readable text or one JSON document per line.

use std::path::Path;

use serde::Serialize;
use serde_json::json;

use kickscope_core::core::analysis::{render_results, render_status, ResultsView, StatusView};
use kickscope_core::{AnalysisEvent, AnalysisResults, AnalysisStatus, AnalysisTicket, ClientSettings};

/// Prints command output to stdout and alerts to stderr
#[derive(Debug, Default)]
pub struct Output {
    json: bool,
    last_status: Option<String>,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            last_status: None,
        }
    }

    fn print_json(value: &impl Serialize) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("error: failed to encode output: {}", e),
        }
    }

    pub fn ticket(&self, ticket: &AnalysisTicket) {
        if self.json {
            Self::print_json(&json!({ "event": "submitted", "ticket": ticket }));
        } else {
            println!("Analysis started: {}", ticket.analysis_id);
        }
    }

    /// Prints a status, skipping repeats of the same text
    pub fn status(&mut self, status: &AnalysisStatus) {
        if self.json {
            Self::print_json(&json!({ "event": "status", "status": StatusView::from(status) }));
            return;
        }

        let text = render_status(status);
        if self.last_status.as_deref() != Some(text.as_str()) {
            println!("{}", text);
            self.last_status = Some(text);
        }
    }

    pub fn event(&mut self, event: &AnalysisEvent) {
        match event {
            AnalysisEvent::StatusUpdated { status, .. } => self.status(status),
            // Retries are logged at warn level; only JSON output repeats them.
            AnalysisEvent::RetryScheduled { .. } => {
                if self.json {
                    Self::print_json(event);
                }
            }
            AnalysisEvent::ResultsReady { .. } => {}
        }
    }

    pub fn results(&self, results: &AnalysisResults) {
        if self.json {
            Self::print_json(&json!({
                "event": "results",
                "results": results,
                "display": ResultsView::from(results),
            }));
        } else {
            print!("\n{}", render_results(results));
        }
    }

    pub fn settings(&self, settings: &ClientSettings, path: &Path) {
        if self.json {
            Self::print_json(&json!({
                "path": path.display().to_string(),
                "settings": settings,
            }));
        } else {
            println!("Settings file:      {}", path.display());
            println!("API URL:            {}", settings.api_url);
            println!("Poll interval:      {} ms", settings.poll_interval_ms);
            println!("Max status checks:  {}", settings.max_polls);
            println!("Transport retries:  {}", settings.transport_retries);
            println!("Request timeout:    {} s", settings.request_timeout_secs);
        }
    }

    pub fn message(&self, message: &str) {
        if self.json {
            Self::print_json(&json!({ "message": message }));
        } else {
            println!("{}", message);
        }
    }
}

/// User-visible alert
pub fn alert(message: &str) {
    eprintln!("error: {}", message);
}
