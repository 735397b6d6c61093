//! Display formatting for statuses and results.

use serde::Serialize;
use std::fmt::Write;

use super::models::{AnalysisResults, AnalysisStage, AnalysisStatus, MovementIntensity};
use crate::core::Percent;

/// Placeholder for a metric the backend did not report
pub const MISSING_VALUE: &str = "—";

const PROGRESS_BAR_WIDTH: usize = 20;

// =============================================================================
// Formatting Helpers
// =============================================================================

/// Status line shown to the user. No status yet renders as "Waiting...".
pub fn status_text(status: Option<&AnalysisStatus>) -> String {
    match status {
        None => "Waiting...".to_string(),
        Some(status) => match status.progress {
            Some(progress) if progress > 0 => {
                format!("{} ({}%)", status.stage.label(), progress)
            }
            _ => status.stage.label().to_string(),
        },
    }
}

/// Distance in whole meters, e.g. "1500 m"
pub fn format_distance(meters: Option<f64>) -> String {
    match meters.filter(|m| m.is_finite()) {
        Some(meters) => format!("{:.0} m", meters.round()),
        None => MISSING_VALUE.to_string(),
    }
}

/// Speed with one decimal, e.g. "12.3 px/s"
pub fn format_speed(pixels_per_sec: Option<f64>) -> String {
    match pixels_per_sec.filter(|s| s.is_finite()) {
        Some(speed) => format!("{:.1} px/s", speed),
        None => MISSING_VALUE.to_string(),
    }
}

pub fn format_intensity(intensity: Option<&MovementIntensity>) -> String {
    intensity
        .map(|i| i.to_string())
        .unwrap_or_else(|| MISSING_VALUE.to_string())
}

/// Text progress bar, e.g. "[########------------] 40%"
pub fn progress_bar(progress: Percent) -> String {
    let progress = progress.min(100);
    let filled = PROGRESS_BAR_WIDTH * progress as usize / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled),
        progress
    )
}

// =============================================================================
// Views
// =============================================================================

/// Status as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    /// Wire value, e.g. `processing`
    pub stage: AnalysisStage,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Percent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AnalysisStatus> for StatusView {
    fn from(status: &AnalysisStatus) -> Self {
        Self {
            stage: status.stage,
            text: status_text(Some(status)),
            progress: status.progress.filter(|p| *p > 0),
            error: status
                .stage
                .is_terminal()
                .then(|| status.error.clone())
                .flatten(),
        }
    }
}

/// Results with every metric already formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub total_distance: String,
    pub average_speed: String,
    pub movement_intensity: String,
    pub suggestions: Vec<String>,
}

impl From<&AnalysisResults> for ResultsView {
    fn from(results: &AnalysisResults) -> Self {
        Self {
            total_distance: format_distance(results.metrics.total_distance_meters),
            average_speed: format_speed(results.metrics.average_speed_pixels_per_sec),
            movement_intensity: format_intensity(results.metrics.movement_intensity.as_ref()),
            suggestions: results.suggestions.clone(),
        }
    }
}

/// Status line, with a progress bar while work is reported
pub fn render_status(status: &AnalysisStatus) -> String {
    let mut out = status_text(Some(status));
    if let Some(progress) = status.progress.filter(|p| *p > 0 && !status.stage.is_terminal()) {
        let _ = write!(out, "\n{}", progress_bar(progress));
    }
    out
}

/// Results block with metrics and suggestions
pub fn render_results(results: &AnalysisResults) -> String {
    let view = ResultsView::from(results);
    let mut out = String::from("Performance Metrics\n");
    let _ = writeln!(out, "  Total Distance:     {}", view.total_distance);
    let _ = writeln!(out, "  Average Speed:      {}", view.average_speed);
    let _ = writeln!(out, "  Movement Intensity: {}", view.movement_intensity);

    if !view.suggestions.is_empty() {
        out.push_str("\nSuggestions\n");
        for suggestion in &view.suggestions {
            let _ = writeln!(out, "  • {}", suggestion);
        }
    }
    out
}
