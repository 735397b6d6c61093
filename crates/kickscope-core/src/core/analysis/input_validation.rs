//! Input normalization and validation for analysis submissions.
//!
//! Everything here runs before any network I/O, so a rejected input never
//! reaches the backend.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::models::VideoUpload;
use crate::core::{CoreError, CoreResult};

/// Largest file accepted for upload (4 GiB)
pub const MAX_UPLOAD_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Video extensions accepted for upload, with their MIME types
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("3gp", "video/3gpp"),
];

fn youtube_host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?:www|m|music)\.)?youtube\.com$|^youtu\.be$")
            .expect("static YouTube host pattern is valid")
    })
}

/// Validate and normalize the analysis backend base URL.
///
/// - Requires http/https
/// - Trims whitespace
/// - Removes trailing slash
pub fn validate_base_url(url: &str) -> CoreResult<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(
            "API URL cannot be empty".to_string(),
        ));
    }

    let parsed = reqwest::Url::parse(trimmed).map_err(|e| {
        CoreError::ValidationError(format!("Invalid API URL '{}': {}", trimmed, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_string()),
        scheme => Err(CoreError::ValidationError(format!(
            "Invalid API URL scheme '{}'. Use http or https.",
            scheme
        ))),
    }
}

/// Validate a YouTube URL entered by the user and return it trimmed.
pub fn validate_youtube_url(url: &str) -> CoreResult<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::EmptySubmission(
            "Please enter a YouTube URL.".to_string(),
        ));
    }

    let parsed = reqwest::Url::parse(trimmed).map_err(|e| {
        CoreError::ValidationError(format!("Invalid YouTube URL '{}': {}", trimmed, e))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::ValidationError(format!(
            "Invalid YouTube URL scheme '{}'. Use http or https.",
            parsed.scheme()
        )));
    }

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if !youtube_host_pattern().is_match(&host) {
        return Err(CoreError::ValidationError(format!(
            "'{}' is not a YouTube URL",
            trimmed
        )));
    }

    Ok(trimmed.to_string())
}

/// MIME type for a video file extension, if the extension is accepted.
pub fn video_mime_type(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Check a selected file and describe it for upload.
pub fn prepare_video_upload(path: &Path) -> CoreResult<VideoUpload> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.display().to_string()),
        _ => CoreError::IoError(e),
    })?;

    if !metadata.is_file() {
        return Err(CoreError::ValidationError(format!(
            "'{}' is not a file",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let mime_type = video_mime_type(extension).ok_or_else(|| {
        CoreError::ValidationError(format!(
            "'{}' is not a supported video file",
            path.display()
        ))
    })?;

    let size_bytes = metadata.len();
    if size_bytes == 0 {
        return Err(CoreError::ValidationError(format!(
            "'{}' is empty",
            path.display()
        )));
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(CoreError::ValidationError(format!(
            "'{}' is too large ({} bytes > {} bytes limit)",
            path.display(),
            size_bytes,
            MAX_UPLOAD_BYTES
        )));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());

    Ok(VideoUpload {
        path: path.to_path_buf(),
        file_name,
        mime_type: mime_type.to_string(),
        size_bytes,
    })
}
