//! Kickscope Core Type Definitions

// =============================================================================
// ID Types
// =============================================================================

/// Backend-assigned analysis identifier (opaque)
pub type AnalysisId = String;

/// Local session identifier (ULID), used to correlate log lines
pub type SessionId = String;

/// Generates a new session identifier
pub fn new_session_id() -> SessionId {
    ulid::Ulid::new().to_string()
}

// =============================================================================
// Progress
// =============================================================================

/// Completion percentage reported by the backend (0-100)
pub type Percent = u8;

/// Converts a raw backend progress value into a percentage.
///
/// Non-finite values are dropped; everything else is rounded and clamped.
pub fn normalize_progress(raw: f64) -> Option<Percent> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as Percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 26);
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_progress() {
        assert_eq!(normalize_progress(40.0), Some(40));
        assert_eq!(normalize_progress(39.6), Some(40));
        assert_eq!(normalize_progress(-3.0), Some(0));
        assert_eq!(normalize_progress(250.0), Some(100));
        assert_eq!(normalize_progress(f64::NAN), None);
        assert_eq!(normalize_progress(f64::INFINITY), None);
    }
}
