//! Detection results delivered by the detector worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One detection outcome for one analyzed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// When the detection was produced
    pub timestamp: DateTime<Utc>,
    /// Was any subject detected at all?
    pub detected: bool,
    /// "Ready to start" predicate (full subject visible)
    pub primary_condition_met: bool,
    /// "Should stop" predicate (subject half lost)
    pub stop_condition_met: bool,
    /// Detector confidence, clamped to 0.0-1.0
    pub confidence: f64,
}

impl DetectionResult {
    /// Create a detection stamped with the current time
    pub fn new(detected: bool, primary: bool, stop: bool, confidence: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            detected,
            primary_condition_met: primary,
            stop_condition_met: stop,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// No subject in frame
    pub fn absent() -> Self {
        Self::new(false, false, false, 0.0)
    }

    /// Subject fully visible (start condition holds)
    pub fn subject_visible(confidence: f64) -> Self {
        Self::new(true, true, false, confidence)
    }

    /// Subject present but leaving the frame (stop condition holds)
    pub fn subject_leaving(confidence: f64) -> Self {
        Self::new(true, false, true, confidence)
    }
}

/// Lifecycle notices from the detector bridge, out of band from detections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorEvent {
    /// Worker answered the initial ping
    Ready,
    /// Worker exited cleanly
    Stopped,
    /// Worker failed; detections will no longer arrive
    Fatal { message: String },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(DetectionResult::new(true, true, false, 1.7).confidence, 1.0);
        assert_eq!(DetectionResult::new(true, true, false, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_absent_satisfies_no_condition() {
        let d = DetectionResult::absent();
        assert!(!d.detected);
        assert!(!d.primary_condition_met);
        assert!(!d.stop_condition_met);
    }
}
