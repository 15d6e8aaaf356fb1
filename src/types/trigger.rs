//! Trigger events and dwell progress emitted by the dwell trigger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two discrete triggers the dwell controller can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Begin recording
    Start,
    /// End recording
    Stop,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerKind::Start => "START",
            TriggerKind::Stop => "STOP",
        };
        write!(f, "{}", name)
    }
}

/// Reason codes for dwell ticks and trigger decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum TriggerReason {
    // =========================================================================
    // T0xx: Per-observation dwell state
    // =========================================================================
    /// Neither dwell window is accumulating
    T001_IDLE,
    /// Start condition holding, dwell filling
    T002_START_ACCUMULATING,
    /// Start condition lost before confirmation, window reset to zero
    T003_START_RESET,
    /// Start dwell complete but cooldown still running, holding at 1
    T004_START_HELD_COOLDOWN,
    /// Stop condition holding, dwell filling
    T005_STOP_ACCUMULATING,
    /// Stop condition lost before confirmation, window reset to zero
    T006_STOP_RESET,

    // =========================================================================
    // T1xx: Start trigger
    // =========================================================================
    /// Start dwell held for the full window, trigger fired
    T101_START_CONFIRMED,

    // =========================================================================
    // T2xx: Stop trigger
    // =========================================================================
    /// Stop dwell held for the full window, trigger fired
    T201_STOP_CONFIRMED,
    /// Stop dwell fed by total detection loss rather than the stop predicate
    T202_STOP_ON_DETECTION_LOSS,
}

impl TriggerReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::T001_IDLE => "T001_IDLE",
            Self::T002_START_ACCUMULATING => "T002_START_ACCUMULATING",
            Self::T003_START_RESET => "T003_START_RESET",
            Self::T004_START_HELD_COOLDOWN => "T004_START_HELD_COOLDOWN",
            Self::T005_STOP_ACCUMULATING => "T005_STOP_ACCUMULATING",
            Self::T006_STOP_RESET => "T006_STOP_RESET",
            Self::T101_START_CONFIRMED => "T101_START_CONFIRMED",
            Self::T201_STOP_CONFIRMED => "T201_STOP_CONFIRMED",
            Self::T202_STOP_ON_DETECTION_LOSS => "T202_STOP_ON_DETECTION_LOSS",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::T001_IDLE => "No dwell accumulating",
            Self::T002_START_ACCUMULATING => "Start dwell filling",
            Self::T003_START_RESET => "Start dwell reset",
            Self::T004_START_HELD_COOLDOWN => "Start dwell held by cooldown",
            Self::T005_STOP_ACCUMULATING => "Stop dwell filling",
            Self::T006_STOP_RESET => "Stop dwell reset",
            Self::T101_START_CONFIRMED => "Start trigger confirmed",
            Self::T201_STOP_CONFIRMED => "Stop trigger confirmed",
            Self::T202_STOP_ON_DETECTION_LOSS => "Stop confirmed after detection loss",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// A confirmed trigger, ready to feed into the session state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Start or Stop
    pub kind: TriggerKind,
    /// When the dwell window completed
    pub timestamp: DateTime<Utc>,
    /// Why the trigger fired
    pub reason: TriggerReason,
}

impl TriggerEvent {
    pub fn new(kind: TriggerKind, reason: TriggerReason) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            reason,
        }
    }
}

/// Continuous dwell feedback, published on every observation
///
/// Decoupled from the trigger decision so a UI can animate fill rings
/// without waiting for confirmations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TriggerProgress {
    /// Start dwell fill, 0.0-1.0
    pub start_progress: f64,
    /// Stop dwell fill, 0.0-1.0
    pub stop_progress: f64,
    /// Is the start window accumulating?
    pub start_active: bool,
    /// Is the stop window accumulating?
    pub stop_active: bool,
}

impl TriggerProgress {
    /// Both windows idle
    pub fn idle() -> Self {
        Self {
            start_progress: 0.0,
            stop_progress: 0.0,
            start_active: false,
            stop_active: false,
        }
    }
}

impl Default for TriggerProgress {
    fn default() -> Self {
        Self::idle()
    }
}
