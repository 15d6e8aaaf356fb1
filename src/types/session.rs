//! Session mode, session events, and transition verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four top-level operating modes of the kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    /// Nothing running, no stream held
    Idle,
    /// Streaming frames, watching for the start gesture
    Live,
    /// Streaming and persisting frames
    Record,
    /// Replaying a loaded sequence
    Playback,
}

impl SessionMode {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            SessionMode::Idle => "\x1b[90m",     // Gray
            SessionMode::Live => "\x1b[36m",     // Cyan
            SessionMode::Record => "\x1b[31m",   // Red
            SessionMode::Playback => "\x1b[32m", // Green
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for mode
    pub fn emoji(&self) -> &'static str {
        match self {
            SessionMode::Idle => "⏹",
            SessionMode::Live => "🎥",
            SessionMode::Record => "⏺",
            SessionMode::Playback => "▶",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionMode::Idle => "IDLE",
            SessionMode::Live => "LIVE",
            SessionMode::Record => "RECORD",
            SessionMode::Playback => "PLAYBACK",
        };
        write!(f, "{}", name)
    }
}

/// Everything that can ask the session machine to change mode
///
/// User commands and dwell triggers flow through the same transition
/// table, so a gesture-confirmed start behaves exactly like a button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    StartLive,
    StopLive,
    StartRecord,
    StopRecord,
    StartPlayback,
    StopPlayback,
    /// Dwell trigger: start recording
    TriggerStart,
    /// Dwell trigger: stop recording
    TriggerStop,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionEvent::StartLive => "START_LIVE",
            SessionEvent::StopLive => "STOP_LIVE",
            SessionEvent::StartRecord => "START_RECORD",
            SessionEvent::StopRecord => "STOP_RECORD",
            SessionEvent::StartPlayback => "START_PLAYBACK",
            SessionEvent::StopPlayback => "STOP_PLAYBACK",
            SessionEvent::TriggerStart => "TRIGGER_START",
            SessionEvent::TriggerStop => "TRIGGER_STOP",
        };
        write!(f, "{}", name)
    }
}

/// Side effect the controller must run before committing a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    /// No-op transition, nothing to do
    None,
    /// Acquire the live stream
    AcquireStream,
    /// Release the live stream
    ReleaseStream,
    /// Open a recording writer, stream continues
    BeginPersisting,
    /// Close the recording writer and load its sequence for replay
    EndPersistingAndLoad,
    /// Load the most recent stored sequence
    LoadMostRecent,
    /// Drop the loaded sequence and stop the player
    ReleaseSequence,
}

/// Reason codes for session transitions and rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum SessionReason {
    // =========================================================================
    // S1xx: Committed transitions
    // =========================================================================
    /// Entered LIVE, stream acquired
    S101_LIVE_STARTED,
    /// Returned to IDLE from LIVE
    S102_LIVE_STOPPED,
    /// Entered RECORD, frames persisting
    S103_RECORD_STARTED,
    /// Recording closed, sequence loaded for replay
    S104_RECORD_STOPPED,
    /// Entered PLAYBACK from a stored sequence
    S105_PLAYBACK_STARTED,
    /// Playback released, returned to IDLE
    S106_PLAYBACK_STOPPED,

    // =========================================================================
    // S3xx: Rejections
    // =========================================================================
    /// Event has no transition from the current mode
    S301_NOT_APPLICABLE,

    // =========================================================================
    // S4xx: Failed side effects
    // =========================================================================
    /// No stored recording to play
    S401_NO_RECORDING_FOUND,
    /// Stream could not be acquired, staying IDLE
    S402_STREAM_UNAVAILABLE,
    /// Recording writer could not be opened, staying LIVE
    S403_RECORDING_START_FAILED,
    /// Recorded sequence failed to load, reverting to IDLE
    S404_SEQUENCE_LOAD_FAILED,
}

impl SessionReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::S101_LIVE_STARTED => "S101_LIVE_STARTED",
            Self::S102_LIVE_STOPPED => "S102_LIVE_STOPPED",
            Self::S103_RECORD_STARTED => "S103_RECORD_STARTED",
            Self::S104_RECORD_STOPPED => "S104_RECORD_STOPPED",
            Self::S105_PLAYBACK_STARTED => "S105_PLAYBACK_STARTED",
            Self::S106_PLAYBACK_STOPPED => "S106_PLAYBACK_STOPPED",
            Self::S301_NOT_APPLICABLE => "S301_NOT_APPLICABLE",
            Self::S401_NO_RECORDING_FOUND => "S401_NO_RECORDING_FOUND",
            Self::S402_STREAM_UNAVAILABLE => "S402_STREAM_UNAVAILABLE",
            Self::S403_RECORDING_START_FAILED => "S403_RECORDING_START_FAILED",
            Self::S404_SEQUENCE_LOAD_FAILED => "S404_SEQUENCE_LOAD_FAILED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::S101_LIVE_STARTED => "Live view started",
            Self::S102_LIVE_STOPPED => "Live view stopped",
            Self::S103_RECORD_STARTED => "Recording started",
            Self::S104_RECORD_STOPPED => "Recording stopped, replay ready",
            Self::S105_PLAYBACK_STARTED => "Playback started",
            Self::S106_PLAYBACK_STOPPED => "Playback stopped",
            Self::S301_NOT_APPLICABLE => "Event not applicable in current mode",
            Self::S401_NO_RECORDING_FOUND => "No recording found",
            Self::S402_STREAM_UNAVAILABLE => "Stream unavailable",
            Self::S403_RECORDING_START_FAILED => "Could not start recording",
            Self::S404_SEQUENCE_LOAD_FAILED => "Could not load recorded frames",
        }
    }

    /// Does this reason describe a failed side effect?
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::S401_NO_RECORDING_FOUND
                | Self::S402_STREAM_UNAVAILABLE
                | Self::S403_RECORDING_START_FAILED
                | Self::S404_SEQUENCE_LOAD_FAILED
        )
    }
}

impl std::fmt::Display for SessionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Outcome of running one event through the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Mode to commit once the action succeeds
    pub next: SessionMode,
    /// Side effect required before committing
    pub action: TransitionAction,
    /// Commit reason, or S301 for a no-op
    pub reason: SessionReason,
}

impl Verdict {
    pub fn accepted(next: SessionMode, action: TransitionAction, reason: SessionReason) -> Self {
        Self { next, action, reason }
    }

    /// The event does nothing in the current mode
    pub fn noop(current: SessionMode) -> Self {
        Self {
            next: current,
            action: TransitionAction::None,
            reason: SessionReason::S301_NOT_APPLICABLE,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == TransitionAction::None
    }
}

/// Committed mode change, published on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChange {
    pub from: SessionMode,
    pub to: SessionMode,
    pub reason: SessionReason,
    pub timestamp: DateTime<Utc>,
}

impl ModeChange {
    pub fn new(from: SessionMode, to: SessionMode, reason: SessionReason) -> Self {
        Self {
            from,
            to,
            reason,
            timestamp: Utc::now(),
        }
    }
}
