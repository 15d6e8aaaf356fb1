//! Dwell trigger: detection results in, start/stop recording triggers out
//!
//! A condition must hold continuously for the full dwell window before its
//! trigger confirms; any interruption resets the window to zero. Start
//! triggers are additionally gated by a cooldown measured from the previous
//! start. Stop triggers are not cooldown-gated.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::types::{DetectionResult, TriggerEvent, TriggerKind, TriggerProgress, TriggerReason};
use crate::{COOLDOWN_MS, DWELL_TIME_MS};

/// Tunables for the dwell trigger
#[derive(Debug, Clone, Copy)]
pub struct DwellConfig {
    /// Continuous hold required before a trigger confirms
    pub dwell: Duration,
    /// Minimum gap after a start trigger before the next start may fire
    pub cooldown: Duration,
    /// Treat total detection loss as the stop condition while recording
    pub stop_on_detection_loss: bool,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(DWELL_TIME_MS),
            cooldown: Duration::from_millis(COOLDOWN_MS),
            stop_on_detection_loss: true,
        }
    }
}

/// One dwell window: tracks how long its condition has held
///
/// Progress is always derived from `held_since`, never stored.
#[derive(Debug, Clone, Copy)]
struct DwellWindow {
    held_since: Option<Instant>,
}

impl DwellWindow {
    fn idle() -> Self {
        Self { held_since: None }
    }

    fn active(&self) -> bool {
        self.held_since.is_some()
    }

    /// Fill fraction at `now`, capped at 1.0
    fn progress(&self, now: Instant, dwell: Duration) -> f64 {
        match self.held_since {
            Some(since) => {
                let held = now.duration_since(since).as_secs_f64();
                (held / dwell.as_secs_f64()).min(1.0)
            }
            None => 0.0,
        }
    }

    /// Mark the condition as holding; keeps the original start on repeat calls
    fn hold(&mut self, now: Instant) {
        if self.held_since.is_none() {
            self.held_since = Some(now);
        }
    }

    fn reset(&mut self) {
        self.held_since = None;
    }
}

/// Result of one observation
#[derive(Debug, Clone)]
pub struct DwellOutput {
    /// Confirmed trigger, if this observation completed a window
    pub trigger: Option<TriggerEvent>,
    /// Dwell feedback after the observation
    pub progress: TriggerProgress,
    /// What this observation did to the dwell state
    pub reason: TriggerReason,
}

/// Dwell-confirmation engine
#[derive(Debug)]
pub struct DwellTrigger {
    config: DwellConfig,
    /// Window for the "ready to start" condition, runs while not recording
    start: DwellWindow,
    /// Window for the "should stop" condition, runs while recording
    stop: DwellWindow,
    /// When the last start trigger fired
    last_trigger_at: Option<Instant>,
    /// Mirrors the session: suppresses start accumulation during recording
    recording_active: bool,
    /// Number of observations processed
    observation_count: u64,
}

impl Default for DwellTrigger {
    fn default() -> Self {
        Self::new(DwellConfig::default())
    }
}

impl DwellTrigger {
    pub fn new(config: DwellConfig) -> Self {
        Self {
            config,
            start: DwellWindow::idle(),
            stop: DwellWindow::idle(),
            last_trigger_at: None,
            recording_active: false,
            observation_count: 0,
        }
    }

    /// Feed one detection, stamped with the current time
    pub fn observe(&mut self, result: &DetectionResult) -> DwellOutput {
        self.observe_at(result, Instant::now())
    }

    /// Feed one detection at an explicit instant
    ///
    /// All dwell arithmetic happens here; `observe` is a thin wrapper, so
    /// tests drive the engine with synthetic clocks instead of sleeping.
    pub fn observe_at(&mut self, result: &DetectionResult, now: Instant) -> DwellOutput {
        self.observation_count += 1;

        let (trigger, reason) = if self.recording_active {
            self.start.reset();
            self.observe_stop(result, now)
        } else {
            self.stop.reset();
            self.observe_start(result, now)
        };

        if let Some(ref event) = trigger {
            info!(
                kind = %event.kind,
                reason = event.reason.code(),
                "trigger confirmed"
            );
        }

        DwellOutput {
            trigger,
            progress: self.snapshot(now),
            reason,
        }
    }

    /// Start path: fills while the primary condition holds, fires once the
    /// window completes and the cooldown has cleared
    fn observe_start(
        &mut self,
        result: &DetectionResult,
        now: Instant,
    ) -> (Option<TriggerEvent>, TriggerReason) {
        let qualifies = result.detected && result.primary_condition_met;

        if !qualifies {
            if self.start.active() {
                debug!("start dwell reset");
                self.start.reset();
                return (None, TriggerReason::T003_START_RESET);
            }
            return (None, TriggerReason::T001_IDLE);
        }

        self.start.hold(now);
        if self.start.progress(now, self.config.dwell) < 1.0 {
            return (None, TriggerReason::T002_START_ACCUMULATING);
        }

        if !self.cooldown_clear(now) {
            // Window complete but blocked; holds at 1 until the condition
            // is lost or the cooldown expires
            return (None, TriggerReason::T004_START_HELD_COOLDOWN);
        }

        self.last_trigger_at = Some(now);
        self.start.reset();
        let event = TriggerEvent::new(TriggerKind::Start, TriggerReason::T101_START_CONFIRMED);
        (Some(event), TriggerReason::T101_START_CONFIRMED)
    }

    /// Stop path: same window mechanics, no cooldown
    fn observe_stop(
        &mut self,
        result: &DetectionResult,
        now: Instant,
    ) -> (Option<TriggerEvent>, TriggerReason) {
        let lost = !result.detected && self.config.stop_on_detection_loss;
        let qualifies = (result.detected && result.stop_condition_met) || lost;

        if !qualifies {
            if self.stop.active() {
                debug!("stop dwell reset");
                self.stop.reset();
                return (None, TriggerReason::T006_STOP_RESET);
            }
            return (None, TriggerReason::T001_IDLE);
        }

        self.stop.hold(now);
        if self.stop.progress(now, self.config.dwell) < 1.0 {
            return (None, TriggerReason::T005_STOP_ACCUMULATING);
        }

        self.stop.reset();
        let reason = if lost {
            TriggerReason::T202_STOP_ON_DETECTION_LOSS
        } else {
            TriggerReason::T201_STOP_CONFIRMED
        };
        let event = TriggerEvent::new(TriggerKind::Stop, reason);
        (Some(event), reason)
    }

    /// True when enough time has passed since the last start trigger
    fn cooldown_clear(&self, now: Instant) -> bool {
        match self.last_trigger_at {
            Some(at) => now.duration_since(at) > self.config.cooldown,
            None => true,
        }
    }

    /// Dwell feedback at `now`, without consuming an observation
    pub fn snapshot(&self, now: Instant) -> TriggerProgress {
        TriggerProgress {
            start_progress: self.start.progress(now, self.config.dwell),
            stop_progress: self.stop.progress(now, self.config.dwell),
            start_active: self.start.active(),
            stop_active: self.stop.active(),
        }
    }

    /// Inform the engine the session entered or left recording
    ///
    /// Both windows reset so no partial fill survives a mode change.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording_active = recording;
        self.start.reset();
        self.stop.reset();
    }

    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    /// Is the start path currently blocked by the cooldown?
    pub fn in_cooldown(&self, now: Instant) -> bool {
        !self.cooldown_clear(now)
    }

    /// Clear both windows without touching the cooldown clock
    ///
    /// The cooldown outlives stream churn; a stop-live/start-live cycle
    /// must not re-arm an immediate start.
    pub fn reset_windows(&mut self) {
        self.start.reset();
        self.stop.reset();
    }
}

// =============================================================================
// TESTS
// =============================================================================
