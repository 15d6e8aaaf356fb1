//! Integration tests for the dwell trigger
//!
//! Tests the full path: detection results → DwellTrigger → trigger events,
//! driven by explicit instants so nothing here sleeps.

use loopcam::core::{transition, DwellConfig, DwellTrigger};
use loopcam::types::{
    DetectionResult, SessionEvent, SessionMode, TriggerKind, TriggerReason,
};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn at(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms)
}

/// Drive one detection timeline and collect the confirmed triggers
fn run_timeline(
    trigger: &mut DwellTrigger,
    base: Instant,
    steps: &[(u64, DetectionResult)],
) -> Vec<(u64, TriggerKind, TriggerReason)> {
    let mut fired = Vec::new();
    for (ms, result) in steps {
        let output = trigger.observe_at(result, at(base, *ms));
        if let Some(event) = output.trigger {
            fired.push((*ms, event.kind, event.reason));
        }
    }
    fired
}

/// A subject walking up and holding still confirms exactly one start
#[test]
fn test_walkup_confirms_one_start() {
    let mut trigger = DwellTrigger::default();
    let base = Instant::now();

    let visible = DetectionResult::subject_visible(0.9);
    let steps: Vec<(u64, DetectionResult)> =
        (0..=2000).step_by(100).map(|ms| (ms, visible.clone())).collect();

    let fired = run_timeline(&mut trigger, base, &steps);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, 1000);
    assert_eq!(fired[0].1, TriggerKind::Start);
    assert_eq!(fired[0].2, TriggerReason::T101_START_CONFIRMED);
}

/// Someone walking through the frame never accumulates a full window
#[test]
fn test_walkthrough_never_fires() {
    let mut trigger = DwellTrigger::default();
    let base = Instant::now();

    let visible = DetectionResult::subject_visible(0.8);
    let absent = DetectionResult::absent();
    // Visible for 600ms, gone for 200ms, visible for 600ms, gone
    let steps = vec![
        (0, visible.clone()),
        (300, visible.clone()),
        (600, visible.clone()),
        (800, absent.clone()),
        (1000, visible.clone()),
        (1300, visible.clone()),
        (1600, visible.clone()),
        (1800, absent),
    ];

    let fired = run_timeline(&mut trigger, base, &steps);
    assert!(fired.is_empty(), "got {:?}", fired);
}

/// Progress climbs monotonically while holding and snaps to zero on loss
#[test]
fn test_progress_derivation() {
    let mut trigger = DwellTrigger::default();
    let base = Instant::now();
    let visible = DetectionResult::subject_visible(0.9);

    let p0 = trigger.observe_at(&visible, at(base, 0)).progress;
    assert_eq!(p0.start_progress, 0.0);

    let p500 = trigger.observe_at(&visible, at(base, 500)).progress;
    assert!((p500.start_progress - 0.5).abs() < 1e-9);

    let p750 = trigger.observe_at(&visible, at(base, 750)).progress;
    assert!((p750.start_progress - 0.75).abs() < 1e-9);

    let lost = trigger.observe_at(&DetectionResult::absent(), at(base, 760));
    assert_eq!(lost.progress.start_progress, 0.0);
    assert_eq!(lost.reason, TriggerReason::T003_START_RESET);
}

/// A start window completed during cooldown holds at full and fires later
#[test]
fn test_cooldown_holds_then_releases() {
    let config = DwellConfig {
        dwell: Duration::from_millis(1000),
        cooldown: Duration::from_millis(3000),
        stop_on_detection_loss: true,
    };
    let mut trigger = DwellTrigger::new(config);
    let base = Instant::now();
    let visible = DetectionResult::subject_visible(0.9);

    // First confirmation at 1000 starts the cooldown
    let steps: Vec<(u64, DetectionResult)> =
        (0..=1000).step_by(200).map(|ms| (ms, visible.clone())).collect();
    let fired = run_timeline(&mut trigger, base, &steps);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, 1000);

    // Subject keeps holding: window refills by 2000 but cannot fire while
    // now - 1000 <= 3000
    let held: Vec<(u64, DetectionResult)> =
        (1100..=4000).step_by(100).map(|ms| (ms, visible.clone())).collect();
    for (ms, result) in &held {
        let output = trigger.observe_at(result, at(base, *ms));
        assert!(output.trigger.is_none(), "fired early at {}ms", ms);
        if *ms >= 2100 {
            assert_eq!(output.reason, TriggerReason::T004_START_HELD_COOLDOWN);
            assert_eq!(output.progress.start_progress, 1.0);
        }
    }

    // Strictly past the cooldown boundary it finally releases
    let output = trigger.observe_at(&visible, at(base, 4100));
    assert_eq!(
        output.trigger.map(|e| e.kind),
        Some(TriggerKind::Start)
    );
}

/// While recording, the stop predicate and total loss both confirm a stop,
/// with distinct reasons
#[test]
fn test_stop_reasons() {
    let base = Instant::now();
    let leaving = DetectionResult::subject_leaving(0.6);
    let absent = DetectionResult::absent();

    let mut trigger = DwellTrigger::default();
    trigger.set_recording(true);
    let steps: Vec<(u64, DetectionResult)> =
        (0..=1000).step_by(250).map(|ms| (ms, leaving.clone())).collect();
    let fired = run_timeline(&mut trigger, base, &steps);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].2, TriggerReason::T201_STOP_CONFIRMED);

    let mut trigger = DwellTrigger::default();
    trigger.set_recording(true);
    let steps: Vec<(u64, DetectionResult)> =
        (0..=1000).step_by(250).map(|ms| (ms, absent.clone())).collect();
    let fired = run_timeline(&mut trigger, base, &steps);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].2, TriggerReason::T202_STOP_ON_DETECTION_LOSS);
}

/// With loss-stop disabled, only the explicit stop predicate counts
#[test]
fn test_detection_loss_configurable() {
    let config = DwellConfig {
        stop_on_detection_loss: false,
        ..DwellConfig::default()
    };
    let mut trigger = DwellTrigger::new(config);
    trigger.set_recording(true);
    let base = Instant::now();

    let absent = DetectionResult::absent();
    let steps: Vec<(u64, DetectionResult)> =
        (0..=2000).step_by(250).map(|ms| (ms, absent.clone())).collect();
    let fired = run_timeline(&mut trigger, base, &steps);
    assert!(fired.is_empty());
}

/// Confirmed triggers feed the transition table like user commands do
#[test]
fn test_triggers_drive_the_state_machine() {
    let mut trigger = DwellTrigger::default();
    let base = Instant::now();
    let visible = DetectionResult::subject_visible(0.9);

    let mut mode = SessionMode::Live;
    for ms in (0..=1000).step_by(100) {
        let output = trigger.observe_at(&visible, at(base, ms));
        if let Some(event) = output.trigger {
            assert_eq!(event.kind, TriggerKind::Start);
            let verdict = transition(mode, SessionEvent::TriggerStart);
            assert!(!verdict.is_noop());
            mode = verdict.next;
            trigger.set_recording(mode == SessionMode::Record);
        }
    }
    assert_eq!(mode, SessionMode::Record);

    // And the stop trigger carries it on to playback
    let leaving = DetectionResult::subject_leaving(0.5);
    for ms in (1100..=2200).step_by(100) {
        let output = trigger.observe_at(&leaving, at(base, ms));
        if let Some(event) = output.trigger {
            assert_eq!(event.kind, TriggerKind::Stop);
            let verdict = transition(mode, SessionEvent::TriggerStop);
            mode = verdict.next;
        }
    }
    assert_eq!(mode, SessionMode::Playback);
}

/// A start trigger in IDLE would be a no-op even if one leaked through
#[test]
fn test_start_trigger_rejected_from_idle() {
    let verdict = transition(SessionMode::Idle, SessionEvent::TriggerStart);
    assert!(verdict.is_noop());
    assert_eq!(verdict.next, SessionMode::Idle);
}
