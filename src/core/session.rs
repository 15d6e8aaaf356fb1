//! Session state machine and its controller
//!
//! `transition` is the pure half: mode plus event in, verdict out, no side
//! effects. `SessionController` is the impure half: it runs the verdict's
//! action against the stream, the frame store, and the player, and commits
//! the new mode only after the action succeeded.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::bus::EventBus;
use crate::core::dwell::{DwellConfig, DwellTrigger};
use crate::core::player::PlayerHandle;
use crate::core::store::{self, RecordingWriter, StoreReason};
use crate::types::{
    DetectionResult, FrameSequence, ModeChange, PlaybackState, PlayerCommand, SessionEvent,
    SessionMode, SessionReason, TransitionAction, TriggerKind, TriggerProgress, Verdict,
};
use crate::DEFAULT_RECORD_FPS;

/// The transition table
///
/// Total over mode and event: anything not listed is a no-op verdict, never
/// an error. Dwell triggers reuse the user-command rows, so RECORD is only
/// reachable from LIVE no matter who asks.
pub fn transition(mode: SessionMode, event: SessionEvent) -> Verdict {
    use SessionEvent as E;
    use SessionMode as M;

    match (mode, event) {
        (M::Idle, E::StartLive) => Verdict::accepted(
            M::Live,
            TransitionAction::AcquireStream,
            SessionReason::S101_LIVE_STARTED,
        ),
        (M::Live, E::StopLive) => Verdict::accepted(
            M::Idle,
            TransitionAction::ReleaseStream,
            SessionReason::S102_LIVE_STOPPED,
        ),
        (M::Live, E::StartRecord | E::TriggerStart) => Verdict::accepted(
            M::Record,
            TransitionAction::BeginPersisting,
            SessionReason::S103_RECORD_STARTED,
        ),
        (M::Record, E::StopRecord | E::TriggerStop) => Verdict::accepted(
            M::Playback,
            TransitionAction::EndPersistingAndLoad,
            SessionReason::S104_RECORD_STOPPED,
        ),
        (M::Idle | M::Live, E::StartPlayback) => Verdict::accepted(
            M::Playback,
            TransitionAction::LoadMostRecent,
            SessionReason::S105_PLAYBACK_STARTED,
        ),
        (M::Playback, E::StopPlayback) => Verdict::accepted(
            M::Idle,
            TransitionAction::ReleaseSequence,
            SessionReason::S106_PLAYBACK_STOPPED,
        ),
        _ => Verdict::noop(mode),
    }
}

/// Tunables for one controller instance
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory holding recording subdirectories
    pub data_root: PathBuf,
    pub dwell: DwellConfig,
    /// Capture rate stamped into new recordings
    pub record_fps: f64,
    /// Initial playback speed multiplier
    pub speed_multiplier: f64,
    /// Start playing as soon as a sequence loads
    pub autoplay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./recordings"),
            dwell: DwellConfig::default(),
            record_fps: DEFAULT_RECORD_FPS,
            speed_multiplier: 1.0,
            autoplay: true,
        }
    }
}

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FrameIngest {
    /// Mode was LIVE or RECORD when the frame arrived
    pub accepted: bool,
    /// Frame was persisted by the open recording
    pub recorded: bool,
}

/// Live recording counters for the status report
#[derive(Debug, Clone, Serialize)]
pub struct RecordingStatus {
    pub dir: String,
    pub frames: u32,
    pub write_failures: u32,
}

/// Full controller snapshot, served over the API
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub mode: SessionMode,
    pub stream_active: bool,
    pub trigger: TriggerProgress,
    pub in_cooldown: bool,
    pub recording: Option<RecordingStatus>,
    pub playback: Option<PlaybackState>,
    pub observations: u64,
    pub frames_seen: u64,
    pub last_change: Option<ModeChange>,
    pub last_warning: Option<SessionReason>,
}

/// A failed side effect: the reason to report and the mode to land in
struct Failure {
    reason: SessionReason,
    fallback: SessionMode,
}

impl Failure {
    fn new(reason: SessionReason, fallback: SessionMode) -> Self {
        Self { reason, fallback }
    }
}

/// Owns the session mode and everything attached to it
pub struct SessionController {
    config: SessionConfig,
    mode: SessionMode,
    dwell: DwellTrigger,
    bus: Arc<EventBus>,
    writer: Option<RecordingWriter>,
    player: Option<PlayerHandle>,
    stream_active: bool,
    frames_seen: u64,
    last_change: Option<ModeChange>,
    last_warning: Option<SessionReason>,
}

impl SessionController {
    pub fn new(config: SessionConfig, bus: Arc<EventBus>) -> Self {
        let dwell = DwellTrigger::new(config.dwell);
        Self {
            config,
            mode: SessionMode::Idle,
            dwell,
            bus,
            writer: None,
            player: None,
            stream_active: false,
            frames_seen: 0,
            last_change: None,
            last_warning: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.player.as_ref().map(|player| player.state())
    }

    /// Run one event through the table and commit it if its action succeeds
    ///
    /// The returned verdict reflects what actually happened: the table row
    /// on success, a no-op for unlisted pairs, or the failure reason with
    /// the mode the controller fell back to.
    pub async fn handle(&mut self, event: SessionEvent) -> Verdict {
        let verdict = transition(self.mode, event);
        if verdict.is_noop() {
            debug!(mode = %self.mode, %event, "event not applicable");
            return verdict;
        }

        match self.perform(verdict.action).await {
            Ok(()) => {
                self.commit(verdict.next, verdict.reason);
                verdict
            }
            Err(failure) => {
                warn!(code = failure.reason.code(), "{}", failure.reason.description());
                self.last_warning = Some(failure.reason);
                if failure.fallback != self.mode {
                    self.commit(failure.fallback, failure.reason);
                }
                Verdict {
                    next: self.mode,
                    action: TransitionAction::None,
                    reason: failure.reason,
                }
            }
        }
    }

    /// Feed one detection result through the dwell trigger
    ///
    /// Only LIVE and RECORD consume detections; in any other mode the result
    /// is dropped before it can touch the dwell windows. A confirmed trigger
    /// is routed straight back into `handle`, and the resulting verdict is
    /// returned.
    pub async fn ingest_detection(&mut self, result: &DetectionResult) -> Option<Verdict> {
        self.ingest_detection_at(result, Instant::now()).await
    }

    /// Explicit-instant form of `ingest_detection`
    pub async fn ingest_detection_at(
        &mut self,
        result: &DetectionResult,
        now: Instant,
    ) -> Option<Verdict> {
        if !matches!(self.mode, SessionMode::Live | SessionMode::Record) {
            return None;
        }

        let output = self.dwell.observe_at(result, now);
        self.bus.publish_progress(output.progress);

        let trigger = output.trigger?;
        let event = match trigger.kind {
            TriggerKind::Start => SessionEvent::TriggerStart,
            TriggerKind::Stop => SessionEvent::TriggerStop,
        };
        self.bus.publish_trigger(trigger);
        Some(self.handle(event).await)
    }

    /// Take one inbound frame: count it, persist it if recording
    ///
    /// A failed write is absorbed; the writer has already advanced its index
    /// so the gap stays in the timeline.
    pub fn ingest_frame(&mut self, payload: &[u8]) -> FrameIngest {
        if !matches!(self.mode, SessionMode::Live | SessionMode::Record) {
            return FrameIngest {
                accepted: false,
                recorded: false,
            };
        }

        self.frames_seen += 1;
        let recorded = match self.writer.as_mut() {
            Some(writer) => writer.append(payload).is_ok(),
            None => false,
        };
        FrameIngest {
            accepted: true,
            recorded,
        }
    }

    /// Forward a control command to the player, if one is running
    pub async fn player_command(&self, command: PlayerCommand) -> bool {
        match &self.player {
            Some(player) => {
                player.send(command).await;
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> StatusReport {
        let now = Instant::now();
        StatusReport {
            mode: self.mode,
            stream_active: self.stream_active,
            trigger: self.dwell.snapshot(now),
            in_cooldown: self.dwell.in_cooldown(now),
            recording: self.writer.as_ref().map(|writer| RecordingStatus {
                dir: writer.dir().display().to_string(),
                frames: writer.frame_count(),
                write_failures: writer.write_failures(),
            }),
            playback: self.playback_state(),
            observations: self.dwell.observation_count(),
            frames_seen: self.frames_seen,
            last_change: self.last_change.clone(),
            last_warning: self.last_warning,
        }
    }

    /// Close whatever is open and return to IDLE without ceremony
    pub async fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(reason) = writer.finish() {
                warn!(code = reason.code(), "recording close failed during shutdown");
            }
        }
        if let Some(player) = self.player.take() {
            player.shutdown().await;
        }
        self.stream_active = false;
        self.mode = SessionMode::Idle;
    }

    fn commit(&mut self, next: SessionMode, reason: SessionReason) {
        let change = ModeChange::new(self.mode, next, reason);
        info!(
            from = %change.from,
            to = %change.to,
            code = reason.code(),
            "mode changed"
        );
        self.mode = next;
        self.dwell.set_recording(next == SessionMode::Record);
        self.last_change = Some(change.clone());
        self.bus.publish_mode(change);
    }

    async fn perform(&mut self, action: TransitionAction) -> Result<(), Failure> {
        match action {
            TransitionAction::None => Ok(()),
            TransitionAction::AcquireStream => self.acquire_stream(),
            TransitionAction::ReleaseStream => {
                self.release_stream();
                Ok(())
            }
            TransitionAction::BeginPersisting => self.begin_persisting(),
            TransitionAction::EndPersistingAndLoad => self.end_persisting_and_load().await,
            TransitionAction::LoadMostRecent => self.load_most_recent().await,
            TransitionAction::ReleaseSequence => {
                self.release_sequence().await;
                Ok(())
            }
        }
    }

    /// Going live requires a usable data root
    fn acquire_stream(&mut self) -> Result<(), Failure> {
        fs::create_dir_all(&self.config.data_root).map_err(|err| {
            warn!(
                root = %self.config.data_root.display(),
                error = %err,
                "data root unusable"
            );
            Failure::new(SessionReason::S402_STREAM_UNAVAILABLE, SessionMode::Idle)
        })?;

        self.stream_active = true;
        self.dwell.reset_windows();
        Ok(())
    }

    fn release_stream(&mut self) {
        self.stream_active = false;
        self.dwell.reset_windows();
    }

    fn begin_persisting(&mut self) -> Result<(), Failure> {
        match RecordingWriter::begin(&self.config.data_root, self.config.record_fps) {
            Ok(writer) => {
                self.writer = Some(writer);
                Ok(())
            }
            Err(reason) => {
                warn!(code = reason.code(), "recording writer rejected");
                Err(Failure::new(
                    SessionReason::S403_RECORDING_START_FAILED,
                    SessionMode::Live,
                ))
            }
        }
    }

    /// Close the recording, then load it back for replay
    ///
    /// A failed metadata write does not abort: the frames are on disk and
    /// the loader falls back to the default rate. Only a sequence with no
    /// frames at all fails the transition.
    async fn end_persisting_and_load(&mut self) -> Result<(), Failure> {
        self.stream_active = false;

        let dir = match self.writer.take() {
            Some(writer) => {
                let dir = writer.dir().to_path_buf();
                if let Err(reason) = writer.finish() {
                    warn!(code = reason.code(), "recording close failed");
                }
                dir
            }
            None => {
                return Err(Failure::new(
                    SessionReason::S404_SEQUENCE_LOAD_FAILED,
                    SessionMode::Idle,
                ))
            }
        };

        match store::load_all(&dir, |_, _| {}) {
            Ok(sequence) if !sequence.is_empty() => {
                self.start_player(sequence).await;
                Ok(())
            }
            Ok(_) => {
                warn!(dir = %dir.display(), "recording produced no frames");
                Err(Failure::new(
                    SessionReason::S404_SEQUENCE_LOAD_FAILED,
                    SessionMode::Idle,
                ))
            }
            Err(reason) => {
                warn!(code = reason.code(), "recorded sequence unreadable");
                Err(Failure::new(
                    SessionReason::S404_SEQUENCE_LOAD_FAILED,
                    SessionMode::Idle,
                ))
            }
        }
    }

    async fn load_most_recent(&mut self) -> Result<(), Failure> {
        self.stream_active = false;
        self.dwell.reset_windows();

        match store::load_latest(&self.config.data_root, |_, _| {}) {
            Ok(sequence) if !sequence.is_empty() => {
                self.start_player(sequence).await;
                Ok(())
            }
            Ok(_) | Err(StoreReason::F305_NO_RECORDINGS) | Err(StoreReason::F301_ROOT_UNREADABLE) => {
                Err(Failure::new(
                    SessionReason::S401_NO_RECORDING_FOUND,
                    SessionMode::Idle,
                ))
            }
            Err(reason) => {
                warn!(code = reason.code(), "stored sequence unreadable");
                Err(Failure::new(
                    SessionReason::S404_SEQUENCE_LOAD_FAILED,
                    SessionMode::Idle,
                ))
            }
        }
    }

    async fn start_player(&mut self, sequence: FrameSequence) {
        if let Some(old) = self.player.take() {
            old.shutdown().await;
        }
        let player = PlayerHandle::spawn(sequence, self.bus.clone(), self.config.autoplay);
        if (self.config.speed_multiplier - 1.0).abs() > f64::EPSILON {
            player
                .send(PlayerCommand::SetSpeed(self.config.speed_multiplier))
                .await;
        }
        self.player = Some(player);
    }

    async fn release_sequence(&mut self) {
        if let Some(player) = self.player.take() {
            player.shutdown().await;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
