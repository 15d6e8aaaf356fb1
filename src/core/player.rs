//! Playback scheduler: paced replay with drift correction
//!
//! The pacing math lives in `Pacer`, a plain struct driven by explicit
//! instants. The async task around it renders one frame per deadline,
//! answers control commands between frames, and re-checks the playing flag
//! at the top of every iteration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::bus::EventBus;
use crate::types::{Direction, FrameSequence, PlaybackState, PlaybackUpdate, PlayerCommand};

/// Frame deadline bookkeeping
///
/// After a render the deadline advances by one interval; if the consumer
/// fell behind far enough that the new deadline is already in the past, the
/// pacer resynchronizes to now + interval instead of scheduling a burst of
/// catch-up frames.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    next_deadline: Instant,
    interval: Duration,
}

impl Pacer {
    /// Arm the first deadline one interval from `now`
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            next_deadline: now + interval,
            interval,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Advance past a completed render at time `now`
    pub fn advance(&mut self, now: Instant) {
        self.next_deadline += self.interval;
        if self.next_deadline < now {
            self.next_deadline = now + self.interval;
        }
    }

    /// Change pace, rearming from `now`
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.next_deadline = now + interval;
    }
}

/// Control handle for a running playback task
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    state_rx: watch::Receiver<PlaybackState>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PlayerHandle {
    /// Spawn the playback task over a loaded sequence
    pub fn spawn(sequence: FrameSequence, bus: Arc<EventBus>, autoplay: bool) -> Self {
        let mut state = PlaybackState::new(sequence.recorded_fps);
        state.playing = autoplay && !sequence.is_empty();

        let (commands, cmd_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(state.clone());
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_player(
            sequence,
            state,
            bus,
            cmd_rx,
            state_tx,
            cancel.clone(),
        ));

        Self {
            commands,
            state_rx,
            cancel,
            join,
        }
    }

    /// Queue a control command; dropped if the task already exited
    pub async fn send(&self, command: PlayerCommand) {
        let _ = self.commands.send(command).await;
    }

    /// Latest state published by the task
    pub fn state(&self) -> PlaybackState {
        self.state_rx.borrow().clone()
    }

    /// Cancel the task and wait for it to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// The playback loop
///
/// Runs until cancelled or told to stop. While playing it renders one frame
/// per pacer deadline; while paused it just waits for commands.
async fn run_player(
    mut sequence: FrameSequence,
    mut state: PlaybackState,
    bus: Arc<EventBus>,
    mut commands: mpsc::Receiver<PlayerCommand>,
    state_tx: watch::Sender<PlaybackState>,
    cancel: CancellationToken,
) {
    let mut pacer = Pacer::new(Instant::now(), state.frame_interval());
    info!(
        frames = sequence.len(),
        fps = state.target_fps,
        "playback task started"
    );

    loop {
        if state.playing && sequence.is_empty() {
            state.playing = false;
            let _ = state_tx.send(state.clone());
        }

        if state.playing {
            let deadline = tokio::time::Instant::from_std(pacer.deadline());
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    match command {
                        Some(PlayerCommand::Stop) | None => break,
                        Some(command) => {
                            apply_command(command, &mut sequence, &mut state, &mut pacer, &bus);
                            let _ = state_tx.send(state.clone());
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    render_tick(&mut sequence, &mut state, &bus);
                    pacer.advance(Instant::now());
                    let _ = state_tx.send(state.clone());
                }
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    match command {
                        Some(PlayerCommand::Stop) | None => break,
                        Some(command) => {
                            apply_command(command, &mut sequence, &mut state, &mut pacer, &bus);
                            let _ = state_tx.send(state.clone());
                        }
                    }
                }
            }
        }
    }

    state.playing = false;
    let _ = state_tx.send(state.clone());
    bus.publish_playback(PlaybackUpdate::new(
        state.current_index,
        false,
        state.direction,
    ));
    debug!("playback task exited");
}

/// Render the frame under the cursor, then move or stop at the boundary
fn render_tick(sequence: &mut FrameSequence, state: &mut PlaybackState, bus: &EventBus) {
    bus.publish_playback(PlaybackUpdate::new(
        sequence.current_index(),
        true,
        state.direction,
    ));

    if sequence.at_boundary(state.direction) {
        if state.repeat {
            sequence.step(state.direction, true);
        } else {
            state.playing = false;
        }
    } else {
        sequence.step(state.direction, false);
    }
    state.current_index = sequence.current_index();
}

fn apply_command(
    command: PlayerCommand,
    sequence: &mut FrameSequence,
    state: &mut PlaybackState,
    pacer: &mut Pacer,
    bus: &EventBus,
) {
    match command {
        PlayerCommand::Play(direction) => {
            state.direction = direction;
            state.playing = true;
            pacer.set_interval(state.frame_interval(), Instant::now());
        }
        PlayerCommand::Pause => {
            state.playing = false;
        }
        PlayerCommand::Step(direction) => {
            // Manual stepping wraps only when repeat is on
            sequence.step(direction, state.repeat);
            state.current_index = sequence.current_index();
            bus.publish_playback(PlaybackUpdate::new(
                state.current_index,
                state.playing,
                direction,
            ));
        }
        PlayerCommand::Seek(fraction) => {
            sequence.seek(fraction);
            state.current_index = sequence.current_index();
            bus.publish_playback(PlaybackUpdate::new(
                state.current_index,
                state.playing,
                state.direction,
            ));
        }
        PlayerCommand::SetRepeat(enabled) => {
            state.repeat = enabled;
        }
        PlayerCommand::SetSpeed(multiplier) => {
            state.set_speed(multiplier);
            pacer.set_interval(state.frame_interval(), Instant::now());
        }
        PlayerCommand::Stop => unreachable!("handled by the loop"),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameDescriptor;
    use std::path::PathBuf;

    fn sequence_of(n: u32) -> FrameSequence {
        let frames = (0..n)
            .map(|i| FrameDescriptor::new(i, PathBuf::from(format!("frame{}.jpg", i))))
            .collect();
        FrameSequence::new(frames, 30.0)
    }

    #[test]
    fn test_pacer_even_cadence() {
        let interval = Duration::from_millis(100);
        let base = Instant::now();
        let mut pacer = Pacer::new(base, interval);

        // Consumer keeps up exactly: deadlines land every interval
        let mut now = base;
        for tick in 1..=5u32 {
            now = pacer.deadline();
            assert_eq!(now, base + interval * tick);
            pacer.advance(now);
        }
    }

    #[test]
    fn test_pacer_resyncs_after_stall() {
        let interval = Duration::from_millis(100);
        let base = Instant::now();
        let mut pacer = Pacer::new(base, interval);

        // Render finished 350ms late: one advance would still be in the
        // past, so the pacer rearms from now instead of bursting
        let late = pacer.deadline() + Duration::from_millis(350);
        pacer.advance(late);
        assert_eq!(pacer.deadline(), late + interval);
    }

    #[test]
    fn test_pacer_average_rate_with_stall() {
        // Simulated clock: instant renders except one 4-interval stall.
        // Average rate over 120 frames stays within 5% of target.
        let target_fps = 30.0;
        let interval = Duration::from_secs_f64(1.0 / target_fps);
        let base = Instant::now();
        let mut pacer = Pacer::new(base, interval);

        let mut render_times = Vec::new();
        let mut now = base;
        for frame in 0..120u32 {
            now = now.max(pacer.deadline());
            render_times.push(now);
            if frame == 60 {
                now += interval * 4;
            }
            pacer.advance(now);
        }

        let elapsed = render_times
            .last()
            .unwrap()
            .duration_since(*render_times.first().unwrap())
            .as_secs_f64();
        let measured = (render_times.len() - 1) as f64 / elapsed;
        let deviation = (measured - target_fps).abs() / target_fps;
        assert!(deviation < 0.05, "rate off by {:.1}%", deviation * 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_plays_through_and_stops_at_end() {
        let bus = Arc::new(EventBus::new(64));
        let mut updates = bus.subscribe_playback();
        let handle = PlayerHandle::spawn(sequence_of(5), bus.clone(), true);

        let mut rendered = Vec::new();
        while rendered.len() < 5 {
            let update = updates.recv().await.unwrap();
            if update.playing {
                rendered.push(update.index);
            }
        }
        assert_eq!(rendered, vec![0, 1, 2, 3, 4]);

        // The boundary render flips the playing flag off
        tokio::task::yield_now().await;
        let state = handle.state();
        assert!(!state.playing);
        assert_eq!(state.current_index, 4);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_repeat_wraps_to_start() {
        let bus = Arc::new(EventBus::new(64));
        let mut updates = bus.subscribe_playback();
        let handle = PlayerHandle::spawn(sequence_of(3), bus.clone(), false);

        handle.send(PlayerCommand::SetRepeat(true)).await;
        handle.send(PlayerCommand::Play(Direction::Forward)).await;

        let mut rendered = Vec::new();
        while rendered.len() < 7 {
            let update = updates.recv().await.unwrap();
            if update.playing {
                rendered.push(update.index);
            }
        }
        assert_eq!(rendered, vec![0, 1, 2, 0, 1, 2, 0]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_reverse_from_end() {
        let bus = Arc::new(EventBus::new(64));
        let mut updates = bus.subscribe_playback();
        let handle = PlayerHandle::spawn(sequence_of(4), bus.clone(), false);

        handle.send(PlayerCommand::Seek(1.0)).await;
        handle.send(PlayerCommand::Play(Direction::Reverse)).await;

        let mut rendered = Vec::new();
        while rendered.len() < 4 {
            let update = updates.recv().await.unwrap();
            if update.playing {
                rendered.push(update.index);
            }
        }
        assert_eq!(rendered, vec![3, 2, 1, 0]);

        tokio::task::yield_now().await;
        assert!(!handle.state().playing);
        assert_eq!(handle.state().current_index, 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_step_and_seek_while_paused() {
        let bus = Arc::new(EventBus::new(64));
        let handle = PlayerHandle::spawn(sequence_of(10), bus.clone(), false);

        handle.send(PlayerCommand::Step(Direction::Forward)).await;
        handle.send(PlayerCommand::Step(Direction::Forward)).await;
        handle.send(PlayerCommand::Seek(0.5)).await;

        // Wait for the task to drain the queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = handle.state();
        assert!(!state.playing);
        assert_eq!(state.current_index, 4);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_sequence_never_plays() {
        let bus = Arc::new(EventBus::new(64));
        let handle = PlayerHandle::spawn(FrameSequence::empty(), bus.clone(), true);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.state().playing);
        handle.shutdown().await;
    }
}
