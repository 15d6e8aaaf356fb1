//! Playback state and player control messages

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Direction;
use crate::{SPEED_MULTIPLIER_MAX, SPEED_MULTIPLIER_MIN};

/// Live state of the playback scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_index: usize,
    pub direction: Direction,
    pub playing: bool,
    pub repeat: bool,
    /// Effective pace: recorded fps x speed multiplier
    pub target_fps: f64,
    pub speed_multiplier: f64,
    /// Capture rate of the loaded recording
    pub recorded_fps: f64,
}

impl PlaybackState {
    /// Paused at frame 0, normal speed, no repeat
    pub fn new(recorded_fps: f64) -> Self {
        let fps = if recorded_fps > 0.0 {
            recorded_fps
        } else {
            crate::DEFAULT_RECORD_FPS
        };
        Self {
            current_index: 0,
            direction: Direction::Forward,
            playing: false,
            repeat: false,
            target_fps: fps,
            speed_multiplier: 1.0,
            recorded_fps: fps,
        }
    }

    /// Change speed and recompute the effective pace
    ///
    /// The multiplier is clamped to the supported range.
    pub fn set_speed(&mut self, multiplier: f64) {
        self.speed_multiplier = multiplier.clamp(SPEED_MULTIPLIER_MIN, SPEED_MULTIPLIER_MAX);
        self.target_fps = self.recorded_fps * self.speed_multiplier;
    }

    /// Time between frames at the current pace
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }
}

/// Commands accepted by the playback task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Play(Direction),
    Pause,
    Step(Direction),
    Seek(f64),
    SetRepeat(bool),
    SetSpeed(f64),
    Stop,
}

/// Per-frame playback notice, published on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackUpdate {
    pub index: usize,
    pub playing: bool,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

impl PlaybackUpdate {
    pub fn new(index: usize, playing: bool, direction: Direction) -> Self {
        Self {
            index,
            playing,
            direction,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
