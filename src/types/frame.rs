//! Frame descriptors and the loaded frame sequence

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Playback direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Forward,
    Reverse,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::Forward => "FORWARD",
            Direction::Reverse => "REVERSE",
        };
        write!(f, "{}", name)
    }
}

/// One persisted frame, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Position in the recording
    pub index: u32,
    /// Where the payload lives on disk
    pub path: PathBuf,
}

impl FrameDescriptor {
    pub fn new(index: u32, path: PathBuf) -> Self {
        Self { index, path }
    }
}

/// An ordered, indexed collection of frames from one recording
///
/// Holds the cursor for navigation. The cursor is always within
/// `[0, len-1]` while the sequence is non-empty, and 0 when empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSequence {
    frames: Vec<FrameDescriptor>,
    current: usize,
    /// Capture rate this recording was made at
    pub recorded_fps: f64,
}

impl FrameSequence {
    /// Build a sequence from loaded descriptors
    pub fn new(frames: Vec<FrameDescriptor>, recorded_fps: f64) -> Self {
        Self {
            frames,
            current: 0,
            recorded_fps,
        }
    }

    /// Empty sequence, cursor pinned at 0
    pub fn empty() -> Self {
        Self::new(Vec::new(), crate::DEFAULT_RECORD_FPS)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Frame under the cursor, if any
    pub fn current_frame(&self) -> Option<&FrameDescriptor> {
        self.frames.get(self.current)
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    /// Move the cursor, clamping into the valid range
    pub fn set_index(&mut self, index: usize) -> usize {
        if self.frames.is_empty() {
            self.current = 0;
        } else {
            self.current = index.min(self.frames.len() - 1);
        }
        self.current
    }

    /// Advance one frame in `direction`
    ///
    /// `circular` wraps past either end; otherwise the cursor clamps at the
    /// boundary and the caller can detect the unchanged index.
    pub fn step(&mut self, direction: Direction, circular: bool) -> usize {
        if self.frames.is_empty() {
            return 0;
        }
        let last = self.frames.len() - 1;
        self.current = match direction {
            Direction::Forward => {
                if self.current < last {
                    self.current + 1
                } else if circular {
                    0
                } else {
                    last
                }
            }
            Direction::Reverse => {
                if self.current > 0 {
                    self.current - 1
                } else if circular {
                    last
                } else {
                    0
                }
            }
        };
        self.current
    }

    /// Map a fraction of the timeline onto a frame index
    ///
    /// The fraction is clamped to 0.0-1.0; the result is
    /// floor(fraction * (len-1)).
    pub fn seek(&mut self, fraction: f64) -> usize {
        if self.frames.is_empty() {
            return 0;
        }
        let clamped = fraction.clamp(0.0, 1.0);
        let target = (clamped * (self.frames.len() - 1) as f64).floor() as usize;
        self.set_index(target)
    }

    /// Is the cursor at the final frame for this direction?
    pub fn at_boundary(&self, direction: Direction) -> bool {
        if self.frames.is_empty() {
            return true;
        }
        match direction {
            Direction::Forward => self.current == self.frames.len() - 1,
            Direction::Reverse => self.current == 0,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
