//! Loopcam: gesture-triggered record-and-replay camera kiosk core
//!
//! Detection stream → dwell trigger → session state machine → frame store / playback

pub mod core;
pub mod types;

// =============================================================================
// TRIGGER TIMING
// =============================================================================

/// Continuous hold required before a trigger confirms (milliseconds)
/// 1 second - long enough to reject walk-throughs, short enough to feel instant
pub const DWELL_TIME_MS: u64 = 1000;

/// Minimum gap after a start trigger before the next may fire (milliseconds)
pub const COOLDOWN_MS: u64 = 3000;

/// Upper bound on detection analyses per second
pub const DETECTION_MAX_HZ: u32 = 10;

// =============================================================================
// RECORDING / PLAYBACK
// =============================================================================

/// Capture rate recorded into each session's metadata (frames per second)
pub const DEFAULT_RECORD_FPS: f64 = 30.0;

/// Playback speed multiplier bounds
pub const SPEED_MULTIPLIER_MIN: f64 = 0.25;
pub const SPEED_MULTIPLIER_MAX: f64 = 4.0;

// =============================================================================
// FRAME STORE
// =============================================================================

/// Frame filename prefix: frame0.jpg, frame1.jpg, ...
pub const FRAME_FILE_PREFIX: &str = "frame";

/// Frame filename extension
pub const FRAME_FILE_EXT: &str = "jpg";

/// Per-recording metadata sidecar
pub const METADATA_FILE: &str = "metadata.json";

/// Consecutive missing frames treated as end-of-sequence during load
pub const LOAD_GAP_LIMIT: u32 = 5;

/// Ceiling for the existence-probe search in discover_count
pub const DISCOVER_MAX_FRAMES: u32 = 131_072;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
