//! Frame store: persists recordings, discovers them, loads them for replay
//!
//! Layout: one directory per recording under the data root,
//! `rec_YYYYMMDD_HHMMSS/` holding `frame0.jpg, frame1.jpg, ...` plus a
//! `metadata.json` sidecar with the capture rate.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{FrameDescriptor, FrameSequence};
use crate::{
    DEFAULT_RECORD_FPS, DISCOVER_MAX_FRAMES, FRAME_FILE_EXT, FRAME_FILE_PREFIX, LOAD_GAP_LIMIT,
    METADATA_FILE,
};

lazy_static! {
    /// Recording directory names: rec_YYYYMMDD_HHMMSS, optional collision suffix
    static ref RECORDING_DIR_RE: Regex = Regex::new(r"^rec_(\d{8}_\d{6})(?:_(\d+))?$").unwrap();
}

/// Reason codes for store outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum StoreReason {
    /// Data root missing or unreadable
    F301_ROOT_UNREADABLE,
    /// One frame payload failed to write
    F302_FRAME_WRITE_FAILED,
    /// Metadata sidecar failed to serialize or write
    F303_METADATA_WRITE_FAILED,
    /// Metadata sidecar missing or unparseable
    F304_METADATA_READ_FAILED,
    /// No recording directories under the root
    F305_NO_RECORDINGS,
}

impl StoreReason {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::F301_ROOT_UNREADABLE => "F301_ROOT_UNREADABLE",
            Self::F302_FRAME_WRITE_FAILED => "F302_FRAME_WRITE_FAILED",
            Self::F303_METADATA_WRITE_FAILED => "F303_METADATA_WRITE_FAILED",
            Self::F304_METADATA_READ_FAILED => "F304_METADATA_READ_FAILED",
            Self::F305_NO_RECORDINGS => "F305_NO_RECORDINGS",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::F301_ROOT_UNREADABLE => "Recording root unreadable",
            Self::F302_FRAME_WRITE_FAILED => "Frame write failed",
            Self::F303_METADATA_WRITE_FAILED => "Metadata write failed",
            Self::F304_METADATA_READ_FAILED => "Metadata read failed",
            Self::F305_NO_RECORDINGS => "No recordings found",
        }
    }
}

impl std::fmt::Display for StoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Per-recording metadata sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMeta {
    /// Capture rate the frames were recorded at
    pub recorded_fps: f64,
    /// Frame indices allocated during the recording
    pub frame_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What a finished recording left on disk
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub dir: PathBuf,
    pub frame_count: u32,
    pub recorded_fps: f64,
}

/// Open recording: owns the directory and the next frame index
#[derive(Debug)]
pub struct RecordingWriter {
    dir: PathBuf,
    next_index: u32,
    recorded_fps: f64,
    started_at: DateTime<Utc>,
    write_failures: u32,
}

impl RecordingWriter {
    /// Create the recording directory and start at frame 0
    pub fn begin(root: &Path, recorded_fps: f64) -> Result<Self, StoreReason> {
        fs::create_dir_all(root).map_err(|_| StoreReason::F301_ROOT_UNREADABLE)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let mut dir = root.join(format!("rec_{}", stamp));
        let mut collision = 1;
        while dir.exists() {
            dir = root.join(format!("rec_{}_{}", stamp, collision));
            collision += 1;
        }
        fs::create_dir_all(&dir).map_err(|_| StoreReason::F301_ROOT_UNREADABLE)?;

        debug!(dir = %dir.display(), "recording opened");
        Ok(Self {
            dir,
            next_index: 0,
            recorded_fps,
            started_at: Utc::now(),
            write_failures: 0,
        })
    }

    /// Persist one frame payload under the next sequential index
    ///
    /// The index advances even when the write fails, so replay timing stays
    /// aligned with capture timing; the resulting hole behaves like any other
    /// transient gap during load.
    pub fn append(&mut self, payload: &[u8]) -> Result<FrameDescriptor, StoreReason> {
        let index = self.next_index;
        self.next_index += 1;

        let path = frame_path(&self.dir, index);
        match fs::write(&path, payload) {
            Ok(()) => Ok(FrameDescriptor::new(index, path)),
            Err(err) => {
                self.write_failures += 1;
                warn!(index, error = %err, "frame write failed");
                Err(StoreReason::F302_FRAME_WRITE_FAILED)
            }
        }
    }

    /// Close the recording and write the metadata sidecar
    pub fn finish(self) -> Result<RecordingSummary, StoreReason> {
        let meta = RecordingMeta {
            recorded_fps: self.recorded_fps,
            frame_count: self.next_index,
            started_at: self.started_at,
            finished_at: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|_| StoreReason::F303_METADATA_WRITE_FAILED)?;
        fs::write(self.dir.join(METADATA_FILE), json)
            .map_err(|_| StoreReason::F303_METADATA_WRITE_FAILED)?;

        debug!(
            dir = %self.dir.display(),
            frames = self.next_index,
            failures = self.write_failures,
            "recording closed"
        );
        Ok(RecordingSummary {
            dir: self.dir,
            frame_count: self.next_index,
            recorded_fps: self.recorded_fps,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_count(&self) -> u32 {
        self.next_index
    }

    pub fn write_failures(&self) -> u32 {
        self.write_failures
    }
}

/// Path of frame `index` inside a recording directory
pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{}{}.{}", FRAME_FILE_PREFIX, index, FRAME_FILE_EXT))
}

/// Existence probe for one candidate index
pub fn frame_exists(dir: &Path, index: u32) -> bool {
    frame_path(dir, index).is_file()
}

/// Load a recorded sequence, tolerating small gaps
///
/// Probes indices 0,1,2,... in order and stops after `LOAD_GAP_LIMIT`
/// consecutive misses, treating that point as end-of-sequence. Gaps shorter
/// than the limit are skipped. `on_progress(loaded, index)` fires per frame.
///
/// Note this disagrees with `discover_count`, which assumes a contiguous
/// sequence; both behaviors are kept deliberately.
pub fn load_all<F>(dir: &Path, mut on_progress: F) -> Result<FrameSequence, StoreReason>
where
    F: FnMut(u32, u32),
{
    if !dir.is_dir() {
        return Err(StoreReason::F301_ROOT_UNREADABLE);
    }

    let recorded_fps = match read_metadata(dir) {
        Ok(meta) => meta.recorded_fps,
        Err(reason) => {
            warn!(dir = %dir.display(), reason = reason.code(), "metadata missing, using default fps");
            DEFAULT_RECORD_FPS
        }
    };

    let mut frames = Vec::new();
    let mut misses = 0u32;
    let mut index = 0u32;
    while index < DISCOVER_MAX_FRAMES {
        let path = frame_path(dir, index);
        if path.is_file() {
            misses = 0;
            frames.push(FrameDescriptor::new(index, path));
            on_progress(frames.len() as u32, index);
        } else {
            misses += 1;
            if misses >= LOAD_GAP_LIMIT {
                break;
            }
        }
        index += 1;
    }

    debug!(dir = %dir.display(), loaded = frames.len(), "sequence loaded");
    Ok(FrameSequence::new(frames, recorded_fps))
}

/// Count frames by existence probe, assuming a contiguous sequence
///
/// Exponential ramp then binary search between the last hit and the first
/// miss, bounded by `DISCOVER_MAX_FRAMES`. Returns k+1 for the largest
/// existing index k, or 0 when frame 0 is absent. Internal gaps violate the
/// contiguity assumption and shorten the answer; `load_all` is the
/// gap-tolerant counterpart.
pub fn discover_count(dir: &Path) -> u32 {
    if !frame_exists(dir, 0) {
        return 0;
    }

    // Ramp: lo always exists, hi is the first candidate miss
    let mut lo = 0u32;
    let mut hi = 1u32;
    while hi < DISCOVER_MAX_FRAMES && frame_exists(dir, hi) {
        lo = hi;
        hi = (hi * 2).min(DISCOVER_MAX_FRAMES);
    }

    // Binary search the boundary in (lo, hi]
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if frame_exists(dir, mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo + 1
}

/// Read the metadata sidecar of one recording
pub fn read_metadata(dir: &Path) -> Result<RecordingMeta, StoreReason> {
    let json = fs::read_to_string(dir.join(METADATA_FILE))
        .map_err(|_| StoreReason::F304_METADATA_READ_FAILED)?;
    serde_json::from_str(&json).map_err(|_| StoreReason::F304_METADATA_READ_FAILED)
}

/// Sort key of a recording directory name: the embedded timestamp, then the
/// numeric collision suffix (0 when absent)
fn recording_sort_key(name: &str) -> Option<(String, u64)> {
    let caps = RECORDING_DIR_RE.captures(name)?;
    let stamp = caps[1].to_string();
    let suffix = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
    Some((stamp, suffix))
}

/// Most recent recording directory under the root
///
/// Ordered by the embedded timestamp, with same-second collisions broken by
/// the suffix compared as a number: `_10` outranks `_9`.
pub fn latest_recording(root: &Path) -> Result<PathBuf, StoreReason> {
    let entries = fs::read_dir(root).map_err(|_| StoreReason::F301_ROOT_UNREADABLE)?;

    let mut best: Option<((String, u64), PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let key = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(recording_sort_key)
        {
            Some(key) => key,
            None => continue,
        };
        if best.as_ref().map(|(b, _)| key > *b).unwrap_or(true) {
            best = Some((key, path));
        }
    }

    best.map(|(_, path)| path).ok_or(StoreReason::F305_NO_RECORDINGS)
}

/// Load the most recent recording under the root
pub fn load_latest<F>(root: &Path, on_progress: F) -> Result<FrameSequence, StoreReason>
where
    F: FnMut(u32, u32),
{
    let dir = latest_recording(root)?;
    load_all(&dir, on_progress)
}

// =============================================================================
// TESTS
// =============================================================================
