//! Core types for Loopcam

mod detection;
mod frame;
mod playback;
mod session;
mod trigger;

pub use detection::{DetectionResult, DetectorEvent};
pub use frame::{Direction, FrameDescriptor, FrameSequence};
pub use playback::{PlaybackState, PlaybackUpdate, PlayerCommand};
pub use session::{ModeChange, SessionEvent, SessionMode, SessionReason, TransitionAction, Verdict};
pub use trigger::{TriggerEvent, TriggerKind, TriggerProgress, TriggerReason};
