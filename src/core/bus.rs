//! Event bus for inter-component communication
//!
//! One broadcast channel per event kind, plus a combined envelope channel
//! that the WebSocket feed forwards verbatim.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{DetectorEvent, ModeChange, PlaybackUpdate, TriggerEvent, TriggerProgress};

/// Everything observable, as one tagged envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KioskEvent {
    TriggerProgress(TriggerProgress),
    Trigger(TriggerEvent),
    Mode(ModeChange),
    Playback(PlaybackUpdate),
    Detector(DetectorEvent),
}

/// Central pub/sub hub
///
/// Publishing never fails; events sent with no live subscriber are dropped.
pub struct EventBus {
    progress_tx: broadcast::Sender<TriggerProgress>,
    trigger_tx: broadcast::Sender<TriggerEvent>,
    mode_tx: broadcast::Sender<ModeChange>,
    playback_tx: broadcast::Sender<PlaybackUpdate>,
    detector_tx: broadcast::Sender<DetectorEvent>,
    event_tx: broadcast::Sender<KioskEvent>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (progress_tx, _) = broadcast::channel(capacity);
        let (trigger_tx, _) = broadcast::channel(capacity);
        let (mode_tx, _) = broadcast::channel(capacity);
        let (playback_tx, _) = broadcast::channel(capacity);
        let (detector_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            progress_tx,
            trigger_tx,
            mode_tx,
            playback_tx,
            detector_tx,
            event_tx,
            published: AtomicU64::new(0),
        }
    }

    pub fn publish_progress(&self, progress: TriggerProgress) {
        let _ = self.progress_tx.send(progress);
        self.publish_envelope(KioskEvent::TriggerProgress(progress));
    }

    pub fn publish_trigger(&self, event: TriggerEvent) {
        let _ = self.trigger_tx.send(event.clone());
        self.publish_envelope(KioskEvent::Trigger(event));
    }

    pub fn publish_mode(&self, change: ModeChange) {
        let _ = self.mode_tx.send(change.clone());
        self.publish_envelope(KioskEvent::Mode(change));
    }

    pub fn publish_playback(&self, update: PlaybackUpdate) {
        let _ = self.playback_tx.send(update.clone());
        self.publish_envelope(KioskEvent::Playback(update));
    }

    pub fn publish_detector(&self, event: DetectorEvent) {
        let _ = self.detector_tx.send(event.clone());
        self.publish_envelope(KioskEvent::Detector(event));
    }

    fn publish_envelope(&self, event: KioskEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<TriggerProgress> {
        self.progress_tx.subscribe()
    }

    pub fn subscribe_triggers(&self) -> broadcast::Receiver<TriggerEvent> {
        self.trigger_tx.subscribe()
    }

    pub fn subscribe_modes(&self) -> broadcast::Receiver<ModeChange> {
        self.mode_tx.subscribe()
    }

    pub fn subscribe_playback(&self) -> broadcast::Receiver<PlaybackUpdate> {
        self.playback_tx.subscribe()
    }

    pub fn subscribe_detector(&self) -> broadcast::Receiver<DetectorEvent> {
        self.detector_tx.subscribe()
    }

    /// Combined feed for the WebSocket forwarder
    pub fn subscribe_all(&self) -> broadcast::Receiver<KioskEvent> {
        self.event_tx.subscribe()
    }

    /// Total events published since startup
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionMode, SessionReason};

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.publish_progress(TriggerProgress::idle());
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_typed_event() {
        let bus = EventBus::new(8);
        let mut modes = bus.subscribe_modes();

        bus.publish_mode(ModeChange::new(
            SessionMode::Idle,
            SessionMode::Live,
            SessionReason::S101_LIVE_STARTED,
        ));
        let change = modes.recv().await.unwrap();
        assert_eq!(change.to, SessionMode::Live);
    }

    #[tokio::test]
    async fn test_envelope_feed_sees_every_kind() {
        let bus = EventBus::new(8);
        let mut all = bus.subscribe_all();

        bus.publish_progress(TriggerProgress::idle());
        bus.publish_playback(crate::types::PlaybackUpdate::new(
            0,
            true,
            crate::types::Direction::Forward,
        ));

        assert!(matches!(
            all.recv().await.unwrap(),
            KioskEvent::TriggerProgress(_)
        ));
        assert!(matches!(all.recv().await.unwrap(), KioskEvent::Playback(_)));
    }
}
