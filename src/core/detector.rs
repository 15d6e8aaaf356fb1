//! Detector bridge: child worker process, wire protocol, analysis gate
//!
//! Requests go to the worker's stdin as a 4-byte little-endian header length,
//! a JSON header, then the raw frame payload. Replies come back as JSON
//! lines on stdout. Per-frame failure replies free the analysis slot like
//! detections do; unparseable lines are dropped, never propagated.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::bus::EventBus;
use crate::types::{DetectionResult, DetectorEvent};
use crate::DETECTION_MAX_HZ;

/// Model knobs forwarded to the worker at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
    pub model_complexity: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
        }
    }
}

/// Single-slot admission control for frame analysis
///
/// One analysis may be in flight at a time, and admissions are spaced at
/// least `min_interval` apart. Frames that do not make it through are
/// dropped, never queued.
#[derive(Debug)]
pub struct AnalysisGate {
    busy: AtomicBool,
    /// Milliseconds since `base` of the last admission, u64::MAX when none
    last_admit_ms: AtomicU64,
    base: Instant,
    min_interval: Duration,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

impl AnalysisGate {
    pub fn new(max_hz: u32) -> Self {
        Self {
            busy: AtomicBool::new(false),
            last_admit_ms: AtomicU64::new(u64::MAX),
            base: Instant::now(),
            min_interval: Duration::from_millis(1000 / u64::from(max_hz.max(1))),
            admitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Try to take the slot for one analysis
    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    /// Explicit-instant form of `try_admit`
    pub fn try_admit_at(&self, now: Instant) -> bool {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let elapsed_ms = now.duration_since(self.base).as_millis() as u64;
        let last = self.last_admit_ms.load(Ordering::Acquire);
        if last != u64::MAX && elapsed_ms.saturating_sub(last) < self.min_interval.as_millis() as u64
        {
            self.busy.store(false, Ordering::Release);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.last_admit_ms.store(elapsed_ms, Ordering::Release);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Free the slot once the analysis finished or failed
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for AnalysisGate {
    fn default() -> Self {
        Self::new(DETECTION_MAX_HZ)
    }
}

/// Detection fields of a `process_frame` reply
///
/// The worker omits everything but `detected` when it sees nobody, and also
/// sends fields this bridge does not consume (bounding box, landmarks);
/// both are handled by defaults and serde's skip-unknown behavior.
#[derive(Debug, Deserialize)]
struct PosePayload {
    detected: bool,
    #[serde(default)]
    full_body_visible: bool,
    #[serde(default)]
    should_stop_recording: bool,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pose: Option<PosePayload>,
}

/// Meaningful replies the read loop can act on
#[derive(Debug)]
pub enum WorkerSignal {
    Detection(DetectionResult),
    /// Per-frame failure; answers an in-flight analysis just like a detection
    Failure(String),
    Pong,
    Ack,
}

/// Parse one stdout line from the worker
///
/// Error reports and failed analyses come back as `Failure`: they answer an
/// in-flight frame, whose slot must be freed. Malformed lines map to None.
pub fn parse_reply(line: &str) -> Option<WorkerSignal> {
    let reply: WorkerReply = serde_json::from_str(line).ok()?;

    if let Some(error) = reply.error {
        return Some(WorkerSignal::Failure(error));
    }
    if reply.success == Some(false) {
        return Some(WorkerSignal::Failure(
            reply.message.unwrap_or_else(|| "analysis failed".to_string()),
        ));
    }
    if let Some(pose) = reply.pose {
        return Some(WorkerSignal::Detection(DetectionResult::new(
            pose.detected,
            pose.full_body_visible,
            pose.should_stop_recording,
            pose.confidence,
        )));
    }
    match reply.message.as_deref() {
        Some("pong") => Some(WorkerSignal::Pong),
        Some(_) => Some(WorkerSignal::Ack),
        None => None,
    }
}

/// Frame one request: length-prefixed JSON header plus optional payload
pub fn encode_request(header: &serde_json::Value, payload: Option<&[u8]>) -> Vec<u8> {
    let header_bytes = header.to_string().into_bytes();
    let mut buf =
        Vec::with_capacity(4 + header_bytes.len() + payload.map_or(0, |p| p.len()));
    buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    if let Some(payload) = payload {
        buf.extend_from_slice(payload);
    }
    buf
}

async fn write_request(
    stdin: &mut ChildStdin,
    header: &serde_json::Value,
    payload: Option<&[u8]>,
) -> std::io::Result<()> {
    stdin.write_all(&encode_request(header, payload)).await?;
    stdin.flush().await
}

/// Managed detection worker process
pub struct DetectorWorker {
    child: Child,
    stdin: ChildStdin,
    seq: u64,
    alive: Arc<AtomicBool>,
    bus: Arc<EventBus>,
}

impl DetectorWorker {
    /// Spawn the worker, push its configuration, and start the reply reader
    ///
    /// Detections flow out through `detections`; lifecycle notices go to the
    /// bus. The gate is released by the reader as replies arrive.
    pub async fn spawn(
        command_line: &str,
        config: &DetectorConfig,
        gate: Arc<AnalysisGate>,
        bus: Arc<EventBus>,
        detections: mpsc::Sender<DetectionResult>,
    ) -> std::io::Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty detector command")
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdin unavailable")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdout unavailable")
        })?;

        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(read_worker_output(
            stdout,
            alive.clone(),
            gate,
            bus.clone(),
            detections,
        ));

        let mut worker = Self {
            child,
            stdin,
            seq: 0,
            alive,
            bus,
        };
        worker
            .send_header(&json!({"type": "config", "config": config}))
            .await?;
        worker.send_header(&json!({"type": "ping"})).await?;

        info!(command = command_line, "detector worker spawned");
        Ok(worker)
    }

    async fn send_header(&mut self, header: &serde_json::Value) -> std::io::Result<()> {
        write_request(&mut self.stdin, header, None).await
    }

    /// Submit one frame for analysis; call only after the gate admitted it
    ///
    /// Returns false when the worker is gone, in which case the caller must
    /// release the gate slot itself.
    pub async fn analyze(&mut self, payload: &[u8]) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return false;
        }

        self.seq += 1;
        let header = json!({
            "type": "process_frame",
            "format": "binary",
            "data_length": payload.len(),
            "seq": self.seq,
        });
        match write_request(&mut self.stdin, &header, Some(payload)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "detector stdin write failed");
                self.alive.store(false, Ordering::Release);
                self.bus.publish_detector(DetectorEvent::Fatal {
                    message: err.to_string(),
                });
                false
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Kill the worker process; the reply reader winds down on its own
    pub async fn shutdown(&mut self) {
        self.alive.store(false, Ordering::Release);
        let _ = self.child.kill().await;
    }
}

/// Reply reader: runs until the worker closes stdout or errors out
async fn read_worker_output<R>(
    stdout: R,
    alive: Arc<AtomicBool>,
    gate: Arc<AnalysisGate>,
    bus: Arc<EventBus>,
    detections: mpsc::Sender<DetectionResult>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_reply(&line) {
                Some(WorkerSignal::Detection(result)) => {
                    gate.release();
                    if detections.send(result).await.is_err() {
                        break;
                    }
                }
                Some(WorkerSignal::Failure(message)) => {
                    gate.release();
                    debug!(%message, "detector failed on a frame");
                }
                Some(WorkerSignal::Pong) => {
                    info!("detector worker ready");
                    bus.publish_detector(DetectorEvent::Ready);
                }
                Some(WorkerSignal::Ack) => debug!("detector acknowledged"),
                None => debug!(%line, "dropped unparseable detector line"),
            },
            Ok(None) => {
                info!("detector worker stopped");
                bus.publish_detector(DetectorEvent::Stopped);
                break;
            }
            Err(err) => {
                warn!(error = %err, "detector stdout read failed");
                bus.publish_detector(DetectorEvent::Fatal {
                    message: err.to_string(),
                });
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
    gate.release();
}

/// Canned detection timeline for the terminal demo
///
/// Walk-up, dwell-confirmed start, a few seconds on camera, walk-away,
/// dwell-confirmed stop. Offsets are from the start of the demo.
pub fn scripted_walkthrough() -> Vec<(Duration, DetectionResult)> {
    let mut steps = Vec::new();
    let mut push = |ms: u64, result: DetectionResult| {
        steps.push((Duration::from_millis(ms), result));
    };

    // Nobody in frame yet
    for ms in (0..400).step_by(100) {
        push(ms, DetectionResult::absent());
    }
    // Subject walks up and holds still: start dwell fills, fires at ~1400
    for ms in (400..2000).step_by(100) {
        push(ms, DetectionResult::subject_visible(0.93));
    }
    // Recording continues while they stay in frame
    for ms in (2000..3600).step_by(100) {
        push(ms, DetectionResult::subject_visible(0.90));
    }
    // Subject walks away: stop dwell fills, fires at ~4600
    for ms in (3600..4800).step_by(100) {
        push(ms, DetectionResult::subject_leaving(0.62));
    }
    steps
}

// =============================================================================
// TESTS
// =============================================================================
