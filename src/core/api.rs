//! HTTP + WebSocket API for Loopcam
//!
//! Endpoints:
//! - GET  /health             - Health check
//! - GET  /status             - Full controller snapshot
//! - POST /session/{command}  - Session commands (start-live, stop-live, ...)
//! - POST /playback/play      - Start playing, optional direction
//! - POST /playback/pause     - Pause on the current frame
//! - POST /playback/step      - Step one frame
//! - POST /playback/seek      - Jump to a position fraction
//! - POST /playback/repeat    - Toggle wrap-around
//! - POST /playback/speed     - Set the speed multiplier
//! - POST /frames             - Ingest one frame (octet-stream body)
//! - WS   /ws                 - Live event stream

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::bus::{EventBus, KioskEvent};
use crate::core::detector::{AnalysisGate, DetectorWorker};
use crate::core::session::{SessionController, StatusReport};
use crate::types::{DetectionResult, Direction, PlaybackState, PlayerCommand, SessionEvent, SessionMode};

/// App state
pub struct AppState {
    pub controller: Mutex<SessionController>,
    pub bus: Arc<EventBus>,
    pub gate: Arc<AnalysisGate>,
    /// Present only when a detector worker was spawned
    pub detector: Option<Mutex<DetectorWorker>>,
    pub started: Instant,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mode: SessionMode,
    pub uptime_secs: u64,
    /// None when no detector worker was configured
    pub detector_alive: Option<bool>,
}

/// Controller snapshot plus the counters kept outside the controller
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub report: StatusReport,
    pub events_published: u64,
    pub analysis_admitted: u64,
    pub analysis_dropped: u64,
}

/// Session command response
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Did the mode actually change?
    pub committed: bool,
    pub mode: SessionMode,
    pub code: String,
    pub message: String,
}

/// Playback command request bodies
#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub direction: Option<Direction>,
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub direction: Direction,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    /// Position as a fraction of the sequence, 0.0 to 1.0
    pub position: f64,
}

#[derive(Debug, Deserialize)]
pub struct RepeatRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub multiplier: f64,
}

/// Playback command response
#[derive(Debug, Serialize)]
pub struct PlaybackResponse {
    /// False when no player is running
    pub delivered: bool,
    pub playback: Option<PlaybackState>,
}

/// Frame ingest response
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub accepted: bool,
    /// Frame made it through the gate to the detector
    pub analyzed: bool,
    pub recorded: bool,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/session/:command", post(session_command))
        .route("/playback/play", post(playback_play))
        .route("/playback/pause", post(playback_pause))
        .route("/playback/step", post(playback_step))
        .route("/playback/seek", post(playback_seek))
        .route("/playback/repeat", post(playback_repeat))
        .route("/playback/speed", post(playback_speed))
        .route("/frames", post(ingest_frame))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Pump detections from the worker channel into the controller
pub fn spawn_detection_pump(
    state: Arc<AppState>,
    mut detections: mpsc::Receiver<DetectionResult>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = detections.recv().await {
            let mut controller = state.controller.lock().await;
            controller.ingest_detection(&result).await;
        }
        debug!("detection pump stopped");
    })
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let detector_alive = match &state.detector {
        Some(worker) => Some(worker.lock().await.is_alive()),
        None => None,
    };
    let controller = state.controller.lock().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        mode: controller.mode(),
        uptime_secs: state.started.elapsed().as_secs(),
        detector_alive,
    })
}

/// Full controller snapshot
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let controller = state.controller.lock().await;
    Json(StatusResponse {
        report: controller.status(),
        events_published: state.bus.published_count(),
        analysis_admitted: state.gate.admitted(),
        analysis_dropped: state.gate.dropped(),
    })
}

/// Run one session command through the state machine
async fn session_command(
    State(state): State<Arc<AppState>>,
    Path(command): Path<String>,
) -> Result<Json<CommandResponse>, StatusCode> {
    let event = match command.as_str() {
        "start-live" => SessionEvent::StartLive,
        "stop-live" => SessionEvent::StopLive,
        "start-record" => SessionEvent::StartRecord,
        "stop-record" => SessionEvent::StopRecord,
        "start-playback" => SessionEvent::StartPlayback,
        "stop-playback" => SessionEvent::StopPlayback,
        _ => return Err(StatusCode::NOT_FOUND),
    };

    let mut controller = state.controller.lock().await;
    let verdict = controller.handle(event).await;
    Ok(Json(CommandResponse {
        committed: !verdict.is_noop(),
        mode: controller.mode(),
        code: verdict.reason.code().to_string(),
        message: verdict.reason.description().to_string(),
    }))
}

/// Start or resume playing
async fn playback_play(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlayRequest>,
) -> Json<PlaybackResponse> {
    let direction = req.direction.unwrap_or(Direction::Forward);
    forward_player_command(&state, PlayerCommand::Play(direction)).await
}

/// Pause on the current frame
async fn playback_pause(State(state): State<Arc<AppState>>) -> Json<PlaybackResponse> {
    forward_player_command(&state, PlayerCommand::Pause).await
}

/// Step one frame in either direction
async fn playback_step(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StepRequest>,
) -> Json<PlaybackResponse> {
    forward_player_command(&state, PlayerCommand::Step(req.direction)).await
}

/// Jump to a position fraction
async fn playback_seek(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeekRequest>,
) -> Json<PlaybackResponse> {
    forward_player_command(&state, PlayerCommand::Seek(req.position)).await
}

/// Toggle wrap-around at the sequence boundary
async fn playback_repeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RepeatRequest>,
) -> Json<PlaybackResponse> {
    forward_player_command(&state, PlayerCommand::SetRepeat(req.enabled)).await
}

/// Set the speed multiplier
async fn playback_speed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeedRequest>,
) -> Json<PlaybackResponse> {
    forward_player_command(&state, PlayerCommand::SetSpeed(req.multiplier)).await
}

async fn forward_player_command(state: &AppState, command: PlayerCommand) -> Json<PlaybackResponse> {
    let controller = state.controller.lock().await;
    let delivered = controller.player_command(command).await;
    Json(PlaybackResponse {
        delivered,
        playback: controller.playback_state(),
    })
}

/// Ingest one frame
///
/// The body is the raw frame payload. Recording happens under the
/// controller lock; analysis is attempted afterwards if the gate admits
/// the frame and a detector is running.
async fn ingest_frame(State(state): State<Arc<AppState>>, body: Bytes) -> Json<FrameResponse> {
    let ingest = {
        let mut controller = state.controller.lock().await;
        controller.ingest_frame(&body)
    };

    let mut analyzed = false;
    if ingest.accepted {
        if let Some(detector) = &state.detector {
            if state.gate.try_admit() {
                analyzed = detector.lock().await.analyze(&body).await;
                if !analyzed {
                    state.gate.release();
                }
            }
        }
    }

    Json(FrameResponse {
        accepted: ingest.accepted,
        analyzed,
        recorded: ingest.recorded,
    })
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.bus.subscribe_all();
    ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    })
}

/// Forward bus events to the socket until either side closes
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<KioskEvent>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Run the API server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("🎥 Loopcam API running on {}", addr);
    println!("  GET  /health            - Health check");
    println!("  GET  /status            - Controller snapshot");
    println!("  POST /session/:command  - start-live, stop-live, start-record,");
    println!("                            stop-record, start-playback, stop-playback");
    println!("  POST /playback/...      - play, pause, step, seek, repeat, speed");
    println!("  POST /frames            - Ingest one frame");
    println!("  WS   /ws                - Live event stream");
    axum::serve(listener, router).await?;
    Ok(())
}
