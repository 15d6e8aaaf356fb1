//! Loopcam CLI
//!
//! Usage:
//!   loopcam                         # HTTP API server on 127.0.0.1:4600
//!   loopcam --serve --addr 0.0.0.0:4600
//!   loopcam --demo                  # Scripted gesture walkthrough in the terminal
//!   loopcam --replay                # Replay the most recent recording
//!   loopcam --demo --no-color      # Plain output

use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

use loopcam::core::api::{run_server, spawn_detection_pump, AppState};
use loopcam::core::detector::scripted_walkthrough;
use loopcam::core::session::StatusReport;
use loopcam::core::{
    discover_count, latest_recording, load_all, AnalysisGate, DetectorConfig, DetectorWorker,
    DwellConfig, EventBus, PlayerHandle, SessionConfig, SessionController,
};
use loopcam::types::{DetectorEvent, ModeChange, PlayerCommand, SessionEvent, SessionMode};
use loopcam::{COOLDOWN_MS, DEFAULT_RECORD_FPS, DETECTION_MAX_HZ, DWELL_TIME_MS, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "loopcam",
    version = VERSION,
    about = "Loopcam - Gesture-triggered record-and-replay camera kiosk",
    long_about = "Loopcam watches a detection stream for a held pose, records while\n\
                  the subject stays in frame, and replays the clip when they leave.\n\n\
                  Modes:\n  \
                  --serve   HTTP API server (default)\n  \
                  --demo    Scripted walkthrough of the full gesture lifecycle\n  \
                  --replay  Replay the most recent recording to the terminal\n\n\
                  Session modes:\n  \
                  IDLE      - Nothing running\n  \
                  LIVE      - Streaming, watching for the start gesture\n  \
                  RECORD    - Persisting frames\n  \
                  PLAYBACK  - Replaying the last recording"
)]
struct Args {
    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Run the scripted terminal demo
    #[arg(short, long)]
    demo: bool,

    /// Replay the most recent recording to the terminal
    #[arg(short, long)]
    replay: bool,

    /// Server address (default: 127.0.0.1:4600)
    #[arg(long, default_value = "127.0.0.1:4600")]
    addr: String,

    /// Root directory for recordings (default: ./recordings)
    #[arg(long, default_value = "./recordings")]
    data_dir: String,

    /// Dwell window in milliseconds
    #[arg(long, default_value_t = DWELL_TIME_MS)]
    dwell_ms: u64,

    /// Cooldown after a start trigger in milliseconds
    #[arg(long, default_value_t = COOLDOWN_MS)]
    cooldown_ms: u64,

    /// Capture rate stamped into new recordings
    #[arg(long, default_value_t = DEFAULT_RECORD_FPS)]
    fps: f64,

    /// Initial playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Upper bound on detection analyses per second
    #[arg(long, default_value_t = DETECTION_MAX_HZ)]
    detection_hz: u32,

    /// Command line for the detection worker, e.g. "python3 pose.py"
    #[arg(long)]
    detector_cmd: Option<String>,

    /// Keep recording through total detection loss
    #[arg(long)]
    no_stop_on_loss: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.demo || args.replay {
        "loopcam=warn"
    } else {
        "loopcam=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    if args.demo {
        run_demo(&args).await;
    } else if args.replay {
        run_replay(&args).await;
    } else {
        run_serve(&args).await;
    }
}

fn session_config(args: &Args) -> SessionConfig {
    SessionConfig {
        data_root: PathBuf::from(&args.data_dir),
        dwell: DwellConfig {
            dwell: Duration::from_millis(args.dwell_ms),
            cooldown: Duration::from_millis(args.cooldown_ms),
            stop_on_detection_loss: !args.no_stop_on_loss,
        },
        record_fps: args.fps,
        speed_multiplier: args.speed,
        autoplay: true,
    }
}

/// Run HTTP API server
async fn run_serve(args: &Args) {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║  🎥 Loopcam Kiosk Server                                   ║");
    println!("║  Version: {}                                            ║", VERSION);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let bus = Arc::new(EventBus::default());
    let gate = Arc::new(AnalysisGate::new(args.detection_hz));
    let controller = SessionController::new(session_config(args), bus.clone());

    let (detections_tx, detections_rx) = mpsc::channel(32);
    let detector = match &args.detector_cmd {
        Some(cmd) => {
            let mut lifecycle = bus.subscribe_detector();
            tokio::spawn(async move {
                while let Ok(event) = lifecycle.recv().await {
                    match event {
                        DetectorEvent::Ready => info!("detector worker ready"),
                        DetectorEvent::Stopped => warn!("detector worker stopped"),
                        DetectorEvent::Fatal { message } => {
                            warn!(%message, "detector worker failed")
                        }
                    }
                }
            });
            match DetectorWorker::spawn(
                cmd,
                &DetectorConfig::default(),
                gate.clone(),
                bus.clone(),
                detections_tx,
            )
            .await
            {
                Ok(worker) => Some(Mutex::new(worker)),
                Err(err) => {
                    eprintln!("Detector spawn failed: {}", err);
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("No --detector-cmd given: frames will be recorded but not analyzed.");
            println!();
            None
        }
    };

    let state = Arc::new(AppState {
        controller: Mutex::new(controller),
        bus,
        gate,
        detector,
        started: Instant::now(),
    });
    spawn_detection_pump(state.clone(), detections_rx);

    tokio::select! {
        result = run_server(&args.addr, state.clone()) => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Shutting down...");
            state.controller.lock().await.shutdown().await;
            if let Some(detector) = &state.detector {
                detector.lock().await.shutdown().await;
            }
        }
    }
}

/// Run the scripted terminal demo
///
/// Drives the controller with a canned detection timeline: walk-up, held
/// pose, recording, walk-away, automatic replay.
async fn run_demo(args: &Args) {
    let no_color = args.no_color;
    print_banner("Demo", no_color);
    println!("Scripted walk-up: the start ring fills for a held pose, recording");
    println!("runs while the subject stays, and the clip replays once they leave.");
    println!();

    let bus = Arc::new(EventBus::default());
    let mut modes = bus.subscribe_modes();
    let mut controller = SessionController::new(session_config(args), bus.clone());

    controller.handle(SessionEvent::StartLive).await;
    announce_mode_changes(&mut modes, no_color);

    let start = Instant::now();
    let mut frame_counter = 0u32;
    for (offset, result) in scripted_walkthrough() {
        tokio::time::sleep_until((start + offset).into()).await;
        controller.ingest_detection(&result).await;
        if controller.mode() == SessionMode::Record {
            frame_counter += 1;
            controller.ingest_frame(format!("demo frame {}", frame_counter).as_bytes());
        }
        print_dwell_line(&controller.status(), no_color);
        announce_mode_changes(&mut modes, no_color);
    }

    // The stop trigger landed us in playback; let the loop run a moment
    if controller.mode() == SessionMode::Playback {
        println!();
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            match controller.playback_state() {
                Some(state) => {
                    print!(
                        "\r{} replaying frame {:>3}",
                        SessionMode::Playback.emoji(),
                        state.current_index
                    );
                    let _ = std::io::stdout().flush();
                    if !state.playing {
                        break;
                    }
                }
                None => break,
            }
        }
        println!();
    }

    controller.handle(SessionEvent::StopPlayback).await;
    announce_mode_changes(&mut modes, no_color);

    let status = controller.status();
    controller.shutdown().await;

    println!();
    if no_color {
        println!(
            "Done. {} detections observed, {} frames persisted under {}",
            status.observations, frame_counter, args.data_dir
        );
    } else {
        println!(
            "{} {} detections observed, {} frames persisted under {}",
            "Done.".green().bold(),
            status.observations,
            frame_counter,
            args.data_dir
        );
    }
}

/// Replay the most recent recording to the terminal
async fn run_replay(args: &Args) {
    let root = PathBuf::from(&args.data_dir);
    let dir = match latest_recording(&root) {
        Ok(dir) => dir,
        Err(reason) => {
            eprintln!("Replay failed: {}", reason);
            std::process::exit(1);
        }
    };

    // Fast contiguous count gives the progress line its denominator
    let expected = discover_count(&dir);
    let sequence = match load_all(&dir, |loaded, _| {
        if loaded % 25 == 0 {
            print!("\rLoading... {} / {} frames", loaded, expected.max(loaded));
            let _ = std::io::stdout().flush();
        }
    }) {
        Ok(sequence) => sequence,
        Err(reason) => {
            eprintln!("Replay failed: {}", reason);
            std::process::exit(1);
        }
    };

    println!(
        "\rLoaded {} frames at {:.1} fps          ",
        sequence.len(),
        sequence.recorded_fps
    );
    if sequence.is_empty() {
        eprintln!("Most recent recording has no frames");
        std::process::exit(1);
    }

    let total = sequence.len();
    let bus = Arc::new(EventBus::default());
    let mut updates = bus.subscribe_playback();
    let handle = PlayerHandle::spawn(sequence, bus, true);
    if (args.speed - 1.0).abs() > f64::EPSILON {
        handle.send(PlayerCommand::SetSpeed(args.speed)).await;
    }

    let mut rendered = 0usize;
    while rendered < total {
        match updates.recv().await {
            Ok(update) if update.playing => {
                rendered += 1;
                print!("\r▶ frame {:>5} / {}", update.index + 1, total);
                let _ = std::io::stdout().flush();
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    println!();
    handle.shutdown().await;
}

/// Print header
fn print_banner(mode: &str, no_color: bool) {
    if no_color {
        println!("========================================");
        println!("  Loopcam v{} - {}", VERSION, mode);
        println!("========================================");
    } else {
        println!("{}", format!("Loopcam v{} - {}", VERSION, mode).bold());
        println!("{}", "Gesture-triggered record-and-replay kiosk".dimmed());
    }
    println!();
}

/// One status line per observation: mode badge plus both dwell rings
fn print_dwell_line(status: &StatusReport, no_color: bool) {
    let bar = |progress: f64| {
        let filled = (progress * 20.0).round() as usize;
        format!("{}{}", "█".repeat(filled), "░".repeat(20 - filled))
    };
    let start_pct = status.trigger.start_progress * 100.0;
    let stop_pct = status.trigger.stop_progress * 100.0;

    if no_color {
        println!(
            "[{}] start {} {:>3.0}% | stop {} {:>3.0}%",
            status.mode,
            bar(status.trigger.start_progress),
            start_pct,
            bar(status.trigger.stop_progress),
            stop_pct
        );
    } else {
        println!(
            "{}{} [{}]{} start {} {:>3.0}% | stop {} {:>3.0}%",
            status.mode.color_code(),
            status.mode.emoji(),
            status.mode,
            SessionMode::color_reset(),
            bar(status.trigger.start_progress),
            start_pct,
            bar(status.trigger.stop_progress),
            stop_pct
        );
    }
}

/// Drain and announce committed mode changes
fn announce_mode_changes(modes: &mut broadcast::Receiver<ModeChange>, no_color: bool) {
    while let Ok(change) = modes.try_recv() {
        let label = format!("{} -> {}  {}", change.from, change.to, change.reason.code());
        if no_color {
            println!("  {}", label);
            continue;
        }
        let line = match change.to {
            SessionMode::Record => label.red().bold(),
            SessionMode::Playback => label.green().bold(),
            SessionMode::Live => label.cyan().bold(),
            SessionMode::Idle => label.dimmed(),
        };
        println!("  {}", line);
    }
}
