//! Core modules for Loopcam

pub mod api;
pub mod bus;
pub mod detector;
pub mod dwell;
pub mod player;
pub mod session;
pub mod store;

pub use api::{create_router, run_server, AppState};
pub use bus::{EventBus, KioskEvent};
pub use detector::{AnalysisGate, DetectorConfig, DetectorWorker};
pub use dwell::{DwellConfig, DwellTrigger};
pub use player::{Pacer, PlayerHandle};
pub use session::{transition, SessionConfig, SessionController};
pub use store::{discover_count, latest_recording, load_all, load_latest, RecordingWriter};
