#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Wormhole simulation engine – a worm climbs out of a shaft, slipping back after
//! every attempt, with paced, ordered progress reporting.

/// Telemetry for the simulation engine.
#[path = "../helper.rs"]
pub mod helper;

/// Shaft configuration and config-file loading.
#[path = "../config.rs"]
pub mod config;

/// Snapshots, results and per-run state.
#[path = "../state.rs"]
pub mod state;

/// Pacing primitives awaited between attempts.
#[path = "../pacing.rs"]
pub mod pacing;

/// Run cancellation.
#[path = "../cancel.rs"]
pub mod cancel;

/// Progress listeners and event streams.
#[path = "../progress.rs"]
pub mod progress;

/// Closed-form run prediction.
#[path = "../analysis.rs"]
pub mod analysis;

/// Run reports.
#[path = "../report.rs"]
pub mod report;

/// Repository seam used by hosts.
#[path = "../repository.rs"]
pub mod repository;

/// Host session state machine.
#[path = "../session.rs"]
pub mod session;

/// Engine runtime & builder.
#[path = "../main.rs"]
pub mod runtime;

pub use analysis::{predict, Outlook, StallReason};
pub use cancel::CancelToken;
pub use config::{ConfigError, ShaftConfig};
pub use helper::{SimulationTelemetry, SimulationTelemetryBuilder};
pub use pacing::{ImmediatePacer, Pacer, TokioPacer};
pub use progress::{ProgressListener, RunEvent, RunEvents, TraceRecorder};
pub use report::{SimulationReport, SimulationReportBuilder};
pub use repository::SimulationRepository;
pub use runtime::{RunOptions, ShaftSimulator, ShaftSimulatorBuilder};
pub use session::{SessionAlert, SessionError, SimulationPhase, SimulationSession};
pub use state::{AttemptStage, ProgressSnapshot, SimulationResult, Termination};
