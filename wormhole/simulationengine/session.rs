use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::ShaftConfig,
    repository::SimulationRepository,
    runtime::RunOptions,
    state::{ProgressSnapshot, SimulationResult},
};

/// Lifecycle of a host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationPhase {
    /// Nothing started yet.
    Idle,
    /// A run is in flight.
    Running,
    /// The last run produced a result.
    Completed,
}

/// Notice raised when a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum SessionAlert {
    /// The worm reached the middle of the shaft.
    HalfwayReached {
        /// Depth of the halfway mark.
        halfway_mark: f64,
    },
    /// The worm left the shaft.
    Escaped {
        /// Attempts it took.
        attempts: u64,
    },
}

/// Host-side session errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A run is already in flight.
    #[error("a simulation is already running")]
    AlreadyRunning,
}

#[derive(Debug)]
struct SessionState {
    phase: SimulationPhase,
    config: ShaftConfig,
    latest: Option<ProgressSnapshot>,
    result: Option<SimulationResult>,
    alerts: Vec<SessionAlert>,
}

/// Puts an abandoned run back to `Idle`.
struct RunningGuard {
    state: Arc<Mutex<SessionState>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.phase == SimulationPhase::Running {
            state.phase = SimulationPhase::Idle;
        }
    }
}

/// Tracks one configured simulation for a presentation host.
///
/// Mirrors the latest snapshot while running and raises alerts on completion.
/// Clones share state.
pub struct SimulationSession<R> {
    repository: Arc<R>,
    state: Arc<Mutex<SessionState>>,
}

impl<R> Clone for SimulationSession<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: SimulationRepository + 'static> SimulationSession<R> {
    /// Creates an idle session.
    #[must_use]
    pub fn new(repository: Arc<R>, config: ShaftConfig) -> Self {
        Self {
            repository,
            state: Arc::new(Mutex::new(SessionState {
                phase: SimulationPhase::Idle,
                config,
                latest: None,
                result: None,
                alerts: Vec::new(),
            })),
        }
    }

    /// Replaces the configuration used by the next run.
    pub fn configure(&self, config: ShaftConfig) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.phase == SimulationPhase::Running {
            return Err(SessionError::AlreadyRunning);
        }
        state.config = config;
        Ok(())
    }

    /// Runs the configured simulation and records its outcome.
    pub async fn start(&self) -> Result<SimulationResult, SessionError> {
        self.start_with(RunOptions::default()).await
    }

    /// Like [`Self::start`], bounded by `options`.
    ///
    /// If the returned future is dropped before the run finishes, the session
    /// goes back to `Idle` and can be reconfigured and restarted.
    pub async fn start_with(&self, options: RunOptions) -> Result<SimulationResult, SessionError> {
        let config = {
            let mut state = self.state.lock();
            if state.phase == SimulationPhase::Running {
                return Err(SessionError::AlreadyRunning);
            }
            state.phase = SimulationPhase::Running;
            state.latest = None;
            state.result = None;
            state.alerts.clear();
            state.config
        };
        let guard = RunningGuard {
            state: Arc::clone(&self.state),
        };

        let mirror = Arc::clone(&self.state);
        self.repository
            .set_progress_listener(Arc::new(move |snapshot: &ProgressSnapshot| {
                mirror.lock().latest = Some(*snapshot);
            }));
        let result = self.repository.simulate_with(config, options).await;

        {
            let mut state = self.state.lock();
            if result.reached_halfway {
                state.alerts.push(SessionAlert::HalfwayReached {
                    halfway_mark: config.halfway_mark(),
                });
            }
            if result.success {
                state.alerts.push(SessionAlert::Escaped {
                    attempts: result.attempts,
                });
            }
            state.result = Some(result);
            state.phase = SimulationPhase::Completed;
        }
        drop(guard);
        Ok(result)
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SimulationPhase {
        self.state.lock().phase
    }

    /// Configuration for the next (or current) run.
    #[must_use]
    pub fn config(&self) -> ShaftConfig {
        self.state.lock().config
    }

    /// Most recent snapshot of the current or last run.
    #[must_use]
    pub fn latest(&self) -> Option<ProgressSnapshot> {
        self.state.lock().latest
    }

    /// Result of the last completed run.
    #[must_use]
    pub fn result(&self) -> Option<SimulationResult> {
        self.state.lock().result
    }

    /// Alerts raised by the last completed run.
    #[must_use]
    pub fn alerts(&self) -> Vec<SessionAlert> {
        self.state.lock().alerts.clone()
    }
}
