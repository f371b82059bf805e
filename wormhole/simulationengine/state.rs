use serde::{Deserialize, Serialize};

/// Step of an attempt that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    /// Emitted right after the climb.
    Climb,
    /// Emitted once, when the halfway mark is first reached.
    Halfway,
    /// Emitted after slipping back.
    Fall,
}

impl AttemptStage {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Climb => "climb",
            Self::Halfway => "halfway",
            Self::Fall => "fall",
        }
    }
}

/// Immutable copy of the run state at one observable moment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Which step produced this snapshot.
    pub stage: AttemptStage,
    /// Current height above the shaft bottom; may be negative.
    pub position: f64,
    /// Climbs performed so far.
    pub attempts: u64,
    /// Whether the halfway mark has been reached in this run.
    pub reached_halfway: bool,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Position reached or passed the depth.
    Escaped,
    /// The configured attempt ceiling was hit first.
    AttemptCeiling,
    /// The host cancelled the run.
    Cancelled,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// True iff the worm escaped.
    pub success: bool,
    /// Climbs performed.
    pub attempts: u64,
    /// Position when the run stopped.
    pub final_position: f64,
    /// Whether the halfway mark was reached.
    pub reached_halfway: bool,
    /// Why the run stopped.
    pub termination: Termination,
}

/// Mutable state owned by a single run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub(crate) position: f64,
    pub(crate) attempts: u64,
    pub(crate) reached_halfway: bool,
}

impl RunState {
    pub(crate) const fn snapshot(&self, stage: AttemptStage) -> ProgressSnapshot {
        ProgressSnapshot {
            stage,
            position: self.position,
            attempts: self.attempts,
            reached_halfway: self.reached_halfway,
        }
    }

    pub(crate) fn finish(&self, termination: Termination) -> SimulationResult {
        SimulationResult {
            success: termination == Termination::Escaped,
            attempts: self.attempts,
            final_position: self.position,
            reached_halfway: self.reached_halfway,
            termination,
        }
    }
}
