use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{predict, Outlook},
    config::ShaftConfig,
    state::{ProgressSnapshot, SimulationResult, Termination},
};

/// Structured summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Configuration that was run.
    pub config: ShaftConfig,
    /// Terminal result.
    pub result: SimulationResult,
    /// Closed-form prediction for the configuration.
    pub outlook: Outlook,
    /// Whether the result agrees with the prediction.
    pub matches_prediction: bool,
    /// Snapshots in emission order, if recorded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<ProgressSnapshot>,
    /// Timestamp.
    pub generated_at: DateTime<Utc>,
}

impl SimulationReport {
    /// Multi-line plain-text summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let status = match self.result.termination {
            Termination::Escaped => "escaped",
            Termination::AttemptCeiling => "stopped at attempt ceiling",
            Termination::Cancelled => "cancelled",
        };
        let _ = writeln!(out, "status:          {status}");
        let _ = writeln!(out, "attempts:        {}", self.result.attempts);
        let _ = writeln!(out, "final position:  {:.1}", self.result.final_position);
        let _ = writeln!(
            out,
            "reached halfway: {}",
            if self.result.reached_halfway { "yes" } else { "no" }
        );
        match self.outlook {
            Outlook::Escapes { attempts, .. } => {
                let _ = write!(out, "predicted:       escape in {attempts} attempts");
            }
            Outlook::Stalls { reason } => {
                let _ = write!(out, "predicted:       never escapes ({})", reason.describe());
            }
        }
        out
    }
}

/// Builder for [`SimulationReport`].
pub struct SimulationReportBuilder<'a> {
    config: &'a ShaftConfig,
    result: &'a SimulationResult,
    trace: Vec<ProgressSnapshot>,
}

impl<'a> SimulationReportBuilder<'a> {
    /// Creates a builder for a finished run.
    #[must_use]
    pub const fn new(config: &'a ShaftConfig, result: &'a SimulationResult) -> Self {
        Self {
            config,
            result,
            trace: Vec::new(),
        }
    }

    /// Attaches the recorded trace.
    #[must_use]
    pub fn trace(mut self, trace: Vec<ProgressSnapshot>) -> Self {
        self.trace = trace;
        self
    }

    /// Builds the report.
    #[must_use]
    pub fn build(self) -> SimulationReport {
        let outlook = predict(self.config);
        SimulationReport {
            config: *self.config,
            result: *self.result,
            matches_prediction: outlook.matches(self.result),
            outlook,
            trace: self.trace,
            generated_at: Utc::now(),
        }
    }
}
