//! Closed-form prediction of a run, used to vet configurations and check traces.
//!
//! The worm's peak after attempt `k` is `climb + (k - 1) * (climb - fall)`,
//! so the first attempt whose peak reaches a target `t > climb` is
//! `ceil((t - climb) / (climb - fall)) + 1`. Predictions are exact when the
//! distances are exactly representable; accumulated rounding in the simulated
//! trace can otherwise shift the count by one.

use serde::{Deserialize, Serialize};

use crate::{config::ShaftConfig, state::SimulationResult};

/// Why a configuration never escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// The climb distance is zero, negative or NaN.
    NonPositiveClimb,
    /// Each attempt loses at least as much as it gains.
    NoNetProgress,
}

impl StallReason {
    /// Human readable explanation.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NonPositiveClimb => "climb distance must be greater than zero",
            Self::NoNetProgress => "fall distance cancels out every climb",
        }
    }
}

/// Predicted outcome of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outlook", rename_all = "snake_case")]
pub enum Outlook {
    /// The run escapes.
    Escapes {
        /// Attempts needed, including the final one without a fall.
        attempts: u64,
        /// First attempt whose climb reaches the halfway mark, if any.
        halfway_attempt: Option<u64>,
    },
    /// The run never terminates on its own.
    Stalls {
        /// Why.
        reason: StallReason,
    },
}

impl Outlook {
    /// Whether a simulated result agrees with this prediction.
    #[must_use]
    pub fn matches(&self, result: &SimulationResult) -> bool {
        match *self {
            Self::Escapes { attempts, .. } => result.success && result.attempts == attempts,
            Self::Stalls { .. } => !result.success,
        }
    }
}

/// Predicts the outcome of `config` without running it.
#[must_use]
pub fn predict(config: &ShaftConfig) -> Outlook {
    let climb = config.climb_distance;
    let half = config.halfway_mark();
    if climb >= config.depth {
        return Outlook::Escapes {
            attempts: 1,
            halfway_attempt: (climb >= half).then_some(1),
        };
    }
    if climb.is_nan() || climb <= 0.0 {
        return Outlook::Stalls {
            reason: StallReason::NonPositiveClimb,
        };
    }
    let net = climb - config.fall_distance;
    if net.is_nan() || net <= 0.0 {
        return Outlook::Stalls {
            reason: StallReason::NoNetProgress,
        };
    }
    Outlook::Escapes {
        attempts: attempts_to_reach(config.depth, climb, net),
        halfway_attempt: Some(attempts_to_reach(half, climb, net)),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn attempts_to_reach(target: f64, climb: f64, net: f64) -> u64 {
    if climb >= target {
        1
    } else {
        ((target - climb) / net).ceil() as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Termination;

    #[test]
    fn default_config_needs_nine_attempts() {
        assert_eq!(
            predict(&ShaftConfig::default()),
            Outlook::Escapes {
                attempts: 9,
                halfway_attempt: Some(4)
            }
        );
    }

    #[test]
    fn first_climb_escape() {
        assert_eq!(
            predict(&ShaftConfig::new(5.0, 5.0, 3.0, 0.0)),
            Outlook::Escapes {
                attempts: 1,
                halfway_attempt: Some(1)
            }
        );
    }

    #[test]
    fn stalls() {
        assert_eq!(
            predict(&ShaftConfig::new(10.0, 2.0, 5.0, 0.0)),
            Outlook::Stalls {
                reason: StallReason::NoNetProgress
            }
        );
        assert_eq!(
            predict(&ShaftConfig::new(10.0, 3.0, 3.0, 0.0)),
            Outlook::Stalls {
                reason: StallReason::NoNetProgress
            }
        );
        assert_eq!(
            predict(&ShaftConfig::new(10.0, -1.0, 0.0, 0.0)),
            Outlook::Stalls {
                reason: StallReason::NonPositiveClimb
            }
        );
        assert_eq!(
            predict(&ShaftConfig::new(10.0, f64::NAN, 0.0, 0.0)),
            Outlook::Stalls {
                reason: StallReason::NonPositiveClimb
            }
        );
    }

    #[test]
    fn no_fall_divides_evenly() {
        assert_eq!(
            predict(&ShaftConfig::new(20.0, 4.0, 0.0, 0.0)),
            Outlook::Escapes {
                attempts: 5,
                halfway_attempt: Some(3)
            }
        );
    }

    #[test]
    fn matches_compares_attempts() {
        let outlook = predict(&ShaftConfig::default());
        let mut result = SimulationResult {
            success: true,
            attempts: 9,
            final_position: 21.0,
            reached_halfway: true,
            termination: Termination::Escaped,
        };
        assert!(outlook.matches(&result));
        result.attempts = 8;
        assert!(!outlook.matches(&result));
    }
}
