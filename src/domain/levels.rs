//! Drop Levels and Reset Policies
//!
//! Two level models are supported:
//! - Fixed ladder: configured (level, drop %) pairs measured from the local max
//! - Relative ladder: a first drop from the local max, then fixed steps
//!   measured from the previous signal's price
//!
//! Recovery (the rebound from the local min that ends a session) scales with
//! the deepest level fired.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pair_state::PairState;

/// Smallest relative-ladder step magnitude accepted, in percent
pub const MIN_STEP_PCT: f64 = 0.01;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LevelConfigError {
    #[error("Level ladder is empty")]
    EmptyLadder,

    #[error("Level {level} threshold must be negative, got {drop_pct}")]
    NonNegativeThreshold { level: u32, drop_pct: f64 },

    #[error("Level ids must be strictly ascending (level {0} out of order)")]
    UnsortedLevels(u32),

    #[error("Level {0} must require a deeper drop than the level before it")]
    NonDecreasingThreshold(u32),

    #[error("Relative ladder percentages must be negative (first={first}, step={step})")]
    InvalidRelative { first: f64, step: f64 },

    #[error("Relative ladder step must be at least 0.01% deep, got {0}")]
    StepTooSmall(f64),

    #[error("Recovery step for level {0} is lower than a shallower step or the default")]
    NonMonotonicRecovery(u32),

    #[error("Recovery percentage must be positive, got {0}")]
    NonPositiveRecovery(f64),
}

/// A fixed-ladder milestone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropLevel {
    pub level: u32,
    /// Negative percent change from the local max (e.g. -8.0)
    pub drop_pct: f64,
}

/// How drop levels are computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum LevelModel {
    FixedLadder { levels: Vec<DropLevel> },
    RelativeLadder { first_drop_pct: f64, step_pct: f64 },
}

impl Default for LevelModel {
    fn default() -> Self {
        LevelModel::FixedLadder {
            levels: vec![
                DropLevel { level: 1, drop_pct: -8.0 },
                DropLevel { level: 2, drop_pct: -12.0 },
                DropLevel { level: 3, drop_pct: -16.0 },
                DropLevel { level: 4, drop_pct: -20.0 },
                DropLevel { level: 5, drop_pct: -24.0 },
            ],
        }
    }
}

impl LevelModel {
    pub fn validate(&self) -> Result<(), LevelConfigError> {
        match self {
            LevelModel::FixedLadder { levels } => {
                if levels.is_empty() {
                    return Err(LevelConfigError::EmptyLadder);
                }
                for (i, level) in levels.iter().enumerate() {
                    if level.drop_pct >= 0.0 || level.drop_pct.is_nan() {
                        return Err(LevelConfigError::NonNegativeThreshold {
                            level: level.level,
                            drop_pct: level.drop_pct,
                        });
                    }
                    if i > 0 {
                        let prev = levels[i - 1];
                        if level.level <= prev.level {
                            return Err(LevelConfigError::UnsortedLevels(level.level));
                        }
                        if level.drop_pct >= prev.drop_pct {
                            return Err(LevelConfigError::NonDecreasingThreshold(level.level));
                        }
                    }
                }
                Ok(())
            }
            LevelModel::RelativeLadder { first_drop_pct, step_pct } => {
                if !(*first_drop_pct < 0.0 && *step_pct < 0.0) {
                    return Err(LevelConfigError::InvalidRelative {
                        first: *first_drop_pct,
                        step: *step_pct,
                    });
                }
                if step_pct.abs() < MIN_STEP_PCT {
                    return Err(LevelConfigError::StepTooSmall(*step_pct));
                }
                Ok(())
            }
        }
    }

    /// The level that fires for `price`, if any.
    ///
    /// `state` must already carry this cycle's local min. At most one level
    /// fires per call.
    pub fn next_level(&self, state: &PairState, price: f64, drop_percent: f64) -> Option<u32> {
        match self {
            LevelModel::FixedLadder { levels } => levels
                .iter()
                .filter(|l| !state.is_triggered(l.level))
                .find(|l| drop_percent <= l.drop_pct)
                .map(|l| l.level),
            LevelModel::RelativeLadder { first_drop_pct, step_pct } => {
                match (state.last_signal_level, state.last_signal_price) {
                    (Some(last_level), Some(last_price)) if last_price > 0.0 => {
                        let drop_from_last = (price - last_price) / last_price * 100.0;
                        if drop_from_last > *step_pct {
                            return None;
                        }
                        // Intermediate steps crossed in one poll are skipped, not queued
                        let steps = (drop_from_last.abs() / step_pct.abs()).floor() as u32;
                        if steps == 0 {
                            return None;
                        }
                        // A level past u32::MAX would wrap below the last one
                        last_level.checked_add(steps)
                    }
                    _ => (drop_percent <= *first_drop_pct).then_some(1),
                }
            }
        }
    }

    /// Short description for status notices (e.g. "-8%, -12%, -16%")
    pub fn describe(&self) -> String {
        match self {
            LevelModel::FixedLadder { levels } => levels
                .iter()
                .map(|l| format!("{}%", l.drop_pct))
                .collect::<Vec<_>>()
                .join(", "),
            LevelModel::RelativeLadder { first_drop_pct, step_pct } => {
                format!("{}% from max, then every {}%", first_drop_pct, step_pct)
            }
        }
    }
}

/// Recovery required for a given deepest level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub level: u32,
    pub growth_pct: f64,
}

/// Step function from deepest fired level to required rebound from the local min
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Used when no level has fired or the deepest level is below every step
    pub default_growth_pct: f64,
    /// Ascending by level
    pub steps: Vec<RecoveryStep>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            default_growth_pct: 3.0,
            steps: vec![
                RecoveryStep { level: 1, growth_pct: 3.0 },
                RecoveryStep { level: 2, growth_pct: 4.0 },
                RecoveryStep { level: 3, growth_pct: 5.0 },
                RecoveryStep { level: 4, growth_pct: 6.0 },
                RecoveryStep { level: 5, growth_pct: 7.0 },
            ],
        }
    }
}

impl RecoveryPolicy {
    pub fn validate(&self) -> Result<(), LevelConfigError> {
        if !(self.default_growth_pct > 0.0) {
            return Err(LevelConfigError::NonPositiveRecovery(self.default_growth_pct));
        }
        let mut floor = self.default_growth_pct;
        let mut prev_level = None;
        for step in &self.steps {
            if prev_level.is_some_and(|prev| step.level <= prev) {
                return Err(LevelConfigError::UnsortedLevels(step.level));
            }
            if step.growth_pct < floor {
                return Err(LevelConfigError::NonMonotonicRecovery(step.level));
            }
            floor = step.growth_pct;
            prev_level = Some(step.level);
        }
        Ok(())
    }

    /// Required rebound percentage; non-decreasing in `deepest_level`
    pub fn required_growth_pct(&self, deepest_level: Option<u32>) -> f64 {
        let Some(deepest) = deepest_level else {
            return self.default_growth_pct;
        };
        self.steps
            .iter()
            .filter(|s| s.level <= deepest)
            .last()
            .map(|s| s.growth_pct)
            .unwrap_or(self.default_growth_pct)
    }
}

/// What raising the local max does to the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxUpdatePolicy {
    /// A new high ends the drawdown: the session is reset at the new max
    #[default]
    NewSession,
    /// Only the max moves; fired levels and the local min stay until a reset
    KeepSession,
}
