use crate::core::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Acquisition phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AcquisitionPhase {
    Idle,
    InitialBaseline,
    Stimulus { direction: Direction, cycle: u32 },
    BetweenTrials { direction: Direction, cycle: u32 },
    FinalBaseline,
    Complete,
    Aborted,
}

impl AcquisitionPhase {
    /// Check if transition from current phase to target phase is valid
    pub fn can_transition_to(&self, target: &AcquisitionPhase) -> bool {
        use AcquisitionPhase::*;

        if matches!(target, Aborted) {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Idle, InitialBaseline) |
            (InitialBaseline, Stimulus { .. }) |
            (Stimulus { .. }, BetweenTrials { .. }) |
            (BetweenTrials { .. }, Stimulus { .. }) |
            (BetweenTrials { .. }, FinalBaseline) |
            (FinalBaseline, Complete) |
            (Complete, Idle) |
            (Aborted, Idle)
        )
    }

    /// Idle, Complete and Aborted cannot be aborted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Aborted)
    }

    /// Phases during which the background frame is shown
    pub fn shows_background(&self) -> bool {
        matches!(
            self,
            Self::InitialBaseline | Self::BetweenTrials { .. } | Self::FinalBaseline
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::InitialBaseline => "INITIAL_BASELINE",
            Self::Stimulus { .. } => "STIMULUS",
            Self::BetweenTrials { .. } => "BETWEEN_TRIALS",
            Self::FinalBaseline => "FINAL_BASELINE",
            Self::Complete => "COMPLETE",
            Self::Aborted => "ABORTED",
        }
    }
}

impl Default for AcquisitionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for AcquisitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stimulus { direction, cycle } | Self::BetweenTrials { direction, cycle } => {
                write!(f, "{}({} cycle {})", self.name(), direction, cycle)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Ordered phase plan of one session, excluding Idle and Complete
pub fn phase_plan(directions: &[Direction], cycles: u32) -> Vec<AcquisitionPhase> {
    let mut plan = vec![AcquisitionPhase::InitialBaseline];
    for &direction in directions {
        for cycle in 0..cycles {
            plan.push(AcquisitionPhase::Stimulus { direction, cycle });
            plan.push(AcquisitionPhase::BetweenTrials { direction, cycle });
        }
    }
    plan.push(AcquisitionPhase::FinalBaseline);
    plan
}
