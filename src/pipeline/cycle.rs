//! Retry-loop policy applied around the boardroom outcome.

use crate::boardroom::CritiqueResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest cycle a pipeline may reach.
pub const MAX_CYCLES: u32 = 3;

/// Why a pipeline stopped. Halts are terminal states, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaltReason {
    CycleCapExceeded,
    BoardroomBlocked,
    BoardroomMixed,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleCapExceeded => "cycle-cap-exceeded",
            Self::BoardroomBlocked => "boardroom-blocked",
            Self::BoardroomMixed => "boardroom-mixed",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens after a boardroom outcome at a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDecision {
    /// Approved: move on to decomposition at the same cycle.
    Decompose,
    /// Revise within the cap: refine at the next cycle.
    Refine { next_cycle: u32 },
    Halt(HaltReason),
}

/// Apply the loop policy.
///
/// A `Revise` that would push the cycle past [`MAX_CYCLES`] halts regardless
/// of the tally. Blocked and mixed outcomes halt without consuming a cycle.
pub fn decide(result: CritiqueResult, cycle: u32) -> LoopDecision {
    match result {
        CritiqueResult::Approved => LoopDecision::Decompose,
        CritiqueResult::Revise if cycle + 1 > MAX_CYCLES => {
            LoopDecision::Halt(HaltReason::CycleCapExceeded)
        }
        CritiqueResult::Revise => LoopDecision::Refine {
            next_cycle: cycle + 1,
        },
        CritiqueResult::Blocked => LoopDecision::Halt(HaltReason::BoardroomBlocked),
        CritiqueResult::Mixed => LoopDecision::Halt(HaltReason::BoardroomMixed),
    }
}
