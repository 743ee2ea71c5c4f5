//! Vote and outcome types for the boardroom.
//!
//! ## Example
//!
//! ```
//! use stagegate::boardroom::{ReviewerRole, Verdict, Vote};
//!
//! let vote = Vote::new(ReviewerRole::SecuritySentinel, Verdict::Revise, "Token storage is unclear")
//!     .with_concern("secret storage");
//! assert_eq!(vote.concerns, vec!["secret storage".to_string()]);
//! ```

use crate::boardroom::ReviewerRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One reviewer's verdict on a plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Revise,
    Block,
}

impl Verdict {
    pub fn all() -> [Self; 3] {
        [Self::Approve, Self::Revise, Self::Block]
    }

    /// The outcome this verdict produces when it holds the majority.
    pub fn as_result(&self) -> CritiqueResult {
        match self {
            Self::Approve => CritiqueResult::Approved,
            Self::Revise => CritiqueResult::Revise,
            Self::Block => CritiqueResult::Blocked,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Revise => "revise",
            Self::Block => "block",
        };
        write!(f, "{}", s)
    }
}

/// A single reviewer vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub role: ReviewerRole,
    pub verdict: Verdict,
    pub rationale: String,
    /// Free-text concern identifiers raised by this reviewer.
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl Vote {
    pub fn new(role: ReviewerRole, verdict: Verdict, rationale: impl Into<String>) -> Self {
        Self {
            role,
            verdict,
            rationale: rationale.into(),
            concerns: Vec::new(),
        }
    }

    pub fn with_concern(mut self, concern: impl Into<String>) -> Self {
        self.concerns.push(concern.into());
        self
    }

    pub fn with_concerns(mut self, concerns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.concerns.extend(concerns.into_iter().map(Into::into));
        self
    }
}

/// Aggregated result of a boardroom session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CritiqueResult {
    Approved,
    Revise,
    Blocked,
    /// No verdict reached a majority.
    Mixed,
}

impl fmt::Display for CritiqueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Revise => "revise",
            Self::Blocked => "blocked",
            Self::Mixed => "mixed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of aggregating exactly five votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueOutcome {
    pub result: CritiqueResult,
    /// Count per verdict; every verdict is present, zero included.
    pub tally: BTreeMap<Verdict, usize>,
    /// Concerns raised by two or more distinct roles.
    pub convergent: BTreeSet<String>,
    /// Concerns raised by exactly one role.
    pub divergent: BTreeSet<String>,
}

impl CritiqueOutcome {
    pub fn count(&self, verdict: Verdict) -> usize {
        self.tally.get(&verdict).copied().unwrap_or(0)
    }
}

impl fmt::Display for CritiqueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (approve {}, revise {}, block {}; {} convergent, {} divergent)",
            self.result,
            self.count(Verdict::Approve),
            self.count(Verdict::Revise),
            self.count(Verdict::Block),
            self.convergent.len(),
            self.divergent.len()
        )
    }
}
