//! Majority-rule aggregation of the five boardroom votes.
//!
//! The aggregate is a function of the vote multiset only: every container in
//! the outcome is ordered, so any permutation of the same votes serializes to
//! the same bytes.

use crate::boardroom::{BOARD_SIZE, CritiqueOutcome, CritiqueResult, ReviewerRole, Verdict, Vote};
use crate::errors::ConsensusError;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Votes needed for a verdict to carry the board.
pub const MAJORITY: usize = 3;

/// Aggregate exactly five votes from five distinct roles.
///
/// The caller owns the fan-out barrier; this function only checks the input
/// contract and never sees a partial board.
pub fn aggregate(votes: &[Vote]) -> Result<CritiqueOutcome, ConsensusError> {
    if votes.len() != BOARD_SIZE {
        return Err(ConsensusError::WrongVoteCount { got: votes.len() });
    }

    let mut seen: HashSet<ReviewerRole> = HashSet::new();
    for vote in votes {
        if !seen.insert(vote.role) {
            return Err(ConsensusError::DuplicateRole { role: vote.role });
        }
    }

    let mut tally: BTreeMap<Verdict, usize> = Verdict::all().into_iter().map(|v| (v, 0)).collect();
    for vote in votes {
        *tally.entry(vote.verdict).or_insert(0) += 1;
    }

    let result = tally
        .iter()
        .find(|&(_, &count)| count >= MAJORITY)
        .map_or(CritiqueResult::Mixed, |(verdict, _)| verdict.as_result());

    let (convergent, divergent) = partition_concerns(votes);

    Ok(CritiqueOutcome {
        result,
        tally,
        convergent,
        divergent,
    })
}

/// Group concerns by the number of distinct roles that raised them.
fn partition_concerns(votes: &[Vote]) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut raised_by: BTreeMap<String, BTreeSet<ReviewerRole>> = BTreeMap::new();
    for vote in votes {
        for concern in &vote.concerns {
            let key = normalize_concern(concern);
            if key.is_empty() {
                continue;
            }
            raised_by.entry(key).or_default().insert(vote.role);
        }
    }

    let mut convergent = BTreeSet::new();
    let mut divergent = BTreeSet::new();
    for (concern, roles) in raised_by {
        if roles.len() >= 2 {
            convergent.insert(concern);
        } else {
            divergent.insert(concern);
        }
    }
    (convergent, divergent)
}

/// Canonical form used to group concern identifiers.
pub fn normalize_concern(concern: &str) -> String {
    concern
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
