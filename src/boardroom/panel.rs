//! Boardroom fan-out: five independent reviews behind a hard barrier.
//!
//! All seats are launched as one batch and awaited together. Reviewers share
//! nothing but immutable references to the plan and the work item, so no seat
//! can observe another's vote. A seat that fails, times out, or answers for the
//! wrong role fails the whole board; there is no reduced quorum.

use crate::agents::Reviewer;
use crate::boardroom::{BOARD_SIZE, ReviewerRole, Vote};
use crate::errors::ConsensusError;
use crate::pipeline::{PlanDocument, WorkItem};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-seat review timeout.
pub const DEFAULT_REVIEW_TIMEOUT_SECS: u64 = 300;

/// Runs the five boardroom reviews for one cycle.
pub struct ReviewPanel {
    reviewer: Arc<dyn Reviewer>,
    timeout: Duration,
}

impl ReviewPanel {
    pub fn new(reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            reviewer,
            timeout: Duration::from_secs(DEFAULT_REVIEW_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Collect one vote per role.
    ///
    /// Returns votes in seating order, or the first seat error once every
    /// seat has settled.
    pub async fn convene(
        &self,
        plan: &PlanDocument,
        work_item: &WorkItem,
    ) -> Result<Vec<Vote>, ConsensusError> {
        info!(work_item = %work_item.id, seats = BOARD_SIZE, "Convening boardroom");

        let seats = ReviewerRole::all()
            .into_iter()
            .map(|role| self.seat(role, plan, work_item));
        let results = join_all(seats).await;

        let mut votes = Vec::with_capacity(BOARD_SIZE);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(vote) => votes.push(vote),
                Err(e) => {
                    warn!(work_item = %work_item.id, error = %e, "Boardroom seat failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(votes),
        }
    }

    async fn seat(
        &self,
        role: ReviewerRole,
        plan: &PlanDocument,
        work_item: &WorkItem,
    ) -> Result<Vote, ConsensusError> {
        debug!(role = role.agent_name(), "Requesting review");
        let vote = match tokio::time::timeout(
            self.timeout,
            self.reviewer.review(role, plan, work_item),
        )
        .await
        {
            Err(_) => {
                return Err(ConsensusError::ReviewerTimedOut {
                    role,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                return Err(ConsensusError::ReviewerFailed {
                    role,
                    message: format!("{e:#}"),
                });
            }
            Ok(Ok(vote)) => vote,
        };

        if vote.role != role {
            return Err(ConsensusError::RoleMismatch {
                expected: role,
                returned: vote.role,
            });
        }

        debug!(role = role.agent_name(), verdict = %vote.verdict, "Review received");
        Ok(vote)
    }
}
