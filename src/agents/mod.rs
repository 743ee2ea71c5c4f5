//! Collaborator seams.
//!
//! The engine never does research, reviewing or plan revision itself. It
//! calls out through these traits; [`CommandAgent`] implements all three by
//! shelling out to a configured program, and tests plug in fakes.

mod command;

pub use command::{AgentRequest, CommandAgent, extract_json};

use crate::boardroom::{CritiqueOutcome, ReviewerRole, Vote};
use crate::pipeline::{ExploreOutput, PlanDocument, WorkItem};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Produces candidate approaches for a topic.
#[async_trait]
pub trait ResearchEngine: Send + Sync {
    /// Returns at least two approaches and one recommendation among them.
    async fn explore(&self, topic: &str, context: &str) -> Result<ExploreOutput>;
}

/// Casts one boardroom vote.
///
/// Invoked once per role per cycle. Implementations see only the plan and the
/// work item, never another role's vote.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        role: ReviewerRole,
        plan: &PlanDocument,
        work_item: &WorkItem,
    ) -> Result<Vote>;
}

/// Revises a plan after a `Revise` outcome.
#[async_trait]
pub trait PlanReviser: Send + Sync {
    async fn revise(
        &self,
        plan: &PlanDocument,
        outcome: &CritiqueOutcome,
        work_item: &WorkItem,
    ) -> Result<Revision>;
}

/// A revised plan and how each concern was addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub plan: PlanDocument,
    /// Resolution text keyed by concern identifier.
    #[serde(default)]
    pub resolutions: BTreeMap<String, String>,
}
