//! Stage names, completion markers, stage records and their output schemas.

use crate::boardroom::{CritiqueOutcome, Vote};
use crate::dag::TrackedItem;
use crate::planner::{ScopeItem, SizingLimits, TaskGraph};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stage of the planning pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Explore,
    Plan,
    Boardroom,
    Refine,
    Decompose,
    Dispatch,
}

impl StageName {
    pub fn all() -> [Self; 6] {
        [
            Self::Explore,
            Self::Plan,
            Self::Boardroom,
            Self::Refine,
            Self::Decompose,
            Self::Dispatch,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::Plan => "plan",
            Self::Boardroom => "boardroom",
            Self::Refine => "refine",
            Self::Decompose => "decompose",
            Self::Dispatch => "dispatch",
        }
    }

    /// The marker that must already exist before this stage may run at `cycle`.
    ///
    /// `None` for the entry stage. Refine looks back one cycle because a
    /// `Revise` outcome advances the cycle before refinement starts.
    pub fn predecessor(&self, cycle: u32) -> Option<CompletionMarker> {
        match self {
            Self::Explore => None,
            Self::Plan => Some(CompletionMarker::new(Self::Explore, cycle)),
            Self::Boardroom if cycle <= 1 => Some(CompletionMarker::new(Self::Plan, cycle)),
            Self::Boardroom => Some(CompletionMarker::new(Self::Refine, cycle)),
            Self::Refine => Some(CompletionMarker::new(
                Self::Boardroom,
                cycle.saturating_sub(1),
            )),
            Self::Decompose => Some(CompletionMarker::new(Self::Boardroom, cycle)),
            Self::Dispatch => Some(CompletionMarker::new(Self::Decompose, cycle)),
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|stage| stage.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid stage '{}'. Valid values: explore, plan, boardroom, refine, decompose, dispatch",
                    s
                )
            })
    }
}

/// Opaque tag identifying the completion of a stage at a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionMarker {
    stage: StageName,
    cycle: u32,
}

impl CompletionMarker {
    pub fn new(stage: StageName, cycle: u32) -> Self {
        Self { stage, cycle }
    }

    pub fn stage(&self) -> StageName {
        self.stage
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }
}

impl fmt::Display for CompletionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stage, self.cycle)
    }
}

/// The unit under planning. Created outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Human approval signal; set externally, read-only to the engine.
    #[serde(default)]
    pub human_gate: bool,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            goals: Vec::new(),
            constraints: Vec::new(),
            human_gate: false,
        }
    }

    pub fn with_goals(mut self, goals: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.goals = goals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constraints(
        mut self,
        constraints: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_human_gate(mut self, approved: bool) -> Self {
        self.human_gate = approved;
        self
    }

    /// Goals and constraints as a single context block for collaborators.
    pub fn context(&self) -> String {
        let mut out = String::new();
        if !self.goals.is_empty() {
            out.push_str("Goals:\n");
            for goal in &self.goals {
                out.push_str(&format!("- {}\n", goal));
            }
        }
        if !self.constraints.is_empty() {
            out.push_str("Constraints:\n");
            for constraint in &self.constraints {
                out.push_str(&format!("- {}\n", constraint));
            }
        }
        out
    }
}

/// A candidate approach produced by exploration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approach {
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub tradeoffs: Vec<String>,
    /// Scope items the approach would need.
    #[serde(default)]
    pub scope: Vec<ScopeItem>,
}

/// Explore stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreOutput {
    pub approaches: Vec<Approach>,
    pub recommendation: Approach,
}

/// Plan stage output, and the document every boardroom seat reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub objectives: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub scope: Vec<ScopeItem>,
    pub sizing: SizingLimits,
}

/// Boardroom stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardroomOutput {
    pub votes: Vec<Vote>,
    pub outcome: CritiqueOutcome,
}

/// How a convergent concern was addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNote {
    pub concern: String,
    pub resolution: String,
}

/// Refine stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineOutput {
    pub notes: Vec<RevisionNote>,
    /// The revised plan the next boardroom reviews.
    pub plan: PlanDocument,
}

/// Dispatch stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutput {
    pub items: Vec<TrackedItem>,
}

/// Structured output of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "output", rename_all = "lowercase")]
pub enum StageOutput {
    Explore(ExploreOutput),
    Plan(PlanDocument),
    Boardroom(BoardroomOutput),
    Refine(RefineOutput),
    Decompose(TaskGraph),
    Dispatch(DispatchOutput),
}

impl StageOutput {
    pub fn stage(&self) -> StageName {
        match self {
            Self::Explore(_) => StageName::Explore,
            Self::Plan(_) => StageName::Plan,
            Self::Boardroom(_) => StageName::Boardroom,
            Self::Refine(_) => StageName::Refine,
            Self::Decompose(_) => StageName::Decompose,
            Self::Dispatch(_) => StageName::Dispatch,
        }
    }

    /// The plan carried by this output, if it carries one.
    pub fn plan(&self) -> Option<&PlanDocument> {
        match self {
            Self::Plan(plan) => Some(plan),
            Self::Refine(refine) => Some(&refine.plan),
            _ => None,
        }
    }
}

/// One immutable entry in a work item's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub cycle: u32,
    pub content: StageOutput,
    pub marker: CompletionMarker,
}

impl StageRecord {
    /// Build a record whose stage and marker agree with its content.
    pub fn new(cycle: u32, content: StageOutput) -> Self {
        let stage = content.stage();
        Self {
            stage,
            cycle,
            content,
            marker: CompletionMarker::new(stage, cycle),
        }
    }
}
