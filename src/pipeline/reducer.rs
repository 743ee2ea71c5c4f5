//! Pipeline state as a pure fold over a work item's event log.
//!
//! Nothing here is stored. Every caller re-derives the state from the records
//! it read, so two replays of the same log always agree.

use crate::boardroom::{CritiqueOutcome, CritiqueResult, aggregate};
use crate::errors::PipelineError;
use crate::pipeline::cycle::{self, HaltReason, LoopDecision, MAX_CYCLES};
use crate::pipeline::{
    CompletionMarker, ExploreOutput, PlanDocument, StageName, StageOutput, StageRecord,
};
use crate::planner::TaskGraph;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Derived state of one work item's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    /// Last stage applied, `None` before exploration.
    pub current_stage: Option<StageName>,
    /// Current cycle, always within `1..=MAX_CYCLES`.
    pub cycle: u32,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
    /// Result of the most recent boardroom.
    pub result: Option<CritiqueResult>,
    pub outcome: Option<CritiqueOutcome>,
    /// Markers applied to the state. Records ignored after a halt are not here.
    pub markers: BTreeSet<CompletionMarker>,
    pub explore: Option<ExploreOutput>,
    /// The plan the next boardroom reviews: the plan stage output, replaced
    /// by each refinement.
    pub plan: Option<PlanDocument>,
    pub graph: Option<TaskGraph>,
    /// Number of records that contributed to the state.
    pub applied: usize,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            current_stage: None,
            cycle: 1,
            halted: false,
            halt_reason: None,
            result: None,
            outcome: None,
            markers: BTreeSet::new(),
            explore: None,
            plan: None,
            graph: None,
            applied: 0,
        }
    }
}

impl PipelineState {
    /// The stage that should run next, or `None` when halted or dispatched.
    pub fn next_stage(&self) -> Option<StageName> {
        if self.halted {
            return None;
        }
        match self.current_stage {
            None => Some(StageName::Explore),
            Some(StageName::Explore) => Some(StageName::Plan),
            Some(StageName::Plan) | Some(StageName::Refine) => Some(StageName::Boardroom),
            Some(StageName::Boardroom) => match self.result {
                Some(CritiqueResult::Approved) => Some(StageName::Decompose),
                Some(CritiqueResult::Revise) => Some(StageName::Refine),
                _ => None,
            },
            Some(StageName::Decompose) => Some(StageName::Dispatch),
            Some(StageName::Dispatch) => None,
        }
    }

    /// Check if the pipeline has dispatched its tasks.
    pub fn is_complete(&self) -> bool {
        self.current_stage == Some(StageName::Dispatch)
    }

    pub fn has_marker(&self, marker: &CompletionMarker) -> bool {
        self.markers.contains(marker)
    }

    fn halt(&mut self, reason: HaltReason) {
        self.halted = true;
        self.halt_reason = Some(reason);
    }

    fn apply(&mut self, record: &StageRecord) -> Result<(), PipelineError> {
        match &record.content {
            StageOutput::Explore(explore) => self.explore = Some(explore.clone()),
            StageOutput::Plan(plan) => self.plan = Some(plan.clone()),
            StageOutput::Boardroom(boardroom) => {
                let recomputed = aggregate(&boardroom.votes)?;
                if recomputed != boardroom.outcome {
                    return Err(PipelineError::InvalidOutput {
                        stage: StageName::Boardroom,
                        message: format!(
                            "recorded outcome '{}' does not match its votes ('{}')",
                            boardroom.outcome, recomputed
                        ),
                    });
                }
                let result = boardroom.outcome.result;
                self.result = Some(result);
                self.outcome = Some(boardroom.outcome.clone());
                match cycle::decide(result, record.cycle) {
                    LoopDecision::Decompose => {}
                    LoopDecision::Refine { next_cycle } => self.cycle = next_cycle,
                    LoopDecision::Halt(reason) => self.halt(reason),
                }
            }
            StageOutput::Refine(refine) => self.plan = Some(refine.plan.clone()),
            StageOutput::Decompose(graph) => self.graph = Some(graph.clone()),
            StageOutput::Dispatch(_) => {}
        }
        self.current_stage = Some(record.stage);
        self.markers.insert(record.marker);
        self.applied += 1;
        Ok(())
    }
}

/// Fold an ordered log into the pipeline state.
///
/// Structural problems (mismatched or duplicate markers, missing
/// predecessors, records out of cycle or out of order) are fatal. Policy
/// halts are not: once halted, later records stay in the log but no longer
/// move the state.
pub fn reduce(log: &[StageRecord]) -> Result<PipelineState, PipelineError> {
    let mut state = PipelineState::default();
    let mut seen: BTreeSet<CompletionMarker> = BTreeSet::new();

    for record in log {
        check_record(record)?;
        if !seen.insert(record.marker) {
            return Err(PipelineError::DuplicateMarker {
                stage: record.stage,
                cycle: record.cycle,
            });
        }

        if state.halted {
            debug!(marker = %record.marker, "Ignoring record after halt");
            continue;
        }

        if record.cycle > MAX_CYCLES {
            state.halt(HaltReason::CycleCapExceeded);
            continue;
        }

        check_preconditions(&state, record.stage, record.cycle)?;
        state.apply(record)?;
    }

    Ok(state)
}

/// A record's marker and content must agree with its own `(stage, cycle)`.
fn check_record(record: &StageRecord) -> Result<(), PipelineError> {
    if record.marker != CompletionMarker::new(record.stage, record.cycle) {
        return Err(PipelineError::MarkerMismatch {
            marker: record.marker.to_string(),
            stage: record.stage,
            cycle: record.cycle,
        });
    }
    let found = record.content.stage();
    if found != record.stage {
        return Err(PipelineError::OutputMismatch {
            stage: record.stage,
            found,
        });
    }
    Ok(())
}

/// Preconditions for running `stage` at `cycle` from `state`.
///
/// Shared by the reducer, which checks recorded history, and the stage
/// runner, which checks before producing a new record.
pub fn check_preconditions(
    state: &PipelineState,
    stage: StageName,
    cycle: u32,
) -> Result<(), PipelineError> {
    if let Some(required) = stage.predecessor(cycle)
        && !state.has_marker(&required)
    {
        return Err(PipelineError::MissingPredecessor {
            stage,
            cycle,
            predecessor: required.stage(),
            predecessor_cycle: required.cycle(),
        });
    }

    if cycle != state.cycle {
        return Err(PipelineError::CycleMismatch {
            stage,
            cycle,
            expected: state.cycle,
        });
    }

    let required_result = match stage {
        StageName::Refine => Some(CritiqueResult::Revise),
        StageName::Decompose => Some(CritiqueResult::Approved),
        _ => None,
    };
    if let Some(expected) = required_result
        && state.result != Some(expected)
    {
        return Err(PipelineError::UnexpectedOutcome {
            stage,
            expected: expected.to_string(),
            found: state
                .result
                .map_or_else(|| "none".to_string(), |r| r.to_string()),
        });
    }

    let next = state.next_stage();
    if next != Some(stage) {
        return Err(PipelineError::OutOfOrder {
            stage,
            cycle,
            expected: next.map_or_else(|| "no further stage".to_string(), |s| s.to_string()),
        });
    }

    Ok(())
}
