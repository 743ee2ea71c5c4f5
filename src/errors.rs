//! Typed error hierarchy for the planning pipeline.
//!
//! Four enums cover the subsystems:
//! - `PipelineError`: state reduction and stage precondition failures
//! - `ConsensusError`: boardroom input-contract violations
//! - `PlanningError`: task sizing and dependency graph failures
//! - `DispatchError`: materialization of tracked items
//!
//! Policy halts (blocked, mixed, cycle cap) are not errors; they live in
//! `PipelineState::halt_reason`.

use crate::boardroom::ReviewerRole;
use crate::pipeline::StageName;
use thiserror::Error;

/// Errors from state reduction and stage execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} at cycle {cycle} requires the {predecessor} marker at cycle {predecessor_cycle}, which is absent")]
    MissingPredecessor {
        stage: StageName,
        cycle: u32,
        predecessor: StageName,
        predecessor_cycle: u32,
    },

    #[error("Duplicate completion marker for {stage} at cycle {cycle}")]
    DuplicateMarker { stage: StageName, cycle: u32 },

    #[error("Marker {marker} does not match record {stage} at cycle {cycle}")]
    MarkerMismatch {
        marker: String,
        stage: StageName,
        cycle: u32,
    },

    #[error("Record {stage} carries cycle {cycle} but the pipeline is at cycle {expected}")]
    CycleMismatch {
        stage: StageName,
        cycle: u32,
        expected: u32,
    },

    #[error("Stage {stage} requires a {expected} boardroom outcome, found {found}")]
    UnexpectedOutcome {
        stage: StageName,
        expected: String,
        found: String,
    },

    #[error("Stage {stage} at cycle {cycle} is out of order; expected {expected}")]
    OutOfOrder {
        stage: StageName,
        cycle: u32,
        expected: String,
    },

    #[error("Record for {stage} carries {found} output")]
    OutputMismatch { stage: StageName, found: StageName },

    #[error("Invalid {stage} output: {message}")]
    InvalidOutput { stage: StageName, message: String },

    #[error("Convergent concern '{concern}' has no resolution")]
    UnresolvedConcern { concern: String },

    #[error("Pipeline for {work_item} is halted: {reason}")]
    Halted { work_item: String, reason: String },

    #[error("Pipeline for {work_item} has already dispatched")]
    AlreadyComplete { work_item: String },

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Collaborator {name} failed: {source}")]
    Collaborator {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errors from the boardroom vote aggregation contract.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Boardroom requires exactly 5 votes, got {got}")]
    WrongVoteCount { got: usize },

    #[error("Role {role} voted more than once")]
    DuplicateRole { role: ReviewerRole },

    #[error("Reviewer {role} failed: {message}")]
    ReviewerFailed { role: ReviewerRole, message: String },

    #[error("Reviewer {role} did not report within {timeout_secs}s")]
    ReviewerTimedOut { role: ReviewerRole, timeout_secs: u64 },

    #[error("Reviewer invoked as {expected} returned a vote for {returned}")]
    RoleMismatch {
        expected: ReviewerRole,
        returned: ReviewerRole,
    },
}

/// Errors from task sizing and dependency graph construction.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Plan has no scope items")]
    NoScopeItems,

    #[error("Duplicate task id: {id}")]
    DuplicateTask { id: String },

    #[error("Unknown dependency '{dependency}' in task '{task}': no task with that id exists")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected in task dependencies. Involved tasks: {involved:?}")]
    CyclicDependency { involved: Vec<String> },

    #[error("Task {id} cannot be split to fit limits: {message}")]
    Unsplittable { id: String, message: String },
}

/// Errors from tracked item materialization.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Human gate not approved for {work_item}")]
    GateNotApproved { work_item: String },

    #[error("Task {task} references {dependency}, which has not been materialized")]
    UnresolvedReference { task: String, dependency: String },

    #[error("Tracker rejected {task}: {source}")]
    Tracker {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to list tracked items for {work_item}: {source}")]
    TrackerUnavailable {
        work_item: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_predecessor_names_both_stages() {
        let err = PipelineError::MissingPredecessor {
            stage: StageName::Boardroom,
            cycle: 1,
            predecessor: StageName::Plan,
            predecessor_cycle: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("boardroom"));
        assert!(msg.contains("plan"));
    }

    #[test]
    fn consensus_error_converts_into_pipeline_error() {
        let inner = ConsensusError::WrongVoteCount { got: 4 };
        let err: PipelineError = inner.into();
        match &err {
            PipelineError::Consensus(ConsensusError::WrongVoteCount { got }) => assert_eq!(*got, 4),
            _ => panic!("Expected PipelineError::Consensus(WrongVoteCount)"),
        }
    }

    #[test]
    fn cyclic_dependency_lists_involved_tasks() {
        let err = PlanningError::CyclicDependency {
            involved: vec!["T1".into(), "T2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Cycle"));
        assert!(msg.contains("T1"));
    }

    #[test]
    fn gate_not_approved_is_matchable() {
        let err: PipelineError = DispatchError::GateNotApproved {
            work_item: "WI-7".into(),
        }
        .into();
        assert!(matches!(
            err,
            PipelineError::Dispatch(DispatchError::GateNotApproved { .. })
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::AlreadyComplete {
            work_item: "x".into(),
        });
        assert_std_error(&ConsensusError::WrongVoteCount { got: 0 });
        assert_std_error(&PlanningError::NoScopeItems);
        assert_std_error(&DispatchError::GateNotApproved {
            work_item: "x".into(),
        });
    }
}
