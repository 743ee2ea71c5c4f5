//! Per-stage transforms.
//!
//! Each function checks the stage's preconditions against the current state,
//! validates what the collaborator returned and builds the record to append.
//! Nothing here performs I/O; a failure means nothing is appended.

use crate::agents::Revision;
use crate::boardroom::{CritiqueResult, Vote, aggregate, normalize_concern};
use crate::errors::PipelineError;
use crate::pipeline::reducer::{PipelineState, check_preconditions};
use crate::pipeline::{
    BoardroomOutput, DispatchOutput, ExploreOutput, PlanDocument, RefineOutput, RevisionNote,
    StageName, StageOutput, StageRecord, WorkItem,
};
use crate::dag::TrackedItem;
use crate::planner::{SizingLimits, TaskGraph, TaskPlanner};
use std::collections::HashSet;

/// Minimum number of approaches an exploration must offer.
pub const MIN_APPROACHES: usize = 2;

fn ready(state: &PipelineState, stage: StageName) -> Result<(), PipelineError> {
    check_preconditions(state, stage, state.cycle)
}

fn invalid(stage: StageName, message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidOutput {
        stage,
        message: message.into(),
    }
}

fn missing(state: &PipelineState, stage: StageName, what: &str) -> PipelineError {
    invalid(
        stage,
        format!("no {what} in the log at cycle {}", state.cycle),
    )
}

pub fn explore(state: &PipelineState, output: ExploreOutput) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Explore)?;

    if output.approaches.len() < MIN_APPROACHES {
        return Err(invalid(
            StageName::Explore,
            format!(
                "expected at least {} approaches, got {}",
                MIN_APPROACHES,
                output.approaches.len()
            ),
        ));
    }

    let mut names = HashSet::new();
    for approach in &output.approaches {
        if !names.insert(approach.name.as_str()) {
            return Err(invalid(
                StageName::Explore,
                format!("approach '{}' is listed twice", approach.name),
            ));
        }
    }

    if !names.contains(output.recommendation.name.as_str()) {
        return Err(invalid(
            StageName::Explore,
            format!(
                "recommendation '{}' is not one of the approaches",
                output.recommendation.name
            ),
        ));
    }

    Ok(StageRecord::new(state.cycle, StageOutput::Explore(output)))
}

/// Build the plan document from the work item and the recommended approach.
///
/// Objectives are the item's goals, or its title when it has none.
pub fn plan(
    state: &PipelineState,
    work_item: &WorkItem,
    sizing: &SizingLimits,
) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Plan)?;

    let explore = state
        .explore
        .as_ref()
        .ok_or_else(|| missing(state, StageName::Plan, "exploration"))?;

    let scope = explore.recommendation.scope.clone();
    if scope.is_empty() {
        return Err(invalid(
            StageName::Plan,
            format!(
                "recommended approach '{}' declares no scope",
                explore.recommendation.name
            ),
        ));
    }

    let objectives = if work_item.goals.is_empty() {
        vec![work_item.title.clone()]
    } else {
        work_item.goals.clone()
    };

    let document = PlanDocument {
        objectives,
        constraints: work_item.constraints.clone(),
        scope,
        sizing: sizing.clone(),
    };
    Ok(StageRecord::new(state.cycle, StageOutput::Plan(document)))
}

pub fn boardroom(state: &PipelineState, votes: Vec<Vote>) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Boardroom)?;
    let outcome = aggregate(&votes)?;
    Ok(StageRecord::new(
        state.cycle,
        StageOutput::Boardroom(BoardroomOutput { votes, outcome }),
    ))
}

/// Accept a revision only if it answers every convergent concern.
pub fn refine(state: &PipelineState, revision: Revision) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Refine)?;

    let outcome = state
        .outcome
        .as_ref()
        .ok_or_else(|| missing(state, StageName::Refine, "boardroom outcome"))?;
    if outcome.result != CritiqueResult::Revise {
        return Err(PipelineError::UnexpectedOutcome {
            stage: StageName::Refine,
            expected: CritiqueResult::Revise.to_string(),
            found: outcome.result.to_string(),
        });
    }

    let resolutions: Vec<(String, String)> = revision
        .resolutions
        .into_iter()
        .map(|(concern, resolution)| (normalize_concern(&concern), resolution))
        .filter(|(_, resolution)| !resolution.trim().is_empty())
        .collect();

    let mut notes = Vec::with_capacity(outcome.convergent.len());
    for concern in &outcome.convergent {
        let resolution = resolutions
            .iter()
            .find(|(key, _)| key == concern)
            .map(|(_, resolution)| resolution.clone())
            .ok_or_else(|| PipelineError::UnresolvedConcern {
                concern: concern.clone(),
            })?;
        notes.push(RevisionNote {
            concern: concern.clone(),
            resolution,
        });
    }

    if revision.plan.scope.is_empty() {
        return Err(invalid(StageName::Refine, "revised plan declares no scope"));
    }

    Ok(StageRecord::new(
        state.cycle,
        StageOutput::Refine(RefineOutput {
            notes,
            plan: revision.plan,
        }),
    ))
}

/// Plan tasks from the approved plan, under the limits it was written with.
pub fn decompose(state: &PipelineState) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Decompose)?;
    let plan = state
        .plan
        .as_ref()
        .ok_or_else(|| missing(state, StageName::Decompose, "plan"))?;
    let graph = TaskPlanner::new(plan.sizing.clone()).plan(&plan.scope)?;
    Ok(StageRecord::new(state.cycle, StageOutput::Decompose(graph)))
}

/// The graph dispatch will materialize, after checking dispatch may run.
pub fn dispatch_graph(state: &PipelineState) -> Result<&TaskGraph, PipelineError> {
    ready(state, StageName::Dispatch)?;
    state
        .graph
        .as_ref()
        .ok_or_else(|| missing(state, StageName::Dispatch, "task graph"))
}

pub fn dispatch(state: &PipelineState, items: Vec<TrackedItem>) -> Result<StageRecord, PipelineError> {
    ready(state, StageName::Dispatch)?;
    Ok(StageRecord::new(
        state.cycle,
        StageOutput::Dispatch(DispatchOutput { items }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boardroom::{ReviewerRole, Verdict};
    use crate::pipeline::{Approach, reduce};
    use crate::planner::{ScopeItem, TaskScope};
    use std::collections::BTreeMap;

    fn approach(name: &str, scope: Vec<ScopeItem>) -> Approach {
        Approach {
            name: name.into(),
            summary: String::new(),
            tradeoffs: vec![],
            scope,
        }
    }

    fn scope() -> Vec<ScopeItem> {
        vec![
            ScopeItem::new("db", "Schema").with_scope(TaskScope::default().with_lines(900)),
            ScopeItem::new("api", "Endpoints").blocked_by(["db"]),
        ]
    }

    fn explored() -> (PipelineState, Vec<StageRecord>) {
        let output = ExploreOutput {
            approaches: vec![approach("a", scope()), approach("b", vec![])],
            recommendation: approach("a", scope()),
        };
        let record = explore(&PipelineState::default(), output).unwrap();
        let log = vec![record];
        (reduce(&log).unwrap(), log)
    }

    fn votes(verdicts: [Verdict; 5], concern: &str) -> Vec<Vote> {
        ReviewerRole::all()
            .into_iter()
            .zip(verdicts)
            .map(|(role, verdict)| Vote::new(role, verdict, "r").with_concern(concern))
            .collect()
    }

    fn planned(verdicts: [Verdict; 5]) -> (PipelineState, Vec<StageRecord>) {
        let (state, mut log) = explored();
        let item = WorkItem::new("WI-1", "Auth").with_goals(["SSO"]);
        log.push(plan(&state, &item, &SizingLimits::default()).unwrap());
        let state = reduce(&log).unwrap();
        log.push(boardroom(&state, votes(verdicts, "Rollback plan")).unwrap());
        (reduce(&log).unwrap(), log)
    }

    #[test]
    fn explore_needs_two_approaches() {
        let output = ExploreOutput {
            approaches: vec![approach("a", scope())],
            recommendation: approach("a", scope()),
        };
        let err = explore(&PipelineState::default(), output).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOutput { .. }));
    }

    #[test]
    fn explore_recommendation_must_be_listed() {
        let output = ExploreOutput {
            approaches: vec![approach("a", scope()), approach("b", scope())],
            recommendation: approach("c", scope()),
        };
        assert!(explore(&PipelineState::default(), output).is_err());
    }

    #[test]
    fn plan_takes_objectives_and_scope() {
        let (state, _) = explored();
        let item = WorkItem::new("WI-1", "Auth").with_constraints(["no downtime"]);
        let record = plan(&state, &item, &SizingLimits::default()).unwrap();
        let doc = record.content.plan().unwrap();
        assert_eq!(doc.objectives, vec!["Auth"]);
        assert_eq!(doc.constraints, vec!["no downtime"]);
        assert_eq!(doc.scope.len(), 2);
        assert_eq!(record.marker.to_string(), "plan@1");
    }

    #[test]
    fn plan_before_explore_is_fatal() {
        let item = WorkItem::new("WI-1", "Auth");
        let err = plan(&PipelineState::default(), &item, &SizingLimits::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingPredecessor { .. }));
    }

    #[test]
    fn refine_requires_revise() {
        use Verdict::*;
        let (state, _) = planned([Approve, Approve, Approve, Revise, Block]);
        let revision = Revision {
            plan: state.plan.clone().unwrap(),
            resolutions: BTreeMap::new(),
        };
        let err = refine(&state, revision).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingPredecessor { .. } | PipelineError::UnexpectedOutcome { .. }
        ));
    }

    #[test]
    fn refine_requires_every_convergent_concern_resolved() {
        use Verdict::*;
        let (state, _) = planned([Revise, Revise, Revise, Approve, Block]);
        assert_eq!(state.cycle, 2);

        let unresolved = Revision {
            plan: state.plan.clone().unwrap(),
            resolutions: BTreeMap::new(),
        };
        assert!(matches!(
            refine(&state, unresolved),
            Err(PipelineError::UnresolvedConcern { ref concern }) if concern == "rollback plan"
        ));

        let resolved = Revision {
            plan: state.plan.clone().unwrap(),
            resolutions: BTreeMap::from([(
                "ROLLBACK plan".to_string(),
                "Add a down migration".to_string(),
            )]),
        };
        let record = refine(&state, resolved).unwrap();
        assert_eq!(record.marker.to_string(), "refine@2");
        match record.content {
            StageOutput::Refine(out) => {
                assert_eq!(out.notes.len(), 1);
                assert_eq!(out.notes[0].resolution, "Add a down migration");
            }
            other => panic!("unexpected output {:?}", other.stage()),
        }
    }

    #[test]
    fn decompose_splits_under_plan_limits() {
        use Verdict::*;
        let (state, _) = planned([Approve, Approve, Approve, Revise, Block]);
        let record = decompose(&state).unwrap();
        match record.content {
            StageOutput::Decompose(graph) => {
                assert_eq!(graph.len(), 4);
                assert!(graph.get("api").unwrap().blocked_by.contains("db.3"));
            }
            other => panic!("unexpected output {:?}", other.stage()),
        }
    }

    #[test]
    fn boardroom_rejects_short_board() {
        use Verdict::*;
        let (state, mut log) = explored();
        let item = WorkItem::new("WI-1", "Auth");
        log.push(plan(&state, &item, &SizingLimits::default()).unwrap());
        let state = reduce(&log).unwrap();

        let mut short = votes([Approve; 5], "x");
        short.pop();
        assert!(matches!(
            boardroom(&state, short),
            Err(PipelineError::Consensus(_))
        ));
    }
}
