//! Property tests for the consensus gate, the cycle loop, the planner and
//! dispatch.

use proptest::prelude::*;
use stagegate::agents::Revision;
use stagegate::boardroom::{ReviewerRole, Verdict, Vote, aggregate};
use stagegate::dag::{DispatchScheduler, order};
use stagegate::governance::{self, MISSING, Requirement, RequirementCheck};
use stagegate::pipeline::runner;
use stagegate::pipeline::{
    Approach, ExploreOutput, HaltReason, MAX_CYCLES, PipelineState, StageName, StageOutput,
    StageRecord, WorkItem, reduce,
};
use stagegate::planner::{ScopeItem, SizingLimits, TaskPlanner, TaskScope};
use stagegate::store::MemoryStore;
use std::collections::{BTreeSet, HashMap};

// =============================================================================
// Strategies
// =============================================================================

fn ballots() -> impl Strategy<Value = Vec<Vote>> {
    let concern = prop::sample::select(vec![
        "Rollback plan",
        "  rollback   PLAN ",
        "Key rotation",
        "cost",
        "",
    ]);
    (
        prop::array::uniform5(0usize..3),
        prop::collection::vec(prop::collection::vec(concern, 0..4), 5),
    )
        .prop_map(|(verdicts, concerns)| {
            ReviewerRole::all()
                .into_iter()
                .zip(verdicts)
                .zip(concerns)
                .map(|((role, v), c)| Vote::new(role, Verdict::all()[v], "rationale").with_concerns(c))
                .collect()
        })
}

/// Scope items whose dependencies only point backwards, so the input is a DAG.
fn scope_items() -> impl Strategy<Value = Vec<ScopeItem>> {
    (1usize..8)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(0usize..1500, n),
                prop::collection::vec(0usize..14, n),
                prop::collection::vec(any::<u8>(), n),
            )
        })
        .prop_map(|(lines, files, masks)| {
            (0..lines.len())
                .map(|i| {
                    let deps: Vec<String> = (0..i)
                        .filter(|j| masks[i] & (1u8 << j) != 0)
                        .map(|j| format!("t{j}"))
                        .collect();
                    let scope = TaskScope::default()
                        .with_lines(lines[i])
                        .with_files((0..files[i]).map(|f| format!("src/m{i}/f{f}.rs")));
                    ScopeItem::new(format!("t{i}"), format!("Task {i}"))
                        .with_scope(scope)
                        .blocked_by(deps)
                })
                .collect()
        })
}

#[derive(Debug, Clone, Copy)]
enum Board {
    Approve,
    Revise,
    Block,
    Mixed,
}

fn board() -> impl Strategy<Value = Board> {
    prop_oneof![
        Just(Board::Approve),
        Just(Board::Revise),
        Just(Board::Block),
        Just(Board::Mixed),
    ]
}

fn votes_for(board: Board) -> Vec<Vote> {
    use Verdict::*;
    let verdicts = match board {
        Board::Approve => [Approve; 5],
        Board::Revise => [Revise; 5],
        Board::Block => [Block; 5],
        Board::Mixed => [Approve, Approve, Revise, Revise, Block],
    };
    ReviewerRole::all()
        .into_iter()
        .zip(verdicts)
        .map(|(role, verdict)| Vote::new(role, verdict, "r").with_concern("Rollback plan"))
        .collect()
}

// =============================================================================
// Consensus
// =============================================================================

proptest! {
    #[test]
    fn aggregation_ignores_vote_order(
        (votes, shuffled) in ballots().prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let a = aggregate(&votes).unwrap();
        let b = aggregate(&shuffled).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        prop_assert_eq!(a, b);
    }

    #[test]
    fn tally_and_concern_partition_are_consistent(votes in ballots()) {
        let outcome = aggregate(&votes).unwrap();
        prop_assert_eq!(outcome.tally.len(), 3);
        prop_assert_eq!(outcome.tally.values().sum::<usize>(), 5);
        prop_assert!(outcome.convergent.is_disjoint(&outcome.divergent));
        prop_assert!(!outcome.convergent.contains(""));
        prop_assert!(!outcome.divergent.contains(""));
    }
}

// =============================================================================
// Cycle loop
// =============================================================================

fn push(log: &mut Vec<StageRecord>, record: StageRecord) -> PipelineState {
    log.push(record);
    reduce(log).unwrap()
}

proptest! {
    #[test]
    fn cycle_never_exceeds_the_cap(script in prop::collection::vec(board(), 1..6)) {
        let scope = vec![ScopeItem::new("core", "Core")];
        let approach = |name: &str| Approach {
            name: name.into(),
            summary: String::new(),
            tradeoffs: vec![],
            scope: scope.clone(),
        };
        let item = WorkItem::new("WI-1", "Cycle");

        let mut log = Vec::new();
        let state = PipelineState::default();
        let explore = ExploreOutput {
            approaches: vec![approach("a"), approach("b")],
            recommendation: approach("a"),
        };
        let state = push(&mut log, runner::explore(&state, explore).unwrap());
        let mut state = push(
            &mut log,
            runner::plan(&state, &item, &SizingLimits::default()).unwrap(),
        );

        let mut boardrooms = 0;
        for board in &script {
            if state.next_stage() == Some(StageName::Refine) {
                let outcome = state.outcome.clone().unwrap();
                let revision = Revision {
                    plan: state.plan.clone().unwrap(),
                    resolutions: outcome
                        .convergent
                        .iter()
                        .map(|c| (c.clone(), "done".to_string()))
                        .collect(),
                };
                state = push(&mut log, runner::refine(&state, revision).unwrap());
            }
            if state.next_stage() != Some(StageName::Boardroom) {
                break;
            }
            state = push(&mut log, runner::boardroom(&state, votes_for(*board)).unwrap());
            boardrooms += 1;
            prop_assert!((1..=MAX_CYCLES).contains(&state.cycle));
        }

        prop_assert!(boardrooms <= MAX_CYCLES as usize);
        let leading_revises = script.iter().take_while(|b| matches!(b, Board::Revise)).count();
        if leading_revises >= MAX_CYCLES as usize {
            prop_assert_eq!(state.halt_reason, Some(HaltReason::CycleCapExceeded));
        }
    }
}

// =============================================================================
// Planning and dispatch
// =============================================================================

proptest! {
    #[test]
    fn planned_tasks_fit_and_conserve_scope(items in scope_items()) {
        let limits = SizingLimits::default();
        let graph = TaskPlanner::new(limits.clone()).plan(&items).unwrap();

        for task in graph.tasks() {
            prop_assert!(limits.fits(&task.scope.estimate()), "{} exceeds limits", task.id);
        }

        for item in &items {
            let parts: Vec<_> = graph.tasks().iter().filter(|t| t.origin == item.id).collect();
            prop_assert!(!parts.is_empty());
            prop_assert_eq!(parts.iter().map(|t| t.scope.lines).sum::<usize>(), item.scope.lines);
            let files: Vec<String> = parts.iter().flat_map(|t| t.scope.files.clone()).collect();
            prop_assert_eq!(&files, &item.scope.files);
        }
    }

    #[test]
    fn order_puts_blockers_first(items in scope_items()) {
        let graph = TaskPlanner::new(SizingLimits::default()).plan(&items).unwrap();
        let ordered = order(&graph);
        prop_assert_eq!(ordered.len(), graph.len());

        let position: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        for task in graph.tasks() {
            for blocker in &task.blocked_by {
                prop_assert!(position[blocker.as_str()] < position[task.id.as_str()]);
            }
        }
    }

    #[test]
    fn dispatch_resolves_every_reference(items in scope_items()) {
        let graph = TaskPlanner::new(SizingLimits::default()).plan(&items).unwrap();
        let store = MemoryStore::new();
        let item = WorkItem::new("WI-9", "Dispatch").with_human_gate(true);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let created = runtime
            .block_on(DispatchScheduler::new(&store, &item, 1).dispatch(&graph, item.human_gate))
            .unwrap();

        prop_assert_eq!(created.len(), graph.len());
        let mut seen = BTreeSet::new();
        for tracked in &created {
            for blocker in &tracked.blocked_by {
                prop_assert!(seen.contains(blocker), "{} blocked by unknown {}", tracked.id, blocker);
            }
            let task = graph.get(&tracked.task_id).unwrap();
            prop_assert_eq!(tracked.blocked_by.len(), task.blocked_by.len());
            seen.insert(tracked.id.clone());
        }
    }
}

// =============================================================================
// Governance
// =============================================================================

proptest! {
    #[test]
    fn governance_is_deterministic(objectives in prop::collection::vec("[a-z]{1,8}", 0..4), min in 0usize..4) {
        let output = StageOutput::Plan(stagegate::pipeline::PlanDocument {
            objectives,
            constraints: vec![],
            scope: vec![ScopeItem::new("core", "Core")],
            sizing: SizingLimits::default(),
        });
        let requirements = vec![
            Requirement {
                id: "objectives".into(),
                description: "objectives listed".into(),
                stage: Some(StageName::Plan),
                check: RequirementCheck::MinItems { pointer: "/objectives".into(), min },
            },
            Requirement {
                id: "scope".into(),
                description: "scope present".into(),
                stage: None,
                check: RequirementCheck::Present { pointer: "/scope/0/id".into() },
            },
        ];

        let first = governance::validate(&requirements, &output);
        let second = governance::validate(&requirements, &output);
        prop_assert_eq!(&first, &second);
        for coverage in &first.coverage {
            prop_assert_eq!(coverage.satisfied, coverage.evidence != MISSING);
        }
    }
}
