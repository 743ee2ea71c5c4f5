//! The pipeline driver.
//!
//! One `advance` reads the log, reduces it, runs exactly one stage and
//! appends its record. All checks happen before the append, so a failed
//! stage leaves the log as it was.

use crate::agents::{PlanReviser, ResearchEngine};
use crate::boardroom::ReviewPanel;
use crate::dag::DispatchScheduler;
use crate::errors::PipelineError;
use crate::governance::{self, GovernanceReport, GovernanceVerdict, Requirement};
use crate::pipeline::reducer::{PipelineState, reduce};
use crate::pipeline::{StageName, StageRecord, WorkItem, runner};
use crate::planner::SizingLimits;
use crate::store::ThreadStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one successful `advance`.
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub record: StageRecord,
    /// State after the record was appended.
    pub state: PipelineState,
    /// Present when requirements apply to the stage that ran.
    pub governance: Option<GovernanceReport>,
}

/// Result of `run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub steps: Vec<AdvanceOutcome>,
    pub state: PipelineState,
}

pub struct Engine {
    store: Arc<dyn ThreadStore>,
    research: Arc<dyn ResearchEngine>,
    panel: ReviewPanel,
    reviser: Arc<dyn PlanReviser>,
    sizing: SizingLimits,
    requirements: Vec<Requirement>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        research: Arc<dyn ResearchEngine>,
        panel: ReviewPanel,
        reviser: Arc<dyn PlanReviser>,
    ) -> Self {
        Self {
            store,
            research,
            panel,
            reviser,
            sizing: SizingLimits::default(),
            requirements: Vec::new(),
        }
    }

    pub fn with_sizing(mut self, sizing: SizingLimits) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Current state of a work item's pipeline.
    pub async fn state(&self, work_item_id: &str) -> Result<PipelineState, PipelineError> {
        let log = self
            .store
            .read(work_item_id)
            .await
            .map_err(PipelineError::Store)?;
        reduce(&log)
    }

    /// Run the next stage and append its record.
    pub async fn advance(&self, work_item_id: &str) -> Result<AdvanceOutcome, PipelineError> {
        let item = self
            .store
            .work_item(work_item_id)
            .await
            .map_err(PipelineError::Store)?;
        let state = self.state(work_item_id).await?;

        if let Some(reason) = state.halt_reason {
            return Err(PipelineError::Halted {
                work_item: item.id.clone(),
                reason: reason.to_string(),
            });
        }
        let Some(stage) = state.next_stage() else {
            return Err(PipelineError::AlreadyComplete {
                work_item: item.id.clone(),
            });
        };

        info!(work_item = %item.id, stage = %stage, cycle = state.cycle, "Running stage");
        let record = self.run_stage(stage, &state, &item).await?;

        self.store
            .append(&item.id, &record)
            .await
            .map_err(PipelineError::Store)?;

        let state = self.state(&item.id).await?;
        let governance = self.check_governance(&item, &record);

        if let Some(reason) = state.halt_reason {
            warn!(work_item = %item.id, reason = %reason, "Pipeline halted");
        } else {
            info!(
                work_item = %item.id,
                marker = %record.marker,
                next = ?state.next_stage(),
                "Stage complete"
            );
        }

        Ok(AdvanceOutcome {
            record,
            state,
            governance,
        })
    }

    /// Advance until the pipeline halts, completes or fails.
    pub async fn run(&self, work_item_id: &str) -> Result<RunSummary, PipelineError> {
        let mut steps = Vec::new();
        let mut state = self.state(work_item_id).await?;

        while state.next_stage().is_some() {
            let outcome = self.advance(work_item_id).await?;
            state = outcome.state.clone();
            steps.push(outcome);
        }

        Ok(RunSummary { steps, state })
    }

    async fn run_stage(
        &self,
        stage: StageName,
        state: &PipelineState,
        item: &WorkItem,
    ) -> Result<StageRecord, PipelineError> {
        match stage {
            StageName::Explore => {
                let output = self
                    .research
                    .explore(&item.title, &item.context())
                    .await
                    .map_err(|source| PipelineError::Collaborator {
                        name: "research".to_string(),
                        source,
                    })?;
                runner::explore(state, output)
            }
            StageName::Plan => runner::plan(state, item, &self.sizing),
            StageName::Boardroom => {
                let plan = state.plan.as_ref().ok_or_else(|| PipelineError::InvalidOutput {
                    stage,
                    message: "no plan to review".to_string(),
                })?;
                let votes = self.panel.convene(plan, item).await?;
                runner::boardroom(state, votes)
            }
            StageName::Refine => {
                let (Some(plan), Some(outcome)) = (state.plan.as_ref(), state.outcome.as_ref())
                else {
                    return Err(PipelineError::InvalidOutput {
                        stage,
                        message: "no plan or outcome to refine".to_string(),
                    });
                };
                let revision = self
                    .reviser
                    .revise(plan, outcome, item)
                    .await
                    .map_err(|source| PipelineError::Collaborator {
                        name: "reviser".to_string(),
                        source,
                    })?;
                runner::refine(state, revision)
            }
            StageName::Decompose => runner::decompose(state),
            StageName::Dispatch => {
                let graph = runner::dispatch_graph(state)?;
                let items = DispatchScheduler::new(self.store.as_ref(), item, state.cycle)
                    .dispatch(graph, item.human_gate)
                    .await?;
                runner::dispatch(state, items)
            }
        }
    }

    fn check_governance(&self, item: &WorkItem, record: &StageRecord) -> Option<GovernanceReport> {
        let requirements = governance::applicable(&self.requirements, record.stage);
        if requirements.is_empty() {
            return None;
        }

        let report = governance::validate(&requirements, &record.content);
        match report.verdict {
            GovernanceVerdict::Pass => info!(
                work_item = %item.id,
                marker = %record.marker,
                requirements = report.coverage.len(),
                "Governance pass"
            ),
            GovernanceVerdict::Fail => {
                let failed: Vec<&str> = report
                    .failures()
                    .map(|c| c.requirement.id.as_str())
                    .collect();
                warn!(
                    work_item = %item.id,
                    marker = %record.marker,
                    failed = ?failed,
                    "Governance fail"
                );
            }
        }
        Some(report)
    }
}
