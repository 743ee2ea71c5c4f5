//! Pipeline commands: status, history, advance and run.

use anyhow::Result;
use console::style;
use serde::Serialize;
use stagegate::config::StagegateConfig;
use stagegate::governance::{GovernanceReport, GovernanceVerdict};
use stagegate::pipeline::marker::render_comment;
use stagegate::pipeline::{
    AdvanceOutcome, MAX_CYCLES, PipelineState, StageName, StageOutput, WorkItem, reduce,
};
use stagegate::store::ThreadStore;

use super::{OutputFormat, build_engine, emit, open_store};

#[derive(Serialize)]
struct StatusView {
    work_item: WorkItem,
    next_stage: Option<StageName>,
    state: PipelineState,
}

/// One-line summary of a stage output.
fn describe(output: &StageOutput) -> String {
    match output {
        StageOutput::Explore(explore) => format!(
            "{} approaches, recommends '{}'",
            explore.approaches.len(),
            explore.recommendation.name
        ),
        StageOutput::Plan(plan) => format!(
            "{} objectives, {} scope items",
            plan.objectives.len(),
            plan.scope.len()
        ),
        StageOutput::Boardroom(boardroom) => boardroom.outcome.to_string(),
        StageOutput::Refine(refine) => format!(
            "{} concerns resolved, {} scope items",
            refine.notes.len(),
            refine.plan.scope.len()
        ),
        StageOutput::Decompose(graph) => format!("{} tasks", graph.len()),
        StageOutput::Dispatch(dispatch) => format!("{} tracked items", dispatch.items.len()),
    }
}

fn print_state(state: &PipelineState) {
    println!("  Cycle:      {}/{}", state.cycle, MAX_CYCLES);
    let markers: Vec<String> = state.markers.iter().map(|m| m.to_string()).collect();
    if markers.is_empty() {
        println!("  Completed:  -");
    } else {
        println!("  Completed:  {}", markers.join(", "));
    }
    if let Some(outcome) = &state.outcome {
        println!("  Boardroom:  {}", outcome);
    }
    if let Some(reason) = state.halt_reason {
        println!("  Halted:     {}", style(reason).red().bold());
    } else if let Some(stage) = state.next_stage() {
        println!("  Next stage: {}", style(stage).cyan());
    } else {
        println!("  {}", style("Dispatched").green().bold());
    }
}

fn print_governance(report: &GovernanceReport) {
    let verdict = match report.verdict {
        GovernanceVerdict::Pass => style(report.verdict.to_string()).green(),
        GovernanceVerdict::Fail => style(report.verdict.to_string()).red(),
    };
    println!("  Governance: {}", verdict);
    for coverage in &report.coverage {
        let mark = if coverage.satisfied {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "    {} {}: {}",
            mark, coverage.requirement.id, coverage.evidence
        );
    }
}

fn print_step(step: &AdvanceOutcome) {
    println!(
        "{} {}  {}",
        style("✓").green().bold(),
        style(step.record.marker).bold(),
        describe(&step.record.content)
    );
    if let Some(report) = &step.governance {
        print_governance(report);
    }
}

pub async fn cmd_status(config: &StagegateConfig, output: OutputFormat, id: &str) -> Result<()> {
    let store = open_store(config);
    let work_item = store.work_item(id).await?;
    let state = reduce(&store.read(id).await?)?;

    let view = StatusView {
        next_stage: state.next_stage(),
        work_item,
        state,
    };
    emit(output, &view, |view| {
        println!();
        println!("Work item {}: {}", view.work_item.id, view.work_item.title);
        let gate = if view.work_item.human_gate {
            style("approved").green()
        } else {
            style("pending").yellow()
        };
        println!("  Human gate: {}", gate);
        print_state(&view.state);
        println!();
    })
}

pub fn cmd_history(
    config: &StagegateConfig,
    output: OutputFormat,
    id: &str,
    comments: bool,
) -> Result<()> {
    let store = open_store(config);
    let records = store.stored_records(id)?;

    if comments {
        for stored in &records {
            println!("{}", render_comment(&stored.record)?);
        }
        return Ok(());
    }

    emit(output, &records, |records| {
        if records.is_empty() {
            println!("No stage records for {}.", id);
            return;
        }
        println!("{:<4} {:<20} {:<14} Summary", "Seq", "Recorded", "Marker");
        println!(
            "{:<4} {:<20} {:<14} -------",
            "---", "--------------------", "--------------"
        );
        for stored in records {
            println!(
                "{:<4} {:<20} {:<14} {}",
                stored.sequence,
                stored.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                stored.record.marker.to_string(),
                describe(&stored.record.content)
            );
        }
    })
}

pub async fn cmd_advance(config: &StagegateConfig, output: OutputFormat, id: &str) -> Result<()> {
    let engine = build_engine(config)?;
    let step = engine.advance(id).await?;

    emit(output, &step, |step| {
        print_step(step);
        print_state(&step.state);
    })
}

pub async fn cmd_run(config: &StagegateConfig, output: OutputFormat, id: &str) -> Result<()> {
    let engine = build_engine(config)?;
    let summary = engine.run(id).await?;

    emit(output, &summary, |summary| {
        if summary.steps.is_empty() {
            println!("Nothing to run for {}.", id);
        }
        for step in &summary.steps {
            print_step(step);
        }
        println!();
        print_state(&summary.state);
    })
}
