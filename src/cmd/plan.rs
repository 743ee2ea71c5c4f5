//! Offline planning and governance commands.

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stagegate::config::StagegateConfig;
use stagegate::dag::compute_waves;
use stagegate::governance::{self, GovernanceReport, GovernanceVerdict};
use stagegate::planner::{ScopeItem, TaskGraph, TaskPlanner};
use stagegate::pipeline::StageOutput;
use stagegate::pipeline::marker::parse_comment;
use std::path::Path;

use super::{OutputFormat, emit, requirements};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// A stage output from raw JSON or from a rendered thread comment.
fn read_stage_output(path: &Path) -> Result<StageOutput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if let Some(record) = parse_comment(&content)
        .with_context(|| format!("Failed to parse comment in {}", path.display()))?
    {
        return Ok(record.content);
    }
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[derive(Serialize)]
struct PlanView {
    tasks: TaskGraph,
    waves: Vec<Vec<String>>,
}

pub fn cmd_plan(config: &StagegateConfig, output: OutputFormat, scope_file: &Path) -> Result<()> {
    let items: Vec<ScopeItem> = read_json(scope_file)?;
    let graph = TaskPlanner::new(config.sizing().clone()).plan(&items)?;
    let view = PlanView {
        waves: compute_waves(&graph),
        tasks: graph,
    };

    emit(output, &view, |view| {
        println!();
        println!(
            "{} scope items planned into {} tasks",
            items.len(),
            view.tasks.len()
        );
        for (i, wave) in view.waves.iter().enumerate() {
            println!();
            println!("{}", style(format!("Wave {}", i + 1)).bold());
            for id in wave {
                let Some(task) = view.tasks.get(id) else {
                    continue;
                };
                if task.blocked_by.is_empty() {
                    println!("  {:<16} {}", task.id, task.title);
                } else {
                    let blockers: Vec<&str> = task.blocked_by.iter().map(String::as_str).collect();
                    println!(
                        "  {:<16} {} {}",
                        task.id,
                        task.title,
                        style(format!("(after {})", blockers.join(", "))).dim()
                    );
                }
            }
        }
        println!();
    })
}

pub fn cmd_validate(
    config: &StagegateConfig,
    output: OutputFormat,
    output_file: &Path,
    requirements_file: Option<&Path>,
) -> Result<()> {
    let requirements = requirements(config, requirements_file)?;
    if requirements.is_empty() {
        anyhow::bail!(
            "No requirements to check. Pass --requirements or set [governance] requirements."
        );
    }

    let stage_output = read_stage_output(output_file)?;
    let applicable = governance::applicable(&requirements, stage_output.stage());
    let report: GovernanceReport = governance::validate(&applicable, &stage_output);

    emit(output, &report, |report| {
        if report.coverage.is_empty() {
            println!("No requirements apply to the {} stage.", stage_output.stage());
            return;
        }
        for coverage in &report.coverage {
            let mark = if coverage.satisfied {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{} {:<24} {}",
                mark, coverage.requirement.id, coverage.evidence
            );
        }
        println!();
        match report.verdict {
            GovernanceVerdict::Pass => println!("{}", style("pass").green().bold()),
            GovernanceVerdict::Fail => println!("{}", style("fail").red().bold()),
        }
    })?;

    if report.verdict == GovernanceVerdict::Fail {
        anyhow::bail!("{} requirement(s) not satisfied", report.failures().count());
    }
    Ok(())
}
