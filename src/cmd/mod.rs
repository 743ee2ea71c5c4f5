//! CLI command implementations.
//!
//! | Module     | Commands handled                        |
//! |------------|-----------------------------------------|
//! | `project`  | `Init`, `Config`                        |
//! | `item`     | `Item`                                  |
//! | `pipeline` | `Status`, `History`, `Advance`, `Run`   |
//! | `plan`     | `Plan`, `Validate`                      |

pub mod item;
pub mod pipeline;
pub mod plan;
pub mod project;

pub use item::cmd_item;
pub use pipeline::{cmd_advance, cmd_history, cmd_run, cmd_status};
pub use plan::{cmd_plan, cmd_validate};
pub use project::{cmd_config, cmd_init};

use anyhow::{Context, Result};
use serde::Serialize;
use stagegate::agents::CommandAgent;
use stagegate::boardroom::ReviewPanel;
use stagegate::config::StagegateConfig;
use stagegate::governance::{Requirement, load_requirements};
use stagegate::pipeline::Engine;
use stagegate::store::{FileStore, ThreadStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Print `value` in the requested format; `text` renders the human view.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Text => text(value),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(value).context("Failed to serialize output")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

pub fn open_store(config: &StagegateConfig) -> FileStore {
    FileStore::new(config.stagegate_dir.clone())
}

/// Requirements from `path`, or from the configured file, or none.
pub fn requirements(
    config: &StagegateConfig,
    path: Option<&std::path::Path>,
) -> Result<Vec<Requirement>> {
    match path.map(|p| p.to_path_buf()).or_else(|| config.requirements_path()) {
        Some(path) => load_requirements(&path),
        None => Ok(Vec::new()),
    }
}

fn command_agent(
    config: &StagegateConfig,
    name: &str,
    command: &[String],
    timeout: Duration,
) -> Result<CommandAgent> {
    let agent = CommandAgent::from_command(command, timeout).with_context(|| {
        format!(
            "agents.{} is not configured in {}",
            name,
            config.config_path().display()
        )
    })?;
    Ok(agent.with_working_dir(config.project_dir.clone()))
}

/// Wire an engine to the file store and the configured collaborators.
pub fn build_engine(config: &StagegateConfig) -> Result<Engine> {
    let agents = &config.toml.agents;
    let research = command_agent(config, "research", &agents.research, config.agent_timeout())?;
    let reviewer = command_agent(config, "reviewer", &agents.reviewer, config.review_timeout())?;
    let reviser = command_agent(config, "reviser", &agents.reviser, config.agent_timeout())?;

    let store: Arc<dyn ThreadStore> = Arc::new(open_store(config));
    let panel = ReviewPanel::new(Arc::new(reviewer)).with_timeout(config.review_timeout());

    Ok(
        Engine::new(store, Arc::new(research), panel, Arc::new(reviser))
            .with_sizing(config.sizing().clone())
            .with_requirements(requirements(config, None)?),
    )
}
