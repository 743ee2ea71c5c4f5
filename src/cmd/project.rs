//! Project setup and configuration commands.

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use stagegate::config::{StagegateConfig, StagegateToml};
use stagegate::logging::LogFormat;

use super::super::ConfigCommands;
use super::{OutputFormat, emit};

pub fn cmd_init(config: &StagegateConfig, force: bool) -> Result<()> {
    let config_path = config.config_path();
    if config_path.exists() && !force {
        println!(
            "stagegate.toml already exists at {}",
            config_path.display()
        );
        println!("Pass --force to overwrite it.");
        return Ok(());
    }

    std::fs::create_dir_all(&config.stagegate_dir).with_context(|| {
        format!("Failed to create {}", config.stagegate_dir.display())
    })?;
    StagegateToml::default().save(&config_path)?;

    println!(
        "{} Created {}",
        style("✓").green().bold(),
        config_path.display()
    );
    println!();
    println!("Next:");
    println!("  - set [agents] research, reviewer and reviser commands");
    println!("  - add a work item with 'stagegate item add <id> <title>'");
    Ok(())
}

#[derive(Serialize)]
struct ConfigView<'a> {
    config_file: String,
    exists: bool,
    project_name: String,
    log_format: LogFormat,
    requirements: Option<String>,
    settings: &'a StagegateToml,
}

#[derive(Serialize)]
struct ValidationView {
    valid: bool,
    problems: Vec<String>,
}

pub fn cmd_config(
    config: &StagegateConfig,
    output: OutputFormat,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = config.config_path();

    match command {
        None | Some(ConfigCommands::Show) => {
            let view = ConfigView {
                config_file: config_path.display().to_string(),
                exists: config_path.exists(),
                project_name: config.project_name(),
                log_format: config.log_format(),
                requirements: config
                    .requirements_path()
                    .map(|p| p.display().to_string()),
                settings: &config.toml,
            };
            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;

            emit(output, &view, |view| {
                println!();
                if view.exists {
                    println!("Config file: {}", view.config_file);
                } else {
                    println!("No stagegate.toml at {}; using defaults.", view.config_file);
                }
                println!();
                print!("{}", rendered);
                println!();
                println!("Effective values (with env/CLI overrides):");
                println!("  project = \"{}\"", view.project_name);
                println!("  log_format = \"{}\"", view.log_format);
                if let Some(requirements) = &view.requirements {
                    println!("  requirements = \"{}\"", requirements);
                }
                println!();
            })
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.toml.validate();
            let view = ValidationView {
                valid: problems.is_empty(),
                problems,
            };
            emit(output, &view, |view| {
                if view.valid {
                    println!("{} Configuration is valid.", style("✓").green().bold());
                } else {
                    println!("{}", style("Configuration problems:").yellow().bold());
                    for problem in &view.problems {
                        println!("  - {}", problem);
                    }
                }
            })
        }
    }
}
