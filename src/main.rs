use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stagegate::config::StagegateConfig;
use stagegate::logging::{self, LogFormat};
use std::path::PathBuf;

mod cmd;

use cmd::OutputFormat;

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(version, about = "Staged planning pipeline with a consensus gate")]
pub struct Cli {
    #[arg(long, global = true, env = "STAGEGATE_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Diagnostic log format on stderr. Overrides stagegate.toml and STAGEGATE_LOG_FORMAT.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Result format on stdout
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .stagegate/ with a default stagegate.toml
    Init {
        /// Overwrite an existing stagegate.toml
        #[arg(long)]
        force: bool,
    },
    /// Manage work items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Show the derived pipeline state of a work item
    Status { id: String },
    /// Show the event log of a work item
    History {
        id: String,

        /// Print each record as a thread comment
        #[arg(long)]
        comments: bool,
    },
    /// Run the next stage of a work item
    Advance { id: String },
    /// Advance a work item until it halts or dispatches
    Run { id: String },
    /// Decompose a JSON file of scope items into a task graph
    Plan {
        /// JSON array of scope items
        scope_file: PathBuf,
    },
    /// Check a stage output against governance requirements
    Validate {
        /// Stage output JSON (`{"stage": ..., "output": ...}`) or a comment from `history --comments`
        output_file: PathBuf,

        /// Requirements TOML (defaults to [governance] requirements)
        #[arg(short, long)]
        requirements: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ItemCommands {
    /// Register a new work item
    Add {
        id: String,
        title: String,

        /// Goal for the plan (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,

        /// Constraint the plan must respect (repeatable)
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },
    /// Record human approval for dispatch
    Approve {
        id: String,

        /// Withdraw approval instead
        #[arg(long)]
        revoke: bool,
    },
    /// List work items
    List,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = StagegateConfig::with_cli_args(project_dir, cli.log_format)?;
    logging::init(config.log_format(), config.toml.logging.level.as_deref());

    let output = cli.output;
    match cli.command {
        Commands::Init { force } => cmd::cmd_init(&config, force)?,
        Commands::Item { command } => cmd::cmd_item(&config, output, command)?,
        Commands::Status { id } => cmd::cmd_status(&config, output, &id).await?,
        Commands::History { id, comments } => cmd::cmd_history(&config, output, &id, comments)?,
        Commands::Advance { id } => cmd::cmd_advance(&config, output, &id).await?,
        Commands::Run { id } => cmd::cmd_run(&config, output, &id).await?,
        Commands::Plan { scope_file } => cmd::cmd_plan(&config, output, &scope_file)?,
        Commands::Validate {
            output_file,
            requirements,
        } => cmd::cmd_validate(&config, output, &output_file, requirements.as_deref())?,
        Commands::Config { command } => cmd::cmd_config(&config, output, command)?,
    }

    Ok(())
}
