//! Configuration read from `.stagegate/stagegate.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "billing"
//!
//! [sizing]
//! files = 6
//! new_files = 3
//! lines = 400
//! deps = 2
//! steps = 8
//!
//! [boardroom]
//! review_timeout_secs = 300
//!
//! [agents]
//! research = ["research-agent", "--json"]
//! reviewer = ["review-agent"]
//! reviser = ["revise-agent"]
//! timeout_secs = 600
//!
//! [governance]
//! requirements = ".stagegate/requirements.toml"
//!
//! [logging]
//! format = "compact"
//! level = "info"
//! ```

use crate::boardroom::DEFAULT_REVIEW_TIMEOUT_SECS;
use crate::logging::LogFormat;
use crate::planner::SizingLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Directory holding configuration and the file store.
pub const STAGEGATE_DIR: &str = ".stagegate";
pub const CONFIG_FILE: &str = "stagegate.toml";
/// Environment override for the log format.
pub const LOG_FORMAT_ENV: &str = "STAGEGATE_LOG_FORMAT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardroomSection {
    /// Per-seat review timeout
    #[serde(default = "default_review_timeout_secs")]
    pub review_timeout_secs: u64,
}

fn default_review_timeout_secs() -> u64 {
    DEFAULT_REVIEW_TIMEOUT_SECS
}

impl Default for BoardroomSection {
    fn default() -> Self {
        Self {
            review_timeout_secs: default_review_timeout_secs(),
        }
    }
}

/// Collaborator commands. Each is a program followed by its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsSection {
    #[serde(default)]
    pub research: Vec<String>,
    #[serde(default)]
    pub reviewer: Vec<String>,
    #[serde(default)]
    pub reviser: Vec<String>,
    /// Timeout for research and revision calls
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_agent_timeout_secs() -> u64 {
    600
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            research: Vec::new(),
            reviewer: Vec::new(),
            reviser: Vec::new(),
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceSection {
    /// Requirements file, relative to the project directory
    #[serde(default)]
    pub requirements: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter used when neither STAGEGATE_LOG nor RUST_LOG is set
    #[serde(default)]
    pub level: Option<String>,
}

/// Contents of `stagegate.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagegateToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub sizing: SizingLimits,
    #[serde(default)]
    pub boardroom: BoardroomSection,
    #[serde(default)]
    pub agents: AgentsSection,
    #[serde(default)]
    pub governance: GovernanceSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl StagegateToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse stagegate.toml")
    }

    /// Returns defaults if the file doesn't exist.
    pub fn load_or_default(stagegate_dir: &Path) -> Result<Self> {
        let config_path = stagegate_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize stagegate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Problems that would stop a run, one message each.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, command) in [
            ("research", &self.agents.research),
            ("reviewer", &self.agents.reviewer),
            ("reviser", &self.agents.reviser),
        ] {
            if command.is_empty() {
                problems.push(format!("agents.{name} is not configured"));
            }
        }
        if self.boardroom.review_timeout_secs == 0 {
            problems.push("boardroom.review_timeout_secs must be greater than 0".to_string());
        }
        let limits = &self.sizing;
        for (name, value) in [
            ("files", limits.files),
            ("new_files", limits.new_files),
            ("lines", limits.lines),
            ("deps", limits.deps),
            ("steps", limits.steps),
        ] {
            if value == 0 {
                problems.push(format!(
                    "sizing.{name} is 0; any task needing it cannot be planned"
                ));
            }
        }
        problems
    }
}

/// Resolved configuration for one project.
#[derive(Debug, Clone)]
pub struct StagegateConfig {
    pub project_dir: PathBuf,
    pub stagegate_dir: PathBuf,
    pub toml: StagegateToml,
    /// CLI override for the log format
    pub cli_log_format: Option<LogFormat>,
}

impl StagegateConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let stagegate_dir = project_dir.join(STAGEGATE_DIR);
        let toml = StagegateToml::load_or_default(&stagegate_dir)?;

        Ok(Self {
            project_dir,
            stagegate_dir,
            toml,
            cli_log_format: None,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, log_format: Option<LogFormat>) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.cli_log_format = log_format;
        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.stagegate_dir.join(CONFIG_FILE)
    }

    /// Log format (CLI → env → file).
    pub fn log_format(&self) -> LogFormat {
        if let Some(format) = self.cli_log_format {
            return format;
        }
        if let Ok(value) = std::env::var(LOG_FORMAT_ENV)
            && let Ok(format) = LogFormat::from_str(&value)
        {
            return format;
        }
        self.toml.logging.format
    }

    pub fn sizing(&self) -> &SizingLimits {
        &self.toml.sizing
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.boardroom.review_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.agents.timeout_secs)
    }

    /// Absolute path of the requirements file, if one is configured.
    pub fn requirements_path(&self) -> Option<PathBuf> {
        self.toml
            .governance
            .requirements
            .as_ref()
            .map(|path| self.project_dir.join(path))
    }

    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        })
    }
}
