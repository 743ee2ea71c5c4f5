//! Binary governance checks over stage outputs.
//!
//! A requirement is either satisfied or it is not. The report carries no
//! score and no advice: a satisfied requirement says what was found, an
//! unsatisfied one says `missing`.
//!
//! Requirements are usually loaded from TOML:
//!
//! ```toml
//! [[requirement]]
//! id = "plan-objectives"
//! description = "The plan states at least one objective"
//! stage = "plan"
//! check = { kind = "min_items", pointer = "/objectives", min = 1 }
//! ```

use crate::pipeline::{StageName, StageOutput};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Evidence reported for every unsatisfied requirement.
pub const MISSING: &str = "missing";

/// One governance requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    /// Stage the requirement applies to; `None` applies to every stage.
    #[serde(default)]
    pub stage: Option<StageName>,
    pub check: RequirementCheck,
}

impl Requirement {
    pub fn applies_to(&self, stage: StageName) -> bool {
        self.stage.is_none_or(|s| s == stage)
    }
}

/// What to look for. Pointers are JSON pointers into the stage's output
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementCheck {
    /// A non-null value exists at the pointer.
    Present { pointer: String },
    /// The pointer holds an array of at least `min` items.
    MinItems { pointer: String, min: usize },
    /// The pointer holds a string, or an array containing a string, that
    /// matches the pattern.
    Matches { pointer: String, pattern: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceVerdict {
    Pass,
    Fail,
}

impl fmt::Display for GovernanceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// One row of the coverage table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub requirement: Requirement,
    pub satisfied: bool,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceReport {
    pub verdict: GovernanceVerdict,
    /// One row per requirement, in requirement order.
    pub coverage: Vec<Coverage>,
}

impl GovernanceReport {
    pub fn failures(&self) -> impl Iterator<Item = &Coverage> {
        self.coverage.iter().filter(|c| !c.satisfied)
    }
}

/// Check `output` against every requirement.
///
/// `Pass` iff every requirement is satisfied. A requirement scoped to a
/// different stage is unsatisfied here.
pub fn validate(requirements: &[Requirement], output: &StageOutput) -> GovernanceReport {
    let payload = payload(output);
    let stage = output.stage();

    let coverage: Vec<Coverage> = requirements
        .iter()
        .map(|requirement| {
            let evidence = if requirement.applies_to(stage) {
                check(&requirement.check, &payload)
            } else {
                None
            };
            Coverage {
                requirement: requirement.clone(),
                satisfied: evidence.is_some(),
                evidence: evidence.unwrap_or_else(|| MISSING.to_string()),
            }
        })
        .collect();

    let verdict = if coverage.iter().all(|c| c.satisfied) {
        GovernanceVerdict::Pass
    } else {
        GovernanceVerdict::Fail
    };

    GovernanceReport { verdict, coverage }
}

/// The requirements that apply to `stage`.
pub fn applicable(requirements: &[Requirement], stage: StageName) -> Vec<Requirement> {
    requirements
        .iter()
        .filter(|r| r.applies_to(stage))
        .cloned()
        .collect()
}

fn payload(output: &StageOutput) -> Value {
    match serde_json::to_value(output) {
        Ok(Value::Object(mut map)) => map.remove("output").unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Evidence when satisfied, `None` otherwise.
fn check(check: &RequirementCheck, payload: &Value) -> Option<String> {
    match check {
        RequirementCheck::Present { pointer } => {
            let value = payload.pointer(pointer).filter(|v| !v.is_null())?;
            Some(format!("{} holds {}", pointer, describe(value)))
        }
        RequirementCheck::MinItems { pointer, min } => {
            let items = payload.pointer(pointer)?.as_array()?;
            (items.len() >= *min).then(|| format!("{} has {} items (min {})", pointer, items.len(), min))
        }
        RequirementCheck::Matches { pointer, pattern } => {
            let re = Regex::new(pattern).ok()?;
            let value = payload.pointer(pointer)?;
            let candidates: Vec<&str> = match value {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            let hit = candidates.into_iter().find(|s| re.is_match(s))?;
            Some(format!("{} matches /{}/: \"{}\"", pointer, pattern, hit))
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("an array of {} items", items.len()),
        Value::Object(map) => format!("an object with {} fields", map.len()),
        Value::String(s) => format!("a string of {} chars", s.chars().count()),
        Value::Bool(b) => format!("{b}"),
        Value::Number(n) => format!("{n}"),
        Value::Null => "null".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RequirementFile {
    #[serde(default, rename = "requirement")]
    requirements: Vec<Requirement>,
}

/// Parse requirements from TOML, rejecting duplicate ids, malformed
/// pointers and invalid patterns.
pub fn parse_requirements(content: &str) -> Result<Vec<Requirement>> {
    let file: RequirementFile = toml::from_str(content).context("Failed to parse requirements")?;

    let mut ids = HashSet::new();
    for requirement in &file.requirements {
        if !ids.insert(requirement.id.as_str()) {
            anyhow::bail!("Duplicate requirement id: {}", requirement.id);
        }
        let pointer = match &requirement.check {
            RequirementCheck::Present { pointer }
            | RequirementCheck::MinItems { pointer, .. }
            | RequirementCheck::Matches { pointer, .. } => pointer,
        };
        if !pointer.is_empty() && !pointer.starts_with('/') {
            anyhow::bail!(
                "Requirement {}: pointer '{}' must be empty or start with '/'",
                requirement.id,
                pointer
            );
        }
        if let RequirementCheck::Matches { pattern, .. } = &requirement.check {
            Regex::new(pattern).with_context(|| {
                format!("Requirement {}: invalid pattern '{}'", requirement.id, pattern)
            })?;
        }
    }

    Ok(file.requirements)
}

pub fn load_requirements(path: &Path) -> Result<Vec<Requirement>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read requirements from {}", path.display()))?;
    parse_requirements(&content).with_context(|| format!("In {}", path.display()))
}
