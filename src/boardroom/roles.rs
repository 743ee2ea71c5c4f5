//! The five fixed boardroom reviewer roles.
//!
//! Role-specific judgement lives in the reviewer collaborator; the engine only
//! needs a closed set of distinct tags, a display name, and the focus areas
//! handed to each reviewer.
//!
//! ## Example
//!
//! ```
//! use stagegate::boardroom::ReviewerRole;
//! use std::str::FromStr;
//!
//! assert_eq!(ReviewerRole::all().len(), 5);
//! assert_eq!(ReviewerRole::from_str("security").unwrap(), ReviewerRole::SecuritySentinel);
//! assert_eq!(ReviewerRole::DevilsAdvocate.agent_name(), "devils-advocate");
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of seats at the boardroom table.
pub const BOARD_SIZE: usize = 5;

/// A boardroom reviewer role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    /// Judges whether the plan serves the stated goals.
    #[serde(alias = "product", alias = "product-strategist")]
    ProductStrategist,
    /// Judges structure, boundaries and coupling.
    #[serde(alias = "architecture", alias = "systems-architect")]
    SystemsArchitect,
    /// Judges attack surface and data handling.
    #[serde(alias = "security", alias = "security-sentinel")]
    SecuritySentinel,
    /// Judges operability, failure modes and rollout.
    #[serde(alias = "reliability", alias = "reliability-engineer")]
    ReliabilityEngineer,
    /// Argues against the plan on purpose.
    #[serde(alias = "skeptic", alias = "devils-advocate")]
    DevilsAdvocate,
}

impl ReviewerRole {
    /// All roles in seating order.
    pub fn all() -> [Self; BOARD_SIZE] {
        [
            Self::ProductStrategist,
            Self::SystemsArchitect,
            Self::SecuritySentinel,
            Self::ReliabilityEngineer,
            Self::DevilsAdvocate,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ProductStrategist => "Product Strategist",
            Self::SystemsArchitect => "Systems Architect",
            Self::SecuritySentinel => "Security Sentinel",
            Self::ReliabilityEngineer => "Reliability Engineer",
            Self::DevilsAdvocate => "Devil's Advocate",
        }
    }

    /// Lowercase, hyphenated identifier passed to reviewer agents.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::ProductStrategist => "product-strategist",
            Self::SystemsArchitect => "systems-architect",
            Self::SecuritySentinel => "security-sentinel",
            Self::ReliabilityEngineer => "reliability-engineer",
            Self::DevilsAdvocate => "devils-advocate",
        }
    }

    /// Default concerns this role is asked to examine.
    pub fn focus_areas(&self) -> Vec<&'static str> {
        match self {
            Self::ProductStrategist => vec![
                "Objectives traceable to the work item goals",
                "Scope creep beyond the stated problem",
                "Missing acceptance criteria",
                "Sequencing that delays user-visible value",
            ],
            Self::SystemsArchitect => vec![
                "Module boundaries and ownership",
                "Coupling between scope items",
                "Dependency direction and layering",
                "Migration path for existing callers",
            ],
            Self::SecuritySentinel => vec![
                "Secrets handling and exposure",
                "Input validation at trust boundaries",
                "Authentication and authorization changes",
                "New third-party dependencies",
            ],
            Self::ReliabilityEngineer => vec![
                "Failure modes and recovery",
                "Observability of new paths",
                "Rollout and rollback strategy",
                "Resource limits and timeouts",
            ],
            Self::DevilsAdvocate => vec![
                "Cheaper alternatives that were dismissed",
                "Assumptions stated without evidence",
                "Tasks that are larger than estimated",
                "Reasons this plan should not ship",
            ],
        }
    }
}

impl std::fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ReviewerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" | "product-strategist" | "product_strategist" => Ok(Self::ProductStrategist),
            "architecture" | "arch" | "systems-architect" | "systems_architect" => {
                Ok(Self::SystemsArchitect)
            }
            "security" | "security-sentinel" | "security_sentinel" => Ok(Self::SecuritySentinel),
            "reliability" | "sre" | "reliability-engineer" | "reliability_engineer" => {
                Ok(Self::ReliabilityEngineer)
            }
            "skeptic" | "devils-advocate" | "devils_advocate" => Ok(Self::DevilsAdvocate),
            _ => anyhow::bail!(
                "Unknown reviewer role '{}'. Valid values: product, architecture, security, reliability, skeptic",
                s
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_roles_are_distinct() {
        let roles: HashSet<_> = ReviewerRole::all().into_iter().collect();
        assert_eq!(roles.len(), BOARD_SIZE);
    }

    #[test]
    fn agent_names_are_kebab_case() {
        for role in ReviewerRole::all() {
            let name = role.agent_name();
            assert!(!name.contains(' '));
            assert_eq!(name, name.to_lowercase());
        }
    }

    #[test]
    fn every_role_has_focus_areas() {
        for role in ReviewerRole::all() {
            assert!(!role.focus_areas().is_empty(), "{role} has no focus areas");
        }
    }

    #[test]
    fn from_str_accepts_aliases() {
        assert_eq!(
            ReviewerRole::from_str("SRE").unwrap(),
            ReviewerRole::ReliabilityEngineer
        );
        assert_eq!(
            ReviewerRole::from_str("systems_architect").unwrap(),
            ReviewerRole::SystemsArchitect
        );
        assert!(ReviewerRole::from_str("cfo").is_err());
    }

    #[test]
    fn serde_accepts_snake_and_kebab_forms() {
        let role: ReviewerRole = serde_json::from_str(r#""devils_advocate""#).unwrap();
        assert_eq!(role, ReviewerRole::DevilsAdvocate);
        let role: ReviewerRole = serde_json::from_str(r#""security-sentinel""#).unwrap();
        assert_eq!(role, ReviewerRole::SecuritySentinel);
        assert_eq!(
            serde_json::to_string(&ReviewerRole::ProductStrategist).unwrap(),
            r#""product_strategist""#
        );
    }
}
