//! Core types for task planning.
//!
//! Scope items come from the plan document; tasks are what the planner
//! produces from them after sizing.

use crate::dag::{DagBuilder, TaskDag};
use crate::errors::PlanningError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Work a scope item or task is expected to touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScope {
    /// Existing files the work modifies.
    #[serde(default)]
    pub files: Vec<String>,
    /// Files the work creates.
    #[serde(default)]
    pub new_files: Vec<String>,
    /// Estimated changed lines.
    #[serde(default)]
    pub lines: usize,
    /// External packages the work adds.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Implementation steps.
    #[serde(default)]
    pub steps: Vec<String>,
}

impl TaskScope {
    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_new_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.new_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lines(mut self, lines: usize) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_deps(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Size of this scope along every limited dimension.
    pub fn estimate(&self) -> ScopeEstimate {
        ScopeEstimate {
            files: self.files.len(),
            new_files: self.new_files.len(),
            lines: self.lines,
            deps: self.deps.len(),
            steps: self.steps.len(),
        }
    }
}

/// Measured size of a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEstimate {
    pub files: usize,
    pub new_files: usize,
    pub lines: usize,
    pub deps: usize,
    pub steps: usize,
}

/// Upper bounds a single task must respect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingLimits {
    pub files: usize,
    pub new_files: usize,
    pub lines: usize,
    pub deps: usize,
    pub steps: usize,
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            files: 6,
            new_files: 3,
            lines: 400,
            deps: 2,
            steps: 8,
        }
    }
}

impl SizingLimits {
    /// `(dimension, value, limit)` for every dimension where the estimate
    /// exceeds its limit.
    pub fn violations(&self, estimate: &ScopeEstimate) -> Vec<(&'static str, usize, usize)> {
        [
            ("files", estimate.files, self.files),
            ("new_files", estimate.new_files, self.new_files),
            ("lines", estimate.lines, self.lines),
            ("deps", estimate.deps, self.deps),
            ("steps", estimate.steps, self.steps),
        ]
        .into_iter()
        .filter(|&(_, value, limit)| value > limit)
        .collect()
    }

    pub fn fits(&self, estimate: &ScopeEstimate) -> bool {
        self.violations(estimate).is_empty()
    }
}

/// A unit of scope declared in the plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub scope: TaskScope,
    /// Ids of scope items that must land first.
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl ScopeItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            scope: TaskScope::default(),
            blocked_by: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: TaskScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn blocked_by(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_by = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// A logical, pre-dispatch work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Logical id, unique within the graph.
    pub id: String,
    pub title: String,
    /// Id of the scope item this task was derived from.
    pub origin: String,
    pub scope: TaskScope,
    /// Logical ids of tasks that must be dispatched first.
    #[serde(default)]
    pub blocked_by: BTreeSet<String>,
}

impl Task {
    pub fn from_scope_item(item: &ScopeItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            origin: item.id.clone(),
            scope: item.scope.clone(),
            blocked_by: item.blocked_by.iter().cloned().collect(),
        }
    }
}

/// Validated, acyclic set of tasks in planning order.
///
/// Construction and deserialization both go through [`TaskGraph::new`], so a
/// graph read back from a log is held to the same rules as a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Task>", into = "Vec<Task>")]
pub struct TaskGraph {
    tasks: Vec<Task>,
    dag: TaskDag,
}

impl TaskGraph {
    pub fn new(tasks: Vec<Task>) -> Result<Self, PlanningError> {
        if tasks.is_empty() {
            return Err(PlanningError::NoScopeItems);
        }
        let dag = DagBuilder::new(&tasks).build()?;
        Ok(Self { tasks, dag })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn dag(&self) -> &TaskDag {
        &self.dag
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.dag.get_index(id).and_then(|i| self.tasks.get(i))
    }

    /// Tasks with no blockers.
    pub fn roots(&self) -> Vec<&Task> {
        self.dag
            .root_tasks()
            .into_iter()
            .filter_map(|i| self.tasks.get(i))
            .collect()
    }
}

impl TryFrom<Vec<Task>> for TaskGraph {
    type Error = PlanningError;

    fn try_from(tasks: Vec<Task>) -> Result<Self, Self::Error> {
        Self::new(tasks)
    }
}

impl From<TaskGraph> for Vec<Task> {
    fn from(graph: TaskGraph) -> Self {
        graph.tasks
    }
}
