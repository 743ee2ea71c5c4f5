//! Task planning: turns a plan's scope items into a sized, acyclic task graph.
//!
//! - **Validation**: ids are unique, every blocker exists, and the declared
//!   blocking relation has no cycle
//! - **Sizing**: each task is measured against [`SizingLimits`]
//! - **Splitting**: oversized tasks are replaced by chained parts until no
//!   task exceeds a limit
//!
//! ## Example
//!
//! ```
//! use stagegate::planner::{ScopeItem, SizingLimits, TaskPlanner, TaskScope};
//!
//! let items = vec![
//!     ScopeItem::new("schema", "Add tables").with_scope(TaskScope::default().with_lines(900)),
//!     ScopeItem::new("api", "Expose endpoints").blocked_by(["schema"]),
//! ];
//!
//! let graph = TaskPlanner::new(SizingLimits::default()).plan(&items).unwrap();
//! let ids: Vec<_> = graph.tasks().iter().map(|t| t.id.as_str()).collect();
//! assert_eq!(ids, vec!["schema.1", "schema.2", "schema.3", "api"]);
//! assert!(graph.get("api").unwrap().blocked_by.contains("schema.3"));
//! ```

mod sizing;
mod types;

pub use sizing::{part_count, part_id, split};
pub use types::{ScopeEstimate, ScopeItem, SizingLimits, Task, TaskGraph, TaskScope};

use crate::errors::PlanningError;
use tracing::{debug, info};

/// Builds task graphs under fixed sizing limits.
#[derive(Debug, Clone, Default)]
pub struct TaskPlanner {
    limits: SizingLimits,
}

impl TaskPlanner {
    pub fn new(limits: SizingLimits) -> Self {
        Self { limits }
    }

    /// Plan tasks for `items`.
    ///
    /// The declared graph is validated before any splitting, so a cycle or a
    /// dangling blocker is reported against the ids the plan actually used.
    pub fn plan(&self, items: &[ScopeItem]) -> Result<TaskGraph, PlanningError> {
        if items.is_empty() {
            return Err(PlanningError::NoScopeItems);
        }

        let declared = TaskGraph::new(items.iter().map(Task::from_scope_item).collect())?;
        let mut tasks: Vec<Task> = declared.into();

        let mut cursor = 0;
        let mut splits = 0;
        while cursor < tasks.len() {
            let estimate = tasks[cursor].scope.estimate();
            if self.limits.fits(&estimate) {
                cursor += 1;
                continue;
            }

            let original = tasks[cursor].clone();
            let parts = split(&original, &self.limits)?;
            for part in &parts {
                if tasks.iter().any(|t| t.id == part.id) {
                    return Err(PlanningError::DuplicateTask {
                        id: part.id.clone(),
                    });
                }
            }

            let Some(last) = parts.last().map(|p| p.id.clone()) else {
                break;
            };
            for task in tasks.iter_mut() {
                if task.blocked_by.remove(&original.id) {
                    task.blocked_by.insert(last.clone());
                }
            }

            debug!(
                task = %original.id,
                parts = parts.len(),
                violations = ?self.limits.violations(&estimate),
                "Split oversized task"
            );
            tasks.splice(cursor..=cursor, parts);
            splits += 1;
            // cursor stays put: the first part is re-checked on the next pass
        }

        let graph = TaskGraph::new(tasks)?;
        info!(
            scope_items = items.len(),
            tasks = graph.len(),
            splits,
            "Planned task graph"
        );
        Ok(graph)
    }
}
