//! Dispatch ordering and materialization of tracked items.
//!
//! Tasks are materialized strictly in dependency order. Each creation hands
//! back a concrete id, which is written into every still-pending dependent
//! before that dependent is created, so no tracked item ever points at a
//! logical id.

use crate::dag::builder::TaskIndex;
use crate::errors::DispatchError;
use crate::pipeline::WorkItem;
use crate::planner::{Task, TaskGraph};
use crate::store::ThreadStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// A materialized task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Concrete id assigned by the tracker.
    pub id: String,
    /// Logical id of the task this item materializes.
    pub task_id: String,
    pub title: String,
    /// Concrete ids of items created earlier in the same dispatch.
    pub blocked_by: BTreeSet<String>,
}

/// Creation request handed to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrackedItem {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub blocked_by: Vec<String>,
}

/// A blocker reference as seen by a pending task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Reference {
    Logical(String),
    Concrete(String),
}

/// Stable topological order: blockers first, ties broken by planning order.
pub fn order(graph: &TaskGraph) -> Vec<&Task> {
    let dag = graph.dag();
    let mut in_degree: Vec<usize> = (0..dag.len()).map(|i| dag.dependencies(i).len()).collect();
    let mut ready: BTreeSet<TaskIndex> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut out = Vec::with_capacity(dag.len());
    while let Some(node) = ready.pop_first() {
        if let Some(task) = graph.tasks().get(node) {
            out.push(task);
        }
        for &dependent in dag.dependents(node) {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    out
}

/// Group tasks into waves that could be worked in parallel.
///
/// Each wave lists task ids whose blockers all sit in earlier waves.
pub fn compute_waves(graph: &TaskGraph) -> Vec<Vec<String>> {
    let dag = graph.dag();
    let mut waves = Vec::new();
    let mut done: HashSet<TaskIndex> = HashSet::new();

    loop {
        let ready: Vec<TaskIndex> = (0..dag.len())
            .filter(|i| !done.contains(i) && dag.dependencies_satisfied(*i, &done))
            .collect();

        if ready.is_empty() {
            break;
        }

        done.extend(ready.iter().copied());
        waves.push(
            ready
                .into_iter()
                .filter_map(|i| dag.id(i).map(String::from))
                .collect(),
        );
    }

    waves
}

/// Label prefix tying a tracked item to the logical task it materializes.
pub const TASK_LABEL_PREFIX: &str = "task:";

fn cycle_label(cycle: u32) -> String {
    format!("cycle:{cycle}")
}

/// Materializes a task graph into tracked items for one work item.
pub struct DispatchScheduler<'a> {
    store: &'a dyn ThreadStore,
    work_item: &'a WorkItem,
    cycle: u32,
}

impl<'a> DispatchScheduler<'a> {
    pub fn new(store: &'a dyn ThreadStore, work_item: &'a WorkItem, cycle: u32) -> Self {
        Self {
            store,
            work_item,
            cycle,
        }
    }

    /// Create one tracked item per task, blockers first.
    ///
    /// Refuses to start without the human gate. A tracker failure stops the
    /// dispatch at that task; items already created stay created, and a
    /// later dispatch at the same cycle reuses them instead of creating
    /// them again.
    pub async fn dispatch(
        &self,
        graph: &TaskGraph,
        human_gate: bool,
    ) -> Result<Vec<TrackedItem>, DispatchError> {
        if !human_gate {
            return Err(DispatchError::GateNotApproved {
                work_item: self.work_item.id.clone(),
            });
        }

        let mut pending: HashMap<&str, BTreeSet<Reference>> = graph
            .tasks()
            .iter()
            .map(|task| {
                let refs = task
                    .blocked_by
                    .iter()
                    .map(|dep| Reference::Logical(dep.clone()))
                    .collect();
                (task.id.as_str(), refs)
            })
            .collect();

        let mut existing = self.existing_items().await?;
        let dag = graph.dag();
        let mut created = Vec::with_capacity(graph.len());

        for task in order(graph) {
            let refs = pending.remove(task.id.as_str()).unwrap_or_default();
            let mut blocked_by = BTreeSet::new();
            for reference in refs {
                match reference {
                    Reference::Concrete(id) => {
                        blocked_by.insert(id);
                    }
                    Reference::Logical(dependency) => {
                        return Err(DispatchError::UnresolvedReference {
                            task: task.id.clone(),
                            dependency,
                        });
                    }
                }
            }

            let id = match existing.remove(task.id.as_str()) {
                Some(id) => {
                    info!(task = %task.id, tracked = %id, "Reusing tracked item");
                    id
                }
                None => {
                    let request = self.request_for(task, &blocked_by);
                    let id = self
                        .store
                        .create_tracked_item(&self.work_item.id, &request)
                        .await
                        .map_err(|source| DispatchError::Tracker {
                            task: task.id.clone(),
                            source,
                        })?;
                    info!(task = %task.id, tracked = %id, "Materialized task");
                    id
                }
            };

            if let Some(index) = dag.get_index(&task.id) {
                for &dependent in dag.dependents(index) {
                    let Some(dependent_id) = dag.id(dependent) else {
                        continue;
                    };
                    if let Some(refs) = pending.get_mut(dependent_id)
                        && refs.remove(&Reference::Logical(task.id.clone()))
                    {
                        refs.insert(Reference::Concrete(id.clone()));
                        debug!(dependent = dependent_id, from = %task.id, to = %id, "Resolved reference");
                    }
                }
            }

            created.push(TrackedItem {
                id,
                task_id: task.id.clone(),
                title: task.title.clone(),
                blocked_by,
            });
        }

        Ok(created)
    }

    /// Concrete ids of items already created for this cycle, by task id.
    async fn existing_items(&self) -> Result<HashMap<String, String>, DispatchError> {
        let records = self
            .store
            .tracked_items(&self.work_item.id)
            .await
            .map_err(|source| DispatchError::TrackerUnavailable {
                work_item: self.work_item.id.clone(),
                source,
            })?;

        let cycle = cycle_label(self.cycle);
        let mut existing = HashMap::new();
        for record in records {
            let labels = &record.request.labels;
            if !labels.contains(&cycle) {
                continue;
            }
            if let Some(task) = labels.iter().find_map(|l| l.strip_prefix(TASK_LABEL_PREFIX)) {
                existing.entry(task.to_string()).or_insert(record.id);
            }
        }
        if !existing.is_empty() {
            debug!(work_item = %self.work_item.id, count = existing.len(), "Found tracked items from an earlier attempt");
        }
        Ok(existing)
    }

    fn request_for(&self, task: &Task, blocked_by: &BTreeSet<String>) -> NewTrackedItem {
        NewTrackedItem {
            title: task.title.clone(),
            body: render_body(self.work_item, self.cycle, task, blocked_by),
            labels: vec![
                "stagegate".to_string(),
                format!("work-item:{}", self.work_item.id),
                cycle_label(self.cycle),
                format!("{TASK_LABEL_PREFIX}{}", task.id),
            ],
            blocked_by: blocked_by.iter().cloned().collect(),
        }
    }
}

fn render_body(
    work_item: &WorkItem,
    cycle: u32,
    task: &Task,
    blocked_by: &BTreeSet<String>,
) -> String {
    let mut body = format!(
        "Task `{}` for {} ({}), cycle {}\n",
        task.id, work_item.id, work_item.title, cycle
    );

    let lists = [
        ("Files", &task.scope.files),
        ("New files", &task.scope.new_files),
        ("Dependencies", &task.scope.deps),
    ];
    for (heading, items) in lists {
        if items.is_empty() {
            continue;
        }
        body.push_str(&format!("\n### {heading}\n"));
        for item in items {
            body.push_str(&format!("- `{item}`\n"));
        }
    }

    if !task.scope.steps.is_empty() {
        body.push_str("\n### Steps\n");
        for (i, step) in task.scope.steps.iter().enumerate() {
            body.push_str(&format!("{}. {}\n", i + 1, step));
        }
    }

    if task.scope.lines > 0 {
        body.push_str(&format!("\nEstimated lines: {}\n", task.scope.lines));
    }

    let blockers = if blocked_by.is_empty() {
        "none".to_string()
    } else {
        blocked_by.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    body.push_str(&format!("\nBlocked by: {blockers}\n"));
    body
}
