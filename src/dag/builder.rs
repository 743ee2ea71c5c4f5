//! DAG builder for task dependency graphs.
//!
//! The builder indexes tasks by id, turns `blocked_by` entries into edges and
//! rejects duplicate ids, dangling references and cycles.

use crate::errors::PlanningError;
use crate::planner::Task;
use std::collections::{HashMap, HashSet};

/// Index into the task list.
pub type TaskIndex = usize;

/// Edge structure of a task list. Holds ids only; the tasks stay with their
/// owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDag {
    /// Task ids indexed by position
    ids: Vec<String>,
    /// Map from task id to index
    index_map: HashMap<String, TaskIndex>,
    /// Forward edges: index -> tasks blocked by it
    forward_edges: Vec<Vec<TaskIndex>>,
    /// Reverse edges: index -> tasks blocking it
    reverse_edges: Vec<Vec<TaskIndex>>,
}

impl TaskDag {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: TaskIndex) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn get_index(&self, id: &str) -> Option<TaskIndex> {
        self.index_map.get(id).copied()
    }

    /// Tasks blocked by the given task.
    pub fn dependents(&self, index: TaskIndex) -> &[TaskIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tasks blocking the given task.
    pub fn dependencies(&self, index: TaskIndex) -> &[TaskIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tasks with no blockers.
    pub fn root_tasks(&self) -> Vec<TaskIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn dependencies_satisfied(&self, index: TaskIndex, done: &HashSet<TaskIndex>) -> bool {
        self.dependencies(index).iter().all(|dep| done.contains(dep))
    }
}

/// Builder for task graphs.
pub struct DagBuilder<'a> {
    tasks: &'a [Task],
}

impl<'a> DagBuilder<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self { tasks }
    }

    /// Build the edge structure.
    ///
    /// Fails on duplicate ids, blockers naming no task, and cycles. Edges are
    /// never dropped to make a graph acyclic.
    pub fn build(self) -> Result<TaskDag, PlanningError> {
        let mut index_map = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if index_map.insert(task.id.clone(), i).is_some() {
                return Err(PlanningError::DuplicateTask {
                    id: task.id.clone(),
                });
            }
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];

        for (to_idx, task) in self.tasks.iter().enumerate() {
            for dep in &task.blocked_by {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    PlanningError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;

                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let dag = TaskDag {
            ids: self.tasks.iter().map(|t| t.id.clone()).collect(),
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&dag)?;

        Ok(dag)
    }

    /// Kahn's algorithm; whatever keeps a non-zero in-degree sits on or
    /// behind a cycle.
    fn validate_no_cycles(dag: &TaskDag) -> Result<(), PlanningError> {
        let mut in_degree: Vec<usize> = dag.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in dag.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != dag.len() {
            let involved: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| dag.id(i).map(String::from))
                .collect();

            return Err(PlanningError::CyclicDependency { involved });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ScopeItem;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::from_scope_item(&ScopeItem::new(id, format!("Task {id}")).blocked_by(deps.iter().copied()))
    }

    #[test]
    fn test_build_simple_graph() {
        let tasks = vec![
            task("01", &[]),
            task("02", &["01"]),
            task("03", &["01"]),
            task("04", &["02", "03"]),
        ];

        let dag = DagBuilder::new(&tasks).build().unwrap();

        assert_eq!(dag.len(), 4);
        assert_eq!(dag.root_tasks(), vec![0]);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let tasks = vec![task("01", &[]), task("02", &["01"]), task("03", &["01"])];

        let dag = DagBuilder::new(&tasks).build().unwrap();

        assert!(dag.dependencies(0).is_empty());
        assert_eq!(dag.dependencies(1), &[0]);
        assert_eq!(dag.dependencies(2), &[0]);
        let dependents = dag.dependents(0);
        assert!(dependents.contains(&1));
        assert!(dependents.contains(&2));
    }

    #[test]
    fn test_cycle_detection() {
        let tasks = vec![task("01", &["03"]), task("02", &["01"]), task("03", &["02"])];

        let err = DagBuilder::new(&tasks).build().unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn test_cycle_behind_valid_root_reports_only_blocked_tasks() {
        let tasks = vec![task("root", &[]), task("a", &["root", "b"]), task("b", &["a"])];

        match DagBuilder::new(&tasks).build().unwrap_err() {
            PlanningError::CyclicDependency { involved } => {
                assert_eq!(involved, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let tasks = vec![task("01", &["nonexistent"])];

        let err = DagBuilder::new(&tasks).build().unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_duplicate_task_id() {
        let tasks = vec![task("01", &[]), task("01", &[])];

        let err = DagBuilder::new(&tasks).build().unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_dependencies_satisfied() {
        let tasks = vec![task("01", &[]), task("02", &["01"]), task("03", &["01", "02"])];

        let dag = DagBuilder::new(&tasks).build().unwrap();
        let mut done = HashSet::new();

        assert!(dag.dependencies_satisfied(0, &done));
        assert!(!dag.dependencies_satisfied(1, &done));

        done.insert(0);
        assert!(dag.dependencies_satisfied(1, &done));
        assert!(!dag.dependencies_satisfied(2, &done));

        done.insert(1);
        assert!(dag.dependencies_satisfied(2, &done));
    }
}
