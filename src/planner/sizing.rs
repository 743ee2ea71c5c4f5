//! Splitting oversized tasks into parts that fit the sizing limits.

use crate::errors::PlanningError;
use crate::planner::{SizingLimits, Task, TaskScope};
use std::collections::BTreeSet;

/// Number of parts needed so every dimension fits, never fewer than two.
pub fn part_count(task: &Task, limits: &SizingLimits) -> Result<usize, PlanningError> {
    let mut parts = 2;
    for (dimension, value, limit) in limits.violations(&task.scope.estimate()) {
        if limit == 0 {
            return Err(PlanningError::Unsplittable {
                id: task.id.clone(),
                message: format!("{dimension} limit is 0 but the task needs {value}"),
            });
        }
        parts = parts.max(value.div_ceil(limit));
    }
    Ok(parts)
}

/// Split `task` into `<id>.<n>` parts chained one after another.
///
/// Part 1 inherits the task's blockers and part n is blocked by part n-1.
/// Every list is cut into contiguous, balanced chunks; lines are divided
/// evenly with the remainder going to the first parts.
pub fn split(task: &Task, limits: &SizingLimits) -> Result<Vec<Task>, PlanningError> {
    let k = part_count(task, limits)?;

    let files = chunk(&task.scope.files, k);
    let new_files = chunk(&task.scope.new_files, k);
    let deps = chunk(&task.scope.deps, k);
    let steps = chunk(&task.scope.steps, k);
    let lines = share(task.scope.lines, k);

    let mut parts = Vec::with_capacity(k);
    for n in 0..k {
        let blocked_by = if n == 0 {
            task.blocked_by.clone()
        } else {
            BTreeSet::from([part_id(&task.id, n)])
        };
        parts.push(Task {
            id: part_id(&task.id, n + 1),
            title: format!("{} (part {}/{})", task.title, n + 1, k),
            origin: task.origin.clone(),
            scope: TaskScope {
                files: files[n].clone(),
                new_files: new_files[n].clone(),
                lines: lines[n],
                deps: deps[n].clone(),
                steps: steps[n].clone(),
            },
            blocked_by,
        });
    }
    Ok(parts)
}

pub fn part_id(id: &str, n: usize) -> String {
    format!("{id}.{n}")
}

/// Cut `items` into `k` contiguous chunks whose sizes differ by at most one.
fn chunk(items: &[String], k: usize) -> Vec<Vec<String>> {
    let sizes = share(items.len(), k);
    let mut out = Vec::with_capacity(k);
    let mut start = 0;
    for size in sizes {
        out.push(items[start..start + size].to_vec());
        start += size;
    }
    out
}

/// Divide `total` into `k` shares, remainder to the first shares.
fn share(total: usize, k: usize) -> Vec<usize> {
    let base = total / k;
    let rem = total % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}
