//! Task dependency graphs and their dispatch.
//!
//! ## Architecture
//!
//! 1. **Builder** - Indexes tasks and validates the blocking relation is a DAG
//! 2. **Scheduler** - Computes a stable topological order and parallel waves,
//!    and materializes tasks into tracked items behind the human gate
//!
//! ## Example
//!
//! ```
//! use stagegate::dag::{compute_waves, order};
//! use stagegate::planner::{ScopeItem, SizingLimits, TaskPlanner};
//!
//! let items = vec![
//!     ScopeItem::new("01", "Setup"),
//!     ScopeItem::new("02", "Core").blocked_by(["01"]),
//!     ScopeItem::new("03", "Tests").blocked_by(["01"]),
//!     ScopeItem::new("04", "Docs").blocked_by(["02", "03"]),
//! ];
//! let graph = TaskPlanner::new(SizingLimits::default()).plan(&items).unwrap();
//!
//! let ids: Vec<_> = order(&graph).iter().map(|t| t.id.as_str()).collect();
//! assert_eq!(ids, vec!["01", "02", "03", "04"]);
//! assert_eq!(compute_waves(&graph).len(), 3);
//! ```

mod builder;
mod scheduler;

pub use builder::{DagBuilder, TaskDag, TaskIndex};
pub use scheduler::{DispatchScheduler, NewTrackedItem, TrackedItem, compute_waves, order};
