//! Staged planning with a consensus gate.
//!
//! A work item moves through explore, plan and a five-seat boardroom. The
//! boardroom either approves the plan, sends it back for refinement (at most
//! three cycles) or halts the pipeline. Approved plans are decomposed into a
//! task graph and dispatched as tracked items in dependency order.

pub mod agents;
pub mod boardroom;
pub mod config;
pub mod dag;
pub mod errors;
pub mod governance;
pub mod logging;
pub mod pipeline;
pub mod planner;
pub mod store;
