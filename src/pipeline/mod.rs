//! The planning pipeline.
//!
//! ```text
//! explore -> plan -> boardroom -+-> decompose -> dispatch
//!                       ^       |
//!                       +-refine+   (Revise, at most 3 cycles)
//! ```
//!
//! State is never stored: [`reduce`] folds a work item's event log into a
//! [`PipelineState`] on every call, and the [`Engine`] appends one
//! [`StageRecord`] per step.

pub mod cycle;
pub mod engine;
pub mod marker;
pub mod reducer;
pub mod runner;
pub mod stage;

pub use cycle::{HaltReason, LoopDecision, MAX_CYCLES, decide};
pub use engine::{AdvanceOutcome, Engine, RunSummary};
pub use reducer::{PipelineState, check_preconditions, reduce};
pub use stage::{
    Approach, BoardroomOutput, CompletionMarker, DispatchOutput, ExploreOutput, PlanDocument,
    RefineOutput, RevisionNote, StageName, StageOutput, StageRecord, WorkItem,
};
