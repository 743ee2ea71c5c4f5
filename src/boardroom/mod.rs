//! Boardroom: the five-way consensus gate between planning and decomposition.
//!
//! ## Components
//!
//! - [`roles`]: the fixed set of reviewer roles
//! - [`votes`]: vote, verdict and outcome types
//! - [`consensus`]: majority aggregation and concern convergence
//! - [`panel`]: parallel fan-out to the reviewer collaborator
//!
//! ## Example
//!
//! ```
//! use stagegate::boardroom::{aggregate, CritiqueResult, ReviewerRole, Verdict, Vote};
//!
//! let verdicts = [Verdict::Approve, Verdict::Approve, Verdict::Approve, Verdict::Revise, Verdict::Block];
//! let votes: Vec<Vote> = ReviewerRole::all()
//!     .into_iter()
//!     .zip(verdicts)
//!     .map(|(role, verdict)| Vote::new(role, verdict, "rationale"))
//!     .collect();
//!
//! let outcome = aggregate(&votes).unwrap();
//! assert_eq!(outcome.result, CritiqueResult::Approved);
//! ```

pub mod consensus;
pub mod panel;
pub mod roles;
pub mod votes;

pub use consensus::{MAJORITY, aggregate, normalize_concern};
pub use panel::{DEFAULT_REVIEW_TIMEOUT_SECS, ReviewPanel};
pub use roles::{BOARD_SIZE, ReviewerRole};
pub use votes::{CritiqueOutcome, CritiqueResult, Verdict, Vote};
