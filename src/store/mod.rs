//! Durable thread and tracker storage.
//!
//! The store is the only thing the engine writes to. Writes are append-only:
//! stage records are appended to a work item's log and tracked items are
//! created, never edited or removed.

mod file;
mod memory;

pub use file::{FileStore, StoredRecord};
pub use memory::MemoryStore;

use crate::dag::NewTrackedItem;
use crate::errors::PipelineError;
use crate::pipeline::{StageRecord, WorkItem};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage for work items, their event logs and their tracked items.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn work_item(&self, id: &str) -> Result<WorkItem>;

    /// Append a record. Fails if the record's marker is already in the log.
    async fn append(&self, work_item_id: &str, record: &StageRecord) -> Result<()>;

    /// The work item's log in append order.
    async fn read(&self, work_item_id: &str) -> Result<Vec<StageRecord>>;

    /// Create a tracked item and return its concrete id.
    async fn create_tracked_item(&self, work_item_id: &str, item: &NewTrackedItem)
    -> Result<String>;

    async fn tracked_items(&self, work_item_id: &str) -> Result<Vec<TrackedRecord>>;
}

/// A tracked item as the tracker holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub id: String,
    pub request: NewTrackedItem,
    pub created_at: DateTime<Utc>,
}

/// Concrete id for the `n`th tracked item of a work item, counting from 1.
pub fn tracked_id(work_item_id: &str, n: usize) -> String {
    format!("{work_item_id}-T{n}")
}

fn ensure_unique(existing: &[StageRecord], record: &StageRecord) -> Result<()> {
    if existing.iter().any(|r| r.marker == record.marker) {
        return Err(PipelineError::DuplicateMarker {
            stage: record.stage,
            cycle: record.cycle,
        }
        .into());
    }
    Ok(())
}
