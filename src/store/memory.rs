//! In-memory store for tests and embedding.

use crate::dag::NewTrackedItem;
use crate::pipeline::{StageRecord, WorkItem};
use crate::store::{ThreadStore, TrackedRecord, ensure_unique, tracked_id};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Thread {
    item: Option<WorkItem>,
    log: Vec<StageRecord>,
    tracked: Vec<TrackedRecord>,
}

/// Store holding everything behind one async mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    threads: Mutex<HashMap<String, Thread>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a work item.
    pub async fn insert(&self, item: WorkItem) {
        let mut threads = self.threads.lock().await;
        let id = item.id.clone();
        threads.entry(id).or_default().item = Some(item);
    }

    pub async fn set_human_gate(&self, id: &str, approved: bool) -> Result<()> {
        let mut threads = self.threads.lock().await;
        let item = threads
            .get_mut(id)
            .and_then(|t| t.item.as_mut())
            .with_context(|| format!("Unknown work item: {id}"))?;
        item.human_gate = approved;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn work_item(&self, id: &str) -> Result<WorkItem> {
        let threads = self.threads.lock().await;
        threads
            .get(id)
            .and_then(|t| t.item.clone())
            .with_context(|| format!("Unknown work item: {id}"))
    }

    async fn append(&self, work_item_id: &str, record: &StageRecord) -> Result<()> {
        let mut threads = self.threads.lock().await;
        let thread = threads.entry(work_item_id.to_string()).or_default();
        ensure_unique(&thread.log, record)?;
        thread.log.push(record.clone());
        Ok(())
    }

    async fn read(&self, work_item_id: &str) -> Result<Vec<StageRecord>> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(work_item_id)
            .map(|t| t.log.clone())
            .unwrap_or_default())
    }

    async fn create_tracked_item(
        &self,
        work_item_id: &str,
        item: &NewTrackedItem,
    ) -> Result<String> {
        let mut threads = self.threads.lock().await;
        let thread = threads.entry(work_item_id.to_string()).or_default();
        let id = tracked_id(work_item_id, thread.tracked.len() + 1);
        thread.tracked.push(TrackedRecord {
            id: id.clone(),
            request: item.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn tracked_items(&self, work_item_id: &str) -> Result<Vec<TrackedRecord>> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(work_item_id)
            .map(|t| t.tracked.clone())
            .unwrap_or_default())
    }
}
