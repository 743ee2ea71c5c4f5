//! File-backed store.
//!
//! Layout under the store root:
//!
//! ```text
//! items/<work-item>/item.json      work item, including the human gate
//! items/<work-item>/log.jsonl      one StoredRecord per line
//! items/<work-item>/tracked.jsonl  one TrackedRecord per line
//! ```
//!
//! Appends take an exclusive `fs2` lock on the target file and re-read it
//! under the lock, so concurrent writers cannot interleave sequence numbers
//! or slip in a duplicate marker. Trait methods run the file work on tokio's
//! blocking pool.

use crate::dag::NewTrackedItem;
use crate::pipeline::{StageRecord, WorkItem};
use crate::store::{ThreadStore, TrackedRecord, ensure_unique, tracked_id};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// A stage record as written to `log.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub sequence: u64,
    pub record_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub record: StageRecord,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_dir(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join("items").join(id))
    }

    fn item_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.item_dir(id)?.join("item.json"))
    }

    fn log_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.item_dir(id)?.join("log.jsonl"))
    }

    fn tracked_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.item_dir(id)?.join("tracked.jsonl"))
    }

    /// Register a new work item. Fails if the id is taken.
    pub fn create_work_item(&self, item: &WorkItem) -> Result<()> {
        let path = self.item_path(&item.id)?;
        if path.exists() {
            anyhow::bail!("Work item {} already exists", item.id);
        }
        write_item(&path, item)?;
        info!(work_item = %item.id, "Created work item");
        Ok(())
    }

    /// Record the human approval signal on a work item.
    pub fn set_human_gate(&self, id: &str, approved: bool) -> Result<WorkItem> {
        let path = self.item_path(id)?;
        let mut item = read_item(&path, id)?;
        item.human_gate = approved;
        write_item(&path, &item)?;
        info!(work_item = %id, approved, "Human gate updated");
        Ok(item)
    }

    /// All work items, sorted by id.
    pub fn work_items(&self) -> Result<Vec<WorkItem>> {
        let dir = self.root.join("items");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
            }
        };

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read items directory entry")?;
            let path = entry.path().join("item.json");
            if path.exists() {
                let id = entry.file_name().to_string_lossy().to_string();
                items.push(read_item(&path, &id)?);
            }
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    /// The log with its storage metadata.
    pub fn stored_records(&self, id: &str) -> Result<Vec<StoredRecord>> {
        read_lines(&self.log_path(id)?)
    }
}

impl FileStore {
    /// Run `f` on the blocking pool with a handle to this store.
    async fn blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&FileStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("Store task panicked")?
    }

    fn append_record(&self, work_item_id: &str, record: &StageRecord) -> Result<()> {
        let path = self.log_path(work_item_id)?;
        let mut file = open_locked(&path)?;

        let existing: Vec<StoredRecord> = read_from(&file)?;
        let records: Vec<StageRecord> = existing.iter().map(|s| s.record.clone()).collect();
        ensure_unique(&records, record)?;

        let stored = StoredRecord {
            sequence: existing.last().map_or(1, |s| s.sequence + 1),
            record_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            record: record.clone(),
        };
        let line = serde_json::to_string(&stored).context("Failed to serialize stage record")?;
        writeln!(file, "{}", line).context("Failed to append stage record")?;
        file.flush().context("Failed to flush log")?;
        file.sync_all().context("Failed to sync log")?;

        debug!(
            work_item = %work_item_id,
            sequence = stored.sequence,
            marker = %record.marker,
            "Appended stage record"
        );
        Ok(())
    }

    fn append_tracked(&self, work_item_id: &str, item: &NewTrackedItem) -> Result<String> {
        let path = self.tracked_path(work_item_id)?;
        let mut file = open_locked(&path)?;

        let existing: Vec<TrackedRecord> = read_from(&file)?;
        let record = TrackedRecord {
            id: tracked_id(work_item_id, existing.len() + 1),
            request: item.clone(),
            created_at: Utc::now(),
        };
        let line = serde_json::to_string(&record).context("Failed to serialize tracked item")?;
        writeln!(file, "{}", line).context("Failed to append tracked item")?;
        file.flush().context("Failed to flush tracked items")?;
        file.sync_all().context("Failed to sync tracked items")?;

        Ok(record.id)
    }
}

#[async_trait]
impl ThreadStore for FileStore {
    async fn work_item(&self, id: &str) -> Result<WorkItem> {
        let id = id.to_string();
        self.blocking(move |store| read_item(&store.item_path(&id)?, &id))
            .await
    }

    async fn append(&self, work_item_id: &str, record: &StageRecord) -> Result<()> {
        let id = work_item_id.to_string();
        let record = record.clone();
        self.blocking(move |store| store.append_record(&id, &record))
            .await
    }

    async fn read(&self, work_item_id: &str) -> Result<Vec<StageRecord>> {
        let id = work_item_id.to_string();
        let mut stored = self.blocking(move |store| store.stored_records(&id)).await?;
        stored.sort_by_key(|s| s.sequence);
        Ok(stored.into_iter().map(|s| s.record).collect())
    }

    async fn create_tracked_item(
        &self,
        work_item_id: &str,
        item: &NewTrackedItem,
    ) -> Result<String> {
        let id = work_item_id.to_string();
        let item = item.clone();
        self.blocking(move |store| store.append_tracked(&id, &item))
            .await
    }

    async fn tracked_items(&self, work_item_id: &str) -> Result<Vec<TrackedRecord>> {
        let id = work_item_id.to_string();
        self.blocking(move |store| read_lines(&store.tracked_path(&id)?))
            .await
    }
}

/// Ids become directory names, so they must be a single plain path segment.
fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        anyhow::bail!(
            "Invalid work item id '{}': use letters, digits, '-', '_' or '.'",
            id
        );
    }
    Ok(())
}

fn read_item(path: &Path, id: &str) -> Result<WorkItem> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => anyhow::bail!("Unknown work item: {}", id),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write via temp file + rename.
fn write_item(path: &Path, item: &WorkItem) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(item).context("Failed to serialize work item")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn open_locked(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("Failed to lock {}", path.display()))?;
    Ok(file)
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };
    file.lock_shared()
        .with_context(|| format!("Failed to lock {}", path.display()))?;
    read_from(&file)
}

fn read_from<T: DeserializeOwned>(file: &File) -> Result<Vec<T>> {
    let mut handle = file.try_clone().context("Failed to clone file handle")?;
    handle
        .seek(SeekFrom::Start(0))
        .context("Failed to rewind file")?;

    let mut out = Vec::new();
    for (n, line) in BufReader::new(handle).lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(
            serde_json::from_str(&line).with_context(|| format!("Malformed entry on line {}", n + 1))?,
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::pipeline::{DispatchOutput, StageOutput};
    use tempfile::tempdir;

    fn record(cycle: u32) -> StageRecord {
        StageRecord::new(cycle, StageOutput::Dispatch(DispatchOutput { items: vec![] }))
    }

    #[tokio::test]
    async fn work_item_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let item = WorkItem::new("WI-1", "Auth").with_goals(["SSO"]);
        store.create_work_item(&item).unwrap();

        assert_eq!(store.work_item("WI-1").await.unwrap(), item);
        assert!(store.create_work_item(&item).is_err());
    }

    #[tokio::test]
    async fn append_assigns_sequences_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.append("WI-1", &record(1)).await.unwrap();
        store.append("WI-1", &record(2)).await.unwrap();
        let err = store.append("WI-1", &record(1)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::DuplicateMarker { .. })
        ));

        let stored = store.stored_records("WI-1").unwrap();
        assert_eq!(stored.iter().map(|s| s.sequence).collect::<Vec<_>>(), vec![1, 2]);
        assert_ne!(stored[0].record_id, stored[1].record_id);
        assert_eq!(store.read("WI-1").await.unwrap(), vec![record(1), record(2)]);
    }

    #[tokio::test]
    async fn missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.read("WI-1").await.unwrap().is_empty());
        assert!(store.tracked_items("WI-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tracked_ids_are_sequential() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let request = NewTrackedItem {
            title: "t".into(),
            body: "b".into(),
            labels: vec!["stagegate".into()],
            blocked_by: vec![],
        };
        assert_eq!(store.create_tracked_item("WI-1", &request).await.unwrap(), "WI-1-T1");
        assert_eq!(store.create_tracked_item("WI-1", &request).await.unwrap(), "WI-1-T2");
        assert_eq!(store.tracked_items("WI-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn human_gate_persists() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.create_work_item(&WorkItem::new("WI-1", "Auth")).unwrap();
        store.set_human_gate("WI-1", true).unwrap();
        assert!(store.work_item("WI-1").await.unwrap().human_gate);
        assert_eq!(store.work_items().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_distinct_sequences() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let handles: Vec<_> = (1..=8)
            .map(|cycle| {
                let store = store.clone();
                tokio::spawn(async move { store.append("WI-1", &record(cycle)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sequences: Vec<u64> = store
            .stored_records("WI-1")
            .unwrap()
            .iter()
            .map(|s| s.sequence)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
        assert_eq!(store.read("WI-1").await.unwrap().len(), 8);
    }

    #[test]
    fn path_like_ids_are_rejected() {
        assert!(validate_id("../etc").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("").is_err());
        assert!(validate_id("WI-1.2_x").is_ok());
    }
}
