//! In-memory job table with per-job locking.
//!
//! The table lock is only held to look up, insert or remove entries. Each
//! job's record sits behind its own short-lived mutex, so a worker updating
//! progress on one job never blocks readers or writers of another.

mod record;

pub use record::{JobRecord, MAX_LOG_LINES, MAX_LOG_LINE_CHARS};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::job::{JobId, JobSnapshot, JobSummary};

/// One job: its record plus the worker plumbing around it.
#[derive(Debug)]
pub struct JobEntry {
    seq: u64,
    record: Mutex<JobRecord>,
    /// Wakes the worker when it is parked (paused job or paused items).
    pub(crate) wake: Notify,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
    /// Signaled when a worker handle is stored and when a worker exits.
    pub(crate) worker_changed: Notify,
    /// Serializes deletes of the same job.
    pub(crate) delete_gate: tokio::sync::Mutex<()>,
}

impl JobEntry {
    fn new(seq: u64, record: JobRecord) -> Self {
        Self {
            seq,
            record: Mutex::new(record),
            wake: Notify::new(),
            worker: Mutex::new(None),
            worker_changed: Notify::new(),
            delete_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> JobId {
        self.lock().id.clone()
    }

    /// Lock the record. A panic inside a critical section leaves the record
    /// in whatever state it reached, which is still consistent per field.
    pub fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate the record and recompute aggregates before releasing the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut JobRecord) -> R) -> R {
        let mut rec = self.lock();
        let out = f(&mut rec);
        rec.refresh();
        out
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.lock().snapshot()
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        let mut slot = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(handle);
        drop(slot);
        self.worker_changed.notify_waiters();
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Table of all jobs in this process.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: JobRecord) -> Arc<JobEntry> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = record.id.clone();
        let entry = Arc::new(JobEntry::new(seq, record));
        self.jobs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: &str) -> Result<Arc<JobEntry>, EngineError> {
        self.jobs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("job {id}")))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<JobEntry>> {
        self.jobs.write().unwrap_or_else(|p| p.into_inner()).remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries newest first (`created_at` descending, then insertion order).
    pub fn entries(&self) -> Vec<Arc<JobEntry>> {
        let mut entries: Vec<Arc<JobEntry>> = self
            .jobs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.seq));
        entries
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snaps: Vec<(u64, JobSnapshot)> =
            self.entries().iter().map(|e| (e.seq, e.snapshot())).collect();
        snaps.sort_by(|(sa, a), (sb, b)| {
            b.created_at
                .total_cmp(&a.created_at)
                .then_with(|| sb.cmp(sa))
        });
        snaps.into_iter().map(|(_, s)| s).collect()
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        self.snapshots().iter().map(JobSummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadItem, ItemStatus};
    use std::path::PathBuf;

    fn record(id: &str) -> JobRecord {
        JobRecord::new(
            id.into(),
            format!("https://example.com/{id}"),
            vec![DownloadItem::new(1, "Track 1", "https://example.com/a")],
            PathBuf::from("/tmp/o"),
            PathBuf::from("/tmp/s"),
        )
    }

    #[test]
    fn get_unknown_is_not_found() {
        let store = JobStore::new();
        let err = store.get("nope").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(err.to_string(), "job nope not found");
    }

    #[test]
    fn listing_is_newest_first() {
        let store = JobStore::new();
        let a = store.insert(record("a"));
        store.insert(record("b"));
        store.insert(record("c"));
        // Same created_at resolution falls back to insertion order.
        let shared = a.lock().created_at;
        for e in store.entries() {
            e.lock().created_at = shared;
        }
        let ids: Vec<_> = store.snapshots().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(store.summaries().len(), 3);
    }

    #[test]
    fn update_refreshes_aggregates() {
        let store = JobStore::new();
        let entry = store.insert(record("a"));
        entry.update(|rec| {
            rec.started = true;
            rec.items[0].status = ItemStatus::Downloading;
            rec.items[0].progress = 40.0;
        });
        let snap = entry.snapshot();
        assert_eq!(snap.progress, 40.0);
        assert_eq!(snap.meta.current_item, Some(1));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = JobStore::new();
        let entry = store.insert(record("a"));
        let before = entry.snapshot();
        entry.update(|rec| rec.items[0].status = ItemStatus::Skipped);
        assert_eq!(before.items[0].status, ItemStatus::Pending);
        assert!(store.remove("a").is_some());
        assert!(store.is_empty());
    }
}
