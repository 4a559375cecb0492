//! Mutable job record guarded by the per-job lock.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

use crate::control::ActiveItem;
use crate::job::{
    derive_status, DownloadItem, ItemStatus, JobId, JobMeta, JobSnapshot, JobStatus, StatusFlags,
};
use crate::scheduler::progress::{aggregate, ProgressStats};

/// Most recent downloader lines kept per job.
pub const MAX_LOG_LINES: usize = 400;
/// Longest single log line kept (chars).
pub const MAX_LOG_LINE_CHARS: usize = 2000;

/// Authoritative state of one job. Only the worker and the controller
/// mutate it, always through [`super::JobEntry::update`].
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub source_url: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub message: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub items: Vec<DownloadItem>,
    pub paused: bool,
    pub canceling: bool,
    pub started: bool,
    /// `download_root/<id>`: everything the job produced.
    pub output_root: PathBuf,
    /// `output_root` or `output_root/<folder>`: finished artifacts.
    pub output_dir: PathBuf,
    /// `jobs_root/<id>`: temp downloads and the packaged archive.
    pub scratch_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub logs: VecDeque<String>,
    stats: ProgressStats,
    /// Item currently inside the pipeline adapter.
    pub(crate) active: Option<ActiveItem>,
    /// Items paused as a side effect of a job-level pause; re-armed on resume.
    pub(crate) paused_by_job: BTreeSet<u32>,
    pub(crate) worker_active: bool,
    pub(crate) deleting: bool,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        source_url: String,
        items: Vec<DownloadItem>,
        output_dir: PathBuf,
        scratch_dir: PathBuf,
    ) -> Self {
        let now = unix_timestamp();
        let stats = aggregate(&items);
        let message = if items.len() > 1 {
            format!("Job created ({} items)", items.len())
        } else {
            "Job created".to_string()
        };
        Self {
            id,
            source_url,
            created_at: now,
            updated_at: now,
            message,
            title: None,
            thumbnail_url: None,
            items,
            paused: false,
            canceling: false,
            started: false,
            output_root: output_dir.clone(),
            output_dir,
            scratch_dir,
            archive_path: None,
            logs: VecDeque::new(),
            stats,
            active: None,
            paused_by_job: BTreeSet::new(),
            worker_active: false,
            deleting: false,
        }
    }

    /// Set the job root when tracks go into a subfolder of it.
    pub fn with_output_root(mut self, root: PathBuf) -> Self {
        self.output_root = root;
        self
    }

    pub fn status(&self) -> JobStatus {
        derive_status(
            self.items.iter().map(|it| it.status),
            StatusFlags {
                started: self.started,
                canceling: self.canceling,
            },
        )
    }

    pub fn stats(&self) -> ProgressStats {
        self.stats
    }

    /// Recompute aggregates and bump `updated_at`. Called after every mutation.
    pub fn refresh(&mut self) {
        self.stats = aggregate(&self.items);
        self.updated_at = unix_timestamp().max(self.updated_at);
    }

    pub fn item(&self, index: u32) -> Option<&DownloadItem> {
        self.items.iter().find(|it| it.index == index)
    }

    pub fn item_mut(&mut self, index: u32) -> Option<&mut DownloadItem> {
        self.items.iter_mut().find(|it| it.index == index)
    }

    /// Lowest-index item still waiting to be downloaded.
    pub fn next_pending(&self) -> Option<u32> {
        self.items
            .iter()
            .filter(|it| it.status == ItemStatus::Pending)
            .map(|it| it.index)
            .min()
    }

    pub fn has_status(&self, status: ItemStatus) -> bool {
        self.items.iter().any(|it| it.status == status)
    }

    /// Mark every pending or paused item skipped. Returns how many changed.
    pub fn skip_remaining(&mut self) -> usize {
        let mut n = 0;
        for it in self
            .items
            .iter_mut()
            .filter(|it| matches!(it.status, ItemStatus::Pending | ItemStatus::Paused))
        {
            it.status = ItemStatus::Skipped;
            n += 1;
        }
        self.paused_by_job.clear();
        n
    }

    pub fn append_log(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        let line = if line.chars().count() > MAX_LOG_LINE_CHARS {
            let mut cut: String = line.chars().take(MAX_LOG_LINE_CHARS).collect();
            cut.push('…');
            cut
        } else {
            line.to_string()
        };
        self.logs.push_back(line);
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
    }

    pub fn archive_url(&self) -> Option<String> {
        let status = self.status();
        match (&self.archive_path, status) {
            (Some(_), JobStatus::Done | JobStatus::Canceled | JobStatus::Error) => {
                Some(format!("/jobs/{}/download", self.id))
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            source_url: self.source_url.clone(),
            status: self.status(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            progress: self.stats.progress,
            message: self.message.clone(),
            meta: JobMeta {
                title: self.title.clone(),
                thumbnail_url: self.thumbnail_url.clone(),
                total_items: self.stats.total_items,
                current_item: self.stats.current_item,
                downloaded_count: self.stats.downloaded_count,
            },
            items: self.items.clone(),
            paused: self.paused,
            archive_url: self.archive_url(),
            logs: self.logs.iter().cloned().collect(),
        }
    }
}

/// Current time as Unix seconds with sub-second precision.
pub(crate) fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u32) -> JobRecord {
        let items = (1..=n)
            .map(|i| DownloadItem::new(i, format!("Track {i}"), format!("https://example.com/{i}")))
            .collect();
        JobRecord::new(
            "job1".into(),
            "https://example.com/list".into(),
            items,
            PathBuf::from("/tmp/out"),
            PathBuf::from("/tmp/scratch"),
        )
    }

    #[test]
    fn new_record_is_queued() {
        let rec = record(3);
        assert_eq!(rec.status(), JobStatus::Queued);
        assert_eq!(rec.stats().total_items, 3);
        assert_eq!(rec.message, "Job created (3 items)");
        assert!(rec.archive_url().is_none());
    }

    #[test]
    fn next_pending_is_lowest_index() {
        let mut rec = record(3);
        rec.items[0].status = ItemStatus::Done;
        rec.items[1].status = ItemStatus::Paused;
        assert_eq!(rec.next_pending(), Some(3));
        rec.items[1].status = ItemStatus::Pending;
        assert_eq!(rec.next_pending(), Some(2));
    }

    #[test]
    fn skip_remaining_leaves_settled_items() {
        let mut rec = record(4);
        rec.items[0].status = ItemStatus::Done;
        rec.items[1].status = ItemStatus::Error;
        rec.items[2].status = ItemStatus::Paused;
        assert_eq!(rec.skip_remaining(), 2);
        let statuses: Vec<_> = rec.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Done, ItemStatus::Error, ItemStatus::Skipped, ItemStatus::Skipped]
        );
    }

    #[test]
    fn log_is_bounded() {
        let mut rec = record(1);
        for i in 0..(MAX_LOG_LINES + 10) {
            rec.append_log(&format!("line {i}\n"));
        }
        assert_eq!(rec.logs.len(), MAX_LOG_LINES);
        assert_eq!(rec.logs.front().map(String::as_str), Some("line 10"));
        rec.append_log("");
        assert_eq!(rec.logs.len(), MAX_LOG_LINES);

        let long = "x".repeat(MAX_LOG_LINE_CHARS + 5);
        rec.append_log(&long);
        assert_eq!(rec.logs.back().unwrap().chars().count(), MAX_LOG_LINE_CHARS + 1);
    }

    #[test]
    fn archive_url_only_after_settlement() {
        let mut rec = record(1);
        rec.archive_path = Some(PathBuf::from("/tmp/scratch/job1.zip"));
        assert!(rec.archive_url().is_none());
        rec.started = true;
        rec.items[0].status = ItemStatus::Done;
        rec.refresh();
        assert_eq!(rec.archive_url().as_deref(), Some("/jobs/job1/download"));
        assert_eq!(rec.snapshot().progress, 100.0);
    }
}
