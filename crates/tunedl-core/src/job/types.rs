//! Types shared by the store, the worker and the API layer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Job identifier (32 lowercase hex chars).
pub type JobId = String;

/// Allocate a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Status of one item within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Downloading,
    Done,
    Error,
    Skipped,
    Paused,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Paused => "paused",
        }
    }

    /// Done, error and skipped items need no further work unless resumed.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error | ItemStatus::Skipped)
    }
}

/// Job status, always derived from item statuses plus job flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Canceling,
    Done,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Canceling => "canceling",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Canceled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media unit (track) of a job. `index` is 1-based and fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub index: u32,
    pub title: String,
    pub source_url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    pub status: ItemStatus,
    /// 0..=100
    pub progress: f64,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Partial artifact left behind by an interrupted or failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_path: Option<PathBuf>,
    /// Final artifact location once the item is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl DownloadItem {
    pub fn new(index: u32, title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            source_url: source_url.into(),
            thumbnail: None,
            size_bytes: None,
            status: ItemStatus::Pending,
            progress: 0.0,
            error_msg: None,
            partial_path: None,
            output_path: None,
        }
    }
}

/// Aggregate metadata shown next to the item list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMeta {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub total_items: u32,
    pub current_item: Option<u32>,
    pub downloaded_count: u32,
}

/// Immutable copy of a job handed out by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub source_url: String,
    pub status: JobStatus,
    /// Unix seconds.
    pub created_at: f64,
    pub updated_at: f64,
    pub progress: f64,
    pub message: String,
    pub meta: JobMeta,
    pub items: Vec<DownloadItem>,
    pub paused: bool,
    pub archive_url: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl JobSnapshot {
    pub fn item(&self, index: u32) -> Option<&DownloadItem> {
        self.items.iter().find(|it| it.index == index)
    }
}

/// Lightweight listing row for `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub source_url: String,
    pub status: JobStatus,
    pub progress: f64,
    pub title: Option<String>,
    pub total_items: u32,
    pub downloaded_count: u32,
    pub paused: bool,
    pub created_at: f64,
}

impl From<&JobSnapshot> for JobSummary {
    fn from(s: &JobSnapshot) -> Self {
        Self {
            id: s.id.clone(),
            source_url: s.source_url.clone(),
            status: s.status,
            progress: s.progress,
            title: s.meta.title.clone(),
            total_items: s.meta.total_items,
            downloaded_count: s.meta.downloaded_count,
            paused: s.paused,
            created_at: s.created_at,
        }
    }
}

/// One entry of an explicit multi-item submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSpec {
    pub source_url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Input of `create_job`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
    pub source_url: String,
    /// Empty means a single synthetic item for `source_url`.
    pub items: Vec<ItemSpec>,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl NewJob {
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            source_url: url.into(),
            ..Self::default()
        }
    }

    /// Builds the item list: explicit items keep their order, untitled ones
    /// become `Track <n>`.
    pub fn build_items(&self) -> Vec<DownloadItem> {
        if self.items.is_empty() {
            let mut item = DownloadItem::new(1, placeholder_title(1), self.source_url.clone());
            if let Some(t) = self.title.as_deref() {
                item.title = t.to_string();
            }
            item.thumbnail = self.thumbnail_url.clone();
            return vec![item];
        }
        self.items
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let index = i as u32 + 1;
                let title = spec
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| placeholder_title(index));
                let mut item = DownloadItem::new(index, title, spec.source_url.trim());
                item.thumbnail = spec.thumbnail.clone().filter(|t| !t.is_empty());
                item
            })
            .collect()
    }
}

fn placeholder_title(index: u32) -> String {
    format!("Track {index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_job_gets_one_synthetic_item() {
        let items = NewJob::single("https://example.com/watch?v=abc").build_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].index, 1);
        assert_eq!(items[0].title, "Track 1");
        assert_eq!(items[0].status, ItemStatus::Pending);
        assert_eq!(items[0].source_url, "https://example.com/watch?v=abc");
    }

    #[test]
    fn explicit_items_are_one_indexed_and_titled() {
        let job = NewJob {
            source_url: "https://example.com/playlist?list=x".into(),
            items: vec![
                ItemSpec {
                    source_url: "https://example.com/a".into(),
                    title: Some("Intro".into()),
                    thumbnail: Some("https://img/a.jpg".into()),
                },
                ItemSpec {
                    source_url: "https://example.com/b".into(),
                    title: Some("   ".into()),
                    thumbnail: Some(String::new()),
                },
            ],
            ..NewJob::default()
        };
        let items = job.build_items();
        assert_eq!(items.iter().map(|i| i.index).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(items[0].title, "Intro");
        assert_eq!(items[0].thumbnail.as_deref(), Some("https://img/a.jpg"));
        assert_eq!(items[1].title, "Track 2");
        assert!(items[1].thumbnail.is_none());
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&ItemStatus::Downloading).unwrap(), "\"downloading\"");
        assert_eq!(serde_json::to_string(&JobStatus::Canceled).unwrap(), "\"canceled\"");
        assert_eq!(JobStatus::Canceling.as_str(), "canceling");
    }

    #[test]
    fn job_ids_are_unique_hex() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
