//! Runs one item end to end and classifies the result.
//!
//! The adapter owns the subprocess for the duration of the item. It reports
//! throttled progress and log lines into the job record but never touches
//! item status; the worker settles the item from the returned [`ItemOutcome`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::control::StopToken;
use crate::error::EngineError;
use crate::job::ItemStatus;
use crate::scheduler::progress::clamp_pct;
use crate::storage;
use crate::store::JobEntry;

use super::process::{DownloadHandle, DownloadRequest, Downloader, ProcessEvent};
use super::tagger::{TagContext, Tagger};

/// Adapter tuning, usually taken from the config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum time between two store updates for the same item.
    pub progress_interval: Duration,
    /// SIGTERM → SIGKILL grace.
    pub stop_grace: Duration,
    /// Output lines kept for `error_msg`.
    pub error_tail_lines: usize,
    /// Extension of the converted file (`mp3`, `opus`, ...).
    pub audio_ext: String,
    /// A download archive is configured, so "nothing produced" means
    /// "already downloaded".
    pub archive_configured: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(1000),
            stop_grace: Duration::from_secs(5),
            error_tail_lines: 20,
            audio_ext: "mp3".to_string(),
            archive_configured: false,
        }
    }
}

/// Snapshot of what the worker claimed, taken under the record lock.
#[derive(Debug, Clone)]
pub struct ItemTask {
    pub index: u32,
    pub source_url: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub job_root: PathBuf,
    pub job_title: Option<String>,
    pub job_thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// `output_path` is None when the download archive already had the item.
    Done {
        output_path: Option<PathBuf>,
        size_bytes: Option<u64>,
    },
    Failed {
        message: String,
        partial_path: Option<PathBuf>,
    },
    /// Stop token honored.
    Stopped { partial_path: Option<PathBuf> },
}

enum Step {
    Stop,
    Event(ProcessEvent),
    Eof,
}

/// Throttled writer of progress and log lines into the job record.
struct Reporter<'a> {
    entry: &'a JobEntry,
    index: u32,
    interval: Duration,
    last_flush: Instant,
    progress: Option<f64>,
    lines: Vec<String>,
}

impl<'a> Reporter<'a> {
    fn new(entry: &'a JobEntry, index: u32, interval: Duration) -> Self {
        Self {
            entry,
            index,
            interval,
            last_flush: Instant::now(),
            progress: None,
            lines: Vec::new(),
        }
    }

    fn progress(&mut self, percent: f64) {
        self.progress = Some(clamp_pct(percent));
        self.maybe_flush();
    }

    fn line(&mut self, line: String) {
        self.lines.push(line);
        self.maybe_flush();
    }

    fn maybe_flush(&mut self) {
        if self.last_flush.elapsed() >= self.interval {
            self.flush();
        }
    }

    fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.progress.is_none() && self.lines.is_empty() {
            return;
        }
        let progress = self.progress.take();
        let lines = std::mem::take(&mut self.lines);
        let index = self.index;
        self.entry.update(|rec| {
            if let Some(p) = progress {
                if let Some(item) = rec.item_mut(index) {
                    // yt-dlp restarts its percentage per stream; keep the high mark.
                    if item.status == ItemStatus::Downloading {
                        item.progress = item.progress.max(p);
                    }
                }
            }
            for line in &lines {
                rec.append_log(line);
            }
        });
    }
}

/// The item pipeline: downloader, tagger and file placement.
#[derive(Clone)]
pub struct ItemPipeline {
    downloader: Arc<dyn Downloader>,
    tagger: Arc<dyn Tagger>,
    settings: PipelineSettings,
}

impl std::fmt::Debug for ItemPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ItemPipeline {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        tagger: Arc<dyn Tagger>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            downloader,
            tagger,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute `task`. Always restarts from an empty temp dir.
    pub async fn run_item(&self, entry: &JobEntry, task: &ItemTask, stop: &StopToken) -> ItemOutcome {
        if let Err(e) = storage::reset_dir(&task.temp_dir).await {
            return ItemOutcome::Failed {
                message: e.to_string(),
                partial_path: None,
            };
        }
        if stop.is_requested() {
            return ItemOutcome::Stopped { partial_path: None };
        }

        let req = DownloadRequest {
            url: task.source_url.clone(),
            temp_dir: task.temp_dir.clone(),
        };
        let mut handle = match self.downloader.start(&req).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(index = task.index, error = %e, "downloader did not start");
                let err = EngineError::Downloader {
                    message: e.to_string(),
                    exit_code: None,
                };
                return ItemOutcome::Failed {
                    message: err.to_string(),
                    partial_path: None,
                };
            }
        };

        let mut report = Reporter::new(entry, task.index, self.settings.progress_interval);
        let tail_len = self.settings.error_tail_lines.max(1);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_len);
        let mut destination: Option<PathBuf> = None;
        let mut extracted: Option<PathBuf> = None;

        loop {
            let step = tokio::select! {
                biased;
                _ = stop.requested() => Step::Stop,
                ev = handle.next_event() => match ev {
                    Some(ev) => Step::Event(ev),
                    None => Step::Eof,
                },
            };
            match step {
                Step::Stop => {
                    report.flush();
                    return self.stop_item(handle.as_mut(), task, destination).await;
                }
                Step::Eof => break,
                Step::Event(ProcessEvent::Progress { percent, .. }) => report.progress(percent),
                Step::Event(ProcessEvent::Destination(path)) => {
                    report.line(format!("[download] Destination: {}", path.display()));
                    destination = Some(path);
                }
                Step::Event(ProcessEvent::Extracted(path)) => {
                    report.line(format!("[ExtractAudio] Destination: {}", path.display()));
                    extracted = Some(path);
                }
                Step::Event(ProcessEvent::Output { line, .. }) => {
                    if tail.len() == tail_len {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                    report.line(line);
                }
            }
        }
        report.flush();

        let waited = tokio::select! {
            biased;
            _ = stop.requested() => None,
            r = handle.wait() => Some(r),
        };
        let exit = match waited {
            None => return self.stop_item(handle.as_mut(), task, destination).await,
            Some(Err(e)) => {
                let err = EngineError::ProcessSupervision(e.to_string());
                tracing::warn!(index = task.index, error = %err, "could not reap downloader");
                return ItemOutcome::Failed {
                    message: err.to_string(),
                    partial_path: destination,
                };
            }
            Some(Ok(exit)) => exit,
        };
        // A stop that raced with a clean exit still counts as a stop.
        if stop.is_requested() {
            return ItemOutcome::Stopped {
                partial_path: self.partial_of(task, destination).await,
            };
        }

        if !exit.success() {
            let message = if tail.is_empty() {
                match exit.code {
                    Some(code) => format!("yt-dlp exited with code {code}"),
                    None => "yt-dlp was terminated by a signal".to_string(),
                }
            } else {
                tail.iter().cloned().collect::<Vec<_>>().join("\n")
            };
            tracing::info!(index = task.index, code = ?exit.code, "item failed");
            return ItemOutcome::Failed {
                message,
                partial_path: self.partial_of(task, destination).await,
            };
        }

        self.finish(task, extracted).await
    }

    async fn finish(&self, task: &ItemTask, extracted: Option<PathBuf>) -> ItemOutcome {
        let artifact = match extracted.filter(|p| p.is_file()) {
            Some(p) => Some(p),
            None => storage::find_artifact(&task.temp_dir, &self.settings.audio_ext).await,
        };
        let Some(artifact) = artifact else {
            if self.settings.archive_configured {
                tracing::info!(index = task.index, "already in download archive");
                self.cleanup(task).await;
                return ItemOutcome::Done {
                    output_path: None,
                    size_bytes: None,
                };
            }
            return ItemOutcome::Failed {
                message: format!("no .{} file was produced", self.settings.audio_ext),
                partial_path: storage::find_partial(&task.temp_dir).await,
            };
        };

        let ctx = TagContext {
            artifact: &artifact,
            title: &task.title,
            source_url: &task.source_url,
            thumbnail: task.thumbnail.as_deref(),
            output_dir: &task.output_dir,
            job_root: &task.job_root,
            job_title: task.job_title.as_deref(),
            job_thumbnail: task.job_thumbnail.as_deref(),
        };
        if let Err(e) = self.tagger.tag(&ctx).await {
            tracing::warn!(index = task.index, error = %e, "tagging failed");
        }

        match storage::finalize_into(&artifact, &task.output_dir).await {
            Ok(dest) => {
                let size_bytes = storage::file_size(&dest).await;
                self.cleanup(task).await;
                ItemOutcome::Done {
                    output_path: Some(dest),
                    size_bytes,
                }
            }
            Err(e) => {
                tracing::warn!(index = task.index, error = %e, "could not place artifact");
                ItemOutcome::Failed {
                    message: e.to_string(),
                    partial_path: Some(artifact),
                }
            }
        }
    }

    async fn stop_item(
        &self,
        handle: &mut dyn DownloadHandle,
        task: &ItemTask,
        destination: Option<PathBuf>,
    ) -> ItemOutcome {
        self.terminate(handle, task.index).await;
        tracing::info!(index = task.index, "item stopped");
        ItemOutcome::Stopped {
            partial_path: self.partial_of(task, destination).await,
        }
    }

    /// SIGTERM, wait out the grace period, then SIGKILL.
    async fn terminate(&self, handle: &mut dyn DownloadHandle, index: u32) {
        if let Err(e) = handle.request_stop() {
            tracing::warn!(index, error = %e, "stop request failed");
        }
        match tokio::time::timeout(self.settings.stop_grace, handle.wait()).await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => tracing::warn!(index, error = %e, "wait after stop failed"),
            Err(_) => tracing::debug!(index, "grace period elapsed, killing"),
        }
        if let Err(e) = handle.kill() {
            let err = EngineError::ProcessSupervision(e.to_string());
            tracing::warn!(index, error = %err, "kill failed");
        }
        if !matches!(
            tokio::time::timeout(self.settings.stop_grace, handle.wait()).await,
            Ok(Ok(_))
        ) {
            let err = EngineError::ProcessSupervision("process did not exit after SIGKILL".into());
            tracing::warn!(index, error = %err, "continuing without reaping");
        }
    }

    async fn partial_of(&self, task: &ItemTask, destination: Option<PathBuf>) -> Option<PathBuf> {
        match storage::find_partial(&task.temp_dir).await {
            Some(p) => Some(p),
            None => destination.filter(|p| p.exists()),
        }
    }

    async fn cleanup(&self, task: &ItemTask) {
        if let Err(e) = storage::remove_tree(&task.temp_dir).await {
            tracing::warn!(index = task.index, error = %e, "temp cleanup failed");
        }
    }
}
