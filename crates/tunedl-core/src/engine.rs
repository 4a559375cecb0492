//! Job engine facade: the operations the HTTP layer and CLI call.
//!
//! `JobManager` owns the store and the shared worker context. Control
//! commands are applied under the job's record lock through [`crate::control`];
//! any worker wakeup or restart they require happens after the lock is
//! released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::TunedlConfig;
use crate::control::{self, ControlOutcome};
use crate::error::EngineError;
use crate::job::{new_job_id, JobId, JobSnapshot, JobSummary, NewJob};
use crate::library::{self, Track};
use crate::package::{SettlementHook, ZipPackager};
use crate::pipeline::{
    Downloader, ItemPipeline, NoopTagger, PipelineSettings, SidecarTagger, Tagger, YtDlp,
};
use crate::scheduler::{spawn_worker, AdmissionGate, WorkerContext};
use crate::storage;
use crate::store::{JobEntry, JobRecord, JobStore};
use crate::url_model::{folder_name, validate_source_url};

/// Builder for [`JobManager`]; tests swap the downloader and hooks here.
pub struct JobManagerBuilder {
    download_root: PathBuf,
    jobs_root: PathBuf,
    downloader: Arc<dyn Downloader>,
    tagger: Arc<dyn Tagger>,
    hooks: Vec<Arc<dyn SettlementHook>>,
    settings: PipelineSettings,
    max_concurrent_items: usize,
    interrupt_on_pause: bool,
}

impl JobManagerBuilder {
    pub fn new(
        download_root: impl Into<PathBuf>,
        jobs_root: impl Into<PathBuf>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            download_root: download_root.into(),
            jobs_root: jobs_root.into(),
            downloader,
            tagger: Arc::new(NoopTagger),
            hooks: vec![Arc::new(ZipPackager)],
            settings: PipelineSettings::default(),
            max_concurrent_items: 3,
            interrupt_on_pause: false,
        }
    }

    pub fn tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn hooks(mut self, hooks: Vec<Arc<dyn SettlementHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_concurrent_items(mut self, n: usize) -> Self {
        self.max_concurrent_items = n;
        self
    }

    pub fn interrupt_on_pause(mut self, on: bool) -> Self {
        self.interrupt_on_pause = on;
        self
    }

    pub fn build(self) -> JobManager {
        let audio_ext = self.settings.audio_ext.clone();
        JobManager {
            store: JobStore::new(),
            ctx: Arc::new(WorkerContext {
                admission: AdmissionGate::new(self.max_concurrent_items),
                pipeline: ItemPipeline::new(self.downloader, self.tagger, self.settings),
                hooks: self.hooks,
            }),
            download_root: self.download_root,
            jobs_root: self.jobs_root,
            audio_ext,
            interrupt_on_pause: self.interrupt_on_pause,
        }
    }
}

/// The job orchestration engine.
#[derive(Debug)]
pub struct JobManager {
    store: JobStore,
    ctx: Arc<WorkerContext>,
    download_root: PathBuf,
    jobs_root: PathBuf,
    audio_ext: String,
    interrupt_on_pause: bool,
}

impl JobManager {
    /// Engine wired to yt-dlp, the sidecar tagger and the ZIP packager.
    pub fn from_config(cfg: &TunedlConfig) -> anyhow::Result<Self> {
        let download_root = cfg.download_root()?;
        let jobs_root = cfg.jobs_root()?;
        std::fs::create_dir_all(&download_root)?;
        std::fs::create_dir_all(&jobs_root)?;
        tracing::info!(
            download_root = %download_root.display(),
            jobs_root = %jobs_root.display(),
            max_concurrent_items = cfg.max_concurrent_items,
            "job engine ready"
        );
        Ok(
            JobManagerBuilder::new(download_root, jobs_root, Arc::new(YtDlp::from_config(cfg)))
                .tagger(Arc::new(SidecarTagger::new(cfg.fetch_cover)))
                .settings(cfg.pipeline_settings())
                .max_concurrent_items(cfg.max_concurrent_items)
                .interrupt_on_pause(cfg.interrupt_on_pause)
                .build(),
        )
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.ctx.admission
    }

    /// Validate, allocate, and start a worker. The job starts `queued`.
    pub fn create_job(&self, new: NewJob) -> Result<JobId, EngineError> {
        let source = validate_source_url(&new.source_url)?;
        for (i, spec) in new.items.iter().enumerate() {
            validate_source_url(&spec.source_url).map_err(|e| {
                EngineError::validation(format!("item {}: {e}", i + 1))
            })?;
        }
        let new = NewJob {
            source_url: source.to_string(),
            ..new
        };

        let id = new_job_id();
        let items = new.build_items();
        let output_root = self.download_root.join(&id);
        let output_dir = if new.items.is_empty() {
            output_root.clone()
        } else {
            output_root.join(folder_name(new.title.as_deref()))
        };
        let mut rec = JobRecord::new(
            id.clone(),
            new.source_url.clone(),
            items,
            output_dir,
            self.jobs_root.join(&id),
        )
        .with_output_root(output_root);
        rec.title = new.title.filter(|t| !t.trim().is_empty());
        rec.thumbnail_url = new.thumbnail_url.filter(|t| !t.is_empty());
        rec.worker_active = true;
        let total = rec.items.len();

        let entry = self.store.insert(rec);
        spawn_worker(&entry, &self.ctx);
        tracing::info!(job_id = %id, url = %new.source_url, items = total, "job created");
        Ok(id)
    }

    pub fn get_job(&self, id: &str) -> Result<JobSnapshot, EngineError> {
        Ok(self.store.get(id)?.snapshot())
    }

    /// Snapshots, newest first.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.store.snapshots()
    }

    pub fn list_summaries(&self) -> Vec<JobSummary> {
        self.store.summaries()
    }

    fn apply(&self, entry: &Arc<JobEntry>, outcome: ControlOutcome) {
        if outcome.restart_worker {
            spawn_worker(entry, &self.ctx);
        } else if outcome.wake_worker {
            entry.wake.notify_one();
        }
    }

    fn control(
        &self,
        id: &str,
        f: impl FnOnce(&mut JobRecord) -> Result<ControlOutcome, EngineError>,
    ) -> Result<(), EngineError> {
        let entry = self.store.get(id)?;
        let outcome = entry.update(f)?;
        self.apply(&entry, outcome);
        Ok(())
    }

    pub fn cancel_job(&self, id: &str) -> Result<(), EngineError> {
        self.control(id, |rec| Ok(control::request_cancel(rec)))?;
        tracing::info!(job_id = %id, "cancel requested");
        Ok(())
    }

    pub fn pause_job(&self, id: &str) -> Result<(), EngineError> {
        let interrupt = self.interrupt_on_pause;
        self.control(id, |rec| Ok(control::request_pause(rec, interrupt)))
    }

    pub fn resume_job(&self, id: &str) -> Result<(), EngineError> {
        self.control(id, |rec| Ok(control::request_resume(rec)))
    }

    pub fn pause_item(&self, id: &str, index: u32) -> Result<(), EngineError> {
        self.control(id, |rec| control::pause_item(rec, index))
    }

    pub fn resume_item(&self, id: &str, index: u32) -> Result<(), EngineError> {
        self.control(id, |rec| control::resume_item(rec, index))
    }

    /// Cancel, wait for the worker (and the subprocess it owns) to finish,
    /// remove the job's directories, then drop the record.
    pub async fn delete_job(&self, id: &str) -> Result<(), EngineError> {
        let entry = self.store.get(id)?;
        let _gate = entry.delete_gate.lock().await;
        if self.store.get(id).is_err() {
            return Ok(());
        }

        let outcome = entry.update(|rec| {
            rec.deleting = true;
            control::request_cancel(rec)
        });
        self.apply(&entry, outcome);
        entry.wake.notify_one();
        self.wait_for_worker(&entry).await;

        let (output_root, scratch_dir) = {
            let rec = entry.lock();
            (rec.output_root.clone(), rec.scratch_dir.clone())
        };
        for dir in [&output_root, &scratch_dir] {
            if let Err(e) = storage::remove_tree(dir).await {
                tracing::warn!(job_id = %id, error = %e, "cleanup failed");
            }
        }
        self.store.remove(id);
        tracing::info!(job_id = %id, "job deleted");
        Ok(())
    }

    async fn wait_for_worker(&self, entry: &JobEntry) {
        loop {
            let changed = entry.worker_changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if let Some(handle) = entry.take_worker() {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "worker task failed");
                    entry.update(|rec| {
                        rec.worker_active = false;
                        rec.active = None;
                    });
                }
                continue;
            }
            if !entry.lock().worker_active {
                return;
            }
            // Restarted worker whose handle is not stored yet.
            changed.await;
        }
    }

    /// Packaged archive, once the job settled and packaging succeeded.
    pub fn archive_path(&self, id: &str) -> Result<Option<PathBuf>, EngineError> {
        let entry = self.store.get(id)?;
        let rec = entry.lock();
        Ok(rec
            .archive_url()
            .and_then(|_| rec.archive_path.clone())
            .filter(|p| p.is_file()))
    }

    /// Drop the packaged archive after the job's tracks changed.
    pub async fn invalidate_archive(&self, id: &str) -> Result<(), EngineError> {
        let entry = self.store.get(id)?;
        let stale = entry.update(|rec| rec.archive_path.take());
        if let Some(path) = stale {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), error = %e, "archive already gone");
            }
        }
        Ok(())
    }

    pub fn job_output_root(&self, id: &str) -> Result<PathBuf, EngineError> {
        let entry = self.store.get(id)?;
        let root = entry.lock().output_root.clone();
        Ok(root)
    }

    /// Tracks produced by one job.
    pub async fn job_tracks(&self, id: &str) -> Result<Vec<Track>, EngineError> {
        let root = self.job_output_root(id)?;
        self.scan(root).await
    }

    pub async fn delete_job_track(&self, id: &str, track_id: &str) -> Result<(), EngineError> {
        let root = self.job_output_root(id)?;
        self.remove_track(root, track_id).await?;
        self.invalidate_archive(id).await
    }

    /// On-disk file of one of the job's tracks.
    pub async fn job_track_path(&self, id: &str, track_id: &str) -> Result<PathBuf, EngineError> {
        let root = self.job_output_root(id)?;
        self.locate(root, track_id).await
    }

    pub async fn library_track_path(&self, track_id: &str) -> Result<PathBuf, EngineError> {
        self.locate(self.download_root.clone(), track_id).await
    }

    /// Every track under the download root.
    pub async fn library_tracks(&self) -> Result<Vec<Track>, EngineError> {
        self.scan(self.download_root.clone()).await
    }

    pub async fn delete_library_track(&self, track_id: &str) -> Result<(), EngineError> {
        let rel = library::decode_track_id(track_id)
            .ok_or_else(|| EngineError::not_found(format!("track {track_id}")))?;
        self.remove_track(self.download_root.clone(), track_id).await?;
        // Tracks live under `<job_id>/`; a job still in memory loses its archive.
        if let Some(job_id) = rel.split('/').next() {
            if self.store.get(job_id).is_ok() {
                self.invalidate_archive(job_id).await?;
            }
        }
        Ok(())
    }

    async fn scan(&self, root: PathBuf) -> Result<Vec<Track>, EngineError> {
        let ext = self.audio_ext.clone();
        let scan_root = root.clone();
        tokio::task::spawn_blocking(move || library::list_tracks(&scan_root, &ext))
            .await
            .map_err(|e| EngineError::fs("scan", root, std::io::Error::other(e)))
    }

    async fn locate(&self, root: PathBuf, track_id: &str) -> Result<PathBuf, EngineError> {
        let ext = self.audio_ext.clone();
        let id = track_id.to_string();
        let task_root = root.clone();
        tokio::task::spawn_blocking(move || library::resolve_track(&task_root, &id, &ext))
            .await
            .map_err(|e| EngineError::fs("resolve", root, std::io::Error::other(e)))?
    }

    async fn remove_track(&self, root: PathBuf, track_id: &str) -> Result<(), EngineError> {
        let ext = self.audio_ext.clone();
        let id = track_id.to_string();
        let task_root = root.clone();
        tokio::task::spawn_blocking(move || library::delete_track(&task_root, &id, &ext))
            .await
            .map_err(|e| EngineError::fs("delete", root, std::io::Error::other(e)))?
            .map(|_| ())
    }

    /// Cancel every job and wait for all workers. Job records and files stay.
    pub async fn shutdown(&self) {
        let entries = self.store.entries();
        for entry in &entries {
            let outcome = entry.update(control::request_cancel);
            self.apply(entry, outcome);
        }
        for entry in &entries {
            self.wait_for_worker(entry).await;
        }
        tracing::info!(jobs = entries.len(), "job engine stopped");
    }
}
