//! Downstream hooks run once a job settles, and the ZIP packager.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::job::{ItemStatus, JobSnapshot, JobStatus};
use crate::storage;

/// A job that reached `done`, `error` or `canceled`.
#[derive(Debug, Clone)]
pub struct SettledJob {
    pub snapshot: JobSnapshot,
    pub output_root: PathBuf,
    pub scratch_dir: PathBuf,
}

/// Notified by the worker after settlement. A returned path becomes the
/// job's downloadable archive.
#[async_trait]
pub trait SettlementHook: Send + Sync {
    async fn on_settled(&self, job: &SettledJob) -> Result<Option<PathBuf>>;
}

/// Packs every `done` track into `jobs_root/<id>/<id>.zip`.
///
/// Audio is already compressed, so entries are stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

#[async_trait]
impl SettlementHook for ZipPackager {
    async fn on_settled(&self, job: &SettledJob) -> Result<Option<PathBuf>> {
        if matches!(job.snapshot.status, JobStatus::Error) && job.snapshot.meta.downloaded_count == 0 {
            return Ok(None);
        }
        let files: Vec<(String, PathBuf)> = job
            .snapshot
            .items
            .iter()
            .filter(|it| it.status == ItemStatus::Done)
            .filter_map(|it| it.output_path.clone())
            .filter(|p| p.is_file())
            .map(|p| (entry_name(&job.output_root, &p), p))
            .collect();
        let dest = storage::archive_path(&job.scratch_dir, &job.snapshot.id);
        if files.is_empty() {
            if let Err(e) = tokio::fs::remove_file(&dest).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %job.snapshot.id, path = %dest.display(), error = %e, "could not remove stale archive");
                }
            }
            return Ok(None);
        }
        let count = files.len();
        let out = dest.clone();
        tokio::task::spawn_blocking(move || write_zip(&out, &files))
            .await
            .context("zip task")??;
        tracing::info!(job_id = %job.snapshot.id, tracks = count, path = %dest.display(), "packaged archive");
        Ok(Some(dest))
    }
}

/// Path inside the archive: relative to the job root, `/`-separated.
fn entry_name(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Write to `<dest>.tmp` then rename, so a reader never sees a half archive.
fn write_zip(dest: &Path, files: &[(String, PathBuf)]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = dest.with_extension("zip.tmp");
    {
        let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        for (name, path) in files {
            zip.start_file(name.as_str(), options)?;
            let mut src = File::open(path).with_context(|| format!("open {}", path.display()))?;
            io::copy(&mut src, &mut zip)?;
        }
        zip.finish()?;
    }
    std::fs::rename(&tmp, dest).with_context(|| format!("rename to {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadItem, JobMeta};

    fn settled(root: &Path, scratch: &Path, items: Vec<DownloadItem>, status: JobStatus) -> SettledJob {
        let downloaded_count = items.iter().filter(|i| i.status == ItemStatus::Done).count() as u32;
        SettledJob {
            snapshot: JobSnapshot {
                id: "job1".into(),
                source_url: "https://example.com".into(),
                status,
                created_at: 0.0,
                updated_at: 0.0,
                progress: 100.0,
                message: String::new(),
                meta: JobMeta {
                    total_items: items.len() as u32,
                    downloaded_count,
                    ..JobMeta::default()
                },
                items,
                paused: false,
                archive_url: None,
                logs: Vec::new(),
            },
            output_root: root.to_path_buf(),
            scratch_dir: scratch.to_path_buf(),
        }
    }

    fn item(index: u32, status: ItemStatus, output: Option<PathBuf>) -> DownloadItem {
        let mut it = DownloadItem::new(index, format!("t{index}"), "https://example.com");
        it.status = status;
        it.output_path = output;
        it
    }

    #[tokio::test]
    async fn packs_only_done_tracks() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let folder = root.join("Mix");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("a.mp3"), b"aaa").unwrap();
        std::fs::write(folder.join("b.mp3.part"), b"bb").unwrap();
        let scratch = tmp.path().join("scratch");

        let job = settled(
            &root,
            &scratch,
            vec![
                item(1, ItemStatus::Done, Some(folder.join("a.mp3"))),
                item(2, ItemStatus::Skipped, Some(folder.join("b.mp3.part"))),
            ],
            JobStatus::Canceled,
        );
        let path = ZipPackager.on_settled(&job).await.unwrap().unwrap();
        assert_eq!(path, scratch.join("job1.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "Mix/a.mp3");
        assert_eq!(entry.size(), 3);
    }

    #[tokio::test]
    async fn nothing_done_means_no_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let job = settled(
            tmp.path(),
            tmp.path(),
            vec![item(1, ItemStatus::Error, None)],
            JobStatus::Error,
        );
        assert!(ZipPackager.on_settled(&job).await.unwrap().is_none());
        assert!(!tmp.path().join("job1.zip").exists());
    }

    #[tokio::test]
    async fn stale_archive_is_removed_when_no_tracks_remain() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join("job1.zip");
        std::fs::write(&stale, b"old").unwrap();
        let job = settled(
            tmp.path(),
            tmp.path(),
            vec![item(1, ItemStatus::Skipped, None)],
            JobStatus::Canceled,
        );
        assert!(ZipPackager.on_settled(&job).await.unwrap().is_none());
        assert!(!stale.exists());
        // Nothing left to remove the second time round.
        assert!(ZipPackager.on_settled(&job).await.unwrap().is_none());
    }

    #[test]
    fn entry_names_are_relative() {
        assert_eq!(
            entry_name(Path::new("/d/job"), Path::new("/d/job/Mix/a.mp3")),
            "Mix/a.mp3"
        );
        assert_eq!(entry_name(Path::new("/d/job"), Path::new("/d/job/a.mp3")), "a.mp3");
    }
}
