//! On-disk layout and file lifecycle for job artifacts.
//!
//! Layout:
//! - `download_root/<job_id>/[<folder>/]<track>.<ext>`: finished tracks
//! - `jobs_root/<job_id>/tmp/item-<index>/`: per-attempt temp download dir
//! - `jobs_root/<job_id>/<job_id>.zip`: packaged archive
//!
//! The temp dir of an item is wiped before every attempt, so a resumed item
//! always restarts from zero.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::EngineError;

/// Suffix yt-dlp uses for in-progress downloads.
pub const PARTIAL_SUFFIX: &str = "part";

pub fn item_temp_dir(scratch_dir: &Path, index: u32) -> PathBuf {
    scratch_dir.join("tmp").join(format!("item-{index}"))
}

pub fn archive_path(scratch_dir: &Path, job_id: &str) -> PathBuf {
    scratch_dir.join(format!("{job_id}.zip"))
}

/// Remove and recreate `dir`.
pub async fn reset_dir(dir: &Path) -> Result<(), EngineError> {
    remove_tree(dir).await?;
    fs::create_dir_all(dir)
        .await
        .map_err(|e| EngineError::fs("create", dir, e))
}

/// Remove a directory tree; a missing tree is not an error.
pub async fn remove_tree(dir: &Path) -> Result<(), EngineError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::fs("remove", dir, e)),
    }
}

/// Regular files directly inside `dir`, sorted by name.
async fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut rd) = fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            out.push(entry.path());
        }
    }
    out.sort();
    out
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// First converted file with extension `ext` in `dir`.
pub async fn find_artifact(dir: &Path, ext: &str) -> Option<PathBuf> {
    files_in(dir)
        .await
        .into_iter()
        .find(|p| has_extension(p, ext))
}

/// Leftover of an interrupted attempt: a `.part` file if present, else any file.
pub async fn find_partial(dir: &Path) -> Option<PathBuf> {
    let files = files_in(dir).await;
    files
        .iter()
        .find(|p| has_extension(p, PARTIAL_SUFFIX))
        .or_else(|| files.first())
        .cloned()
}

/// `dir/name`, or `dir/stem (n).ext` for the first free `n`.
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(file_name);
    let ext = as_path.extension().and_then(OsStr::to_str);
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move `src` into `dest_dir` under a name that does not clobber an existing
/// track. Falls back to copy + remove across filesystems.
pub async fn finalize_into(src: &Path, dest_dir: &Path) -> Result<PathBuf, EngineError> {
    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| EngineError::fs("create", dest_dir, e))?;
    let name = src
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("track");
    let dest = unique_path(dest_dir, name);
    if fs::rename(src, &dest).await.is_err() {
        fs::copy(src, &dest)
            .await
            .map_err(|e| EngineError::fs("copy", &dest, e))?;
        if let Err(e) = fs::remove_file(src).await {
            tracing::warn!(path = %src.display(), error = %e, "could not remove temp artifact");
        }
    }
    Ok(dest)
}

pub async fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).await.ok().map(|m| m.len())
}
