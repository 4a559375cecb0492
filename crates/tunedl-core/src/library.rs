//! Track listing over the download root.
//!
//! A track id is the hex-encoded `/`-separated path relative to the root it
//! was listed from. Resolving an id back to a file rejects anything that
//! escapes that root.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::pipeline::{TrackMeta, COVER_FILE, JOB_META_FILE, TRACK_META_FILE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub rel_path: String,
    pub album: Option<String>,
    pub thumbnail: Option<String>,
    /// Unix seconds.
    pub created_at: Option<f64>,
    pub size_bytes: Option<u64>,
}

pub fn track_id(rel_path: &str) -> String {
    hex::encode(rel_path.as_bytes())
}

pub fn decode_track_id(id: &str) -> Option<String> {
    let bytes = hex::decode(id).ok()?;
    String::from_utf8(bytes).ok()
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn rel_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_str()?.to_string()),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// `<job>/<album>/<track>` → album, `<album>/<track>` → album.
fn album_of(rel: &str) -> Option<String> {
    let parts: Vec<&str> = rel.split('/').collect();
    match parts.len() {
        0 | 1 => None,
        2 => Some(parts[0].to_string()),
        _ => Some(parts[1].to_string()),
    }
}

/// All `*.ext` files under `root`, sorted by relative path. Blocking.
pub fn list_tracks(root: &Path, ext: &str) -> Vec<Track> {
    let mut sidecars: HashMap<PathBuf, BTreeMap<String, TrackMeta>> = HashMap::new();
    let mut tracks = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !has_ext(path, ext) {
            continue;
        }
        let Some(rel) = rel_string(root, path) else {
            continue;
        };
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = entry.metadata().ok();
        let dir = path.parent().unwrap_or(root).to_path_buf();
        let thumbnail = sidecars
            .entry(dir)
            .or_insert_with_key(|dir| read_track_meta(dir))
            .get(&title)
            .and_then(|m| m.thumbnail.clone());
        tracks.push(Track {
            id: track_id(&rel),
            album: album_of(&rel),
            title,
            thumbnail,
            created_at: meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64()),
            size_bytes: meta.map(|m| m.len()),
            rel_path: rel,
        });
    }
    tracks.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    tracks
}

fn read_track_meta(dir: &Path) -> BTreeMap<String, TrackMeta> {
    std::fs::read(dir.join(TRACK_META_FILE))
        .ok()
        .and_then(|data| serde_json::from_slice(&data).ok())
        .unwrap_or_default()
}

/// Map a track id back to an existing `*.ext` file inside `root`.
pub fn resolve_track(root: &Path, id: &str, ext: &str) -> Result<PathBuf, EngineError> {
    let not_found = || EngineError::not_found(format!("track {id}"));
    let rel = decode_track_id(id).ok_or_else(not_found)?;
    if rel.is_empty() || rel.contains('\0') {
        return Err(not_found());
    }
    let rel_path = Path::new(&rel);
    if !rel_path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(not_found());
    }
    let base = root.canonicalize().map_err(|_| not_found())?;
    let full = base.join(rel_path).canonicalize().map_err(|_| not_found())?;
    if !full.starts_with(&base) || full == base || !has_ext(&full, ext) || !full.is_file() {
        return Err(not_found());
    }
    Ok(full)
}

/// Delete a track and prune directories left with nothing but sidecars,
/// up to (not including) `root`. Blocking.
pub fn delete_track(root: &Path, id: &str, ext: &str) -> Result<PathBuf, EngineError> {
    let path = resolve_track(root, id, ext)?;
    std::fs::remove_file(&path).map_err(|e| EngineError::fs("remove", &path, e))?;
    tracing::info!(path = %path.display(), "deleted track");

    let base = root.canonicalize().map_err(|e| EngineError::fs("resolve", root, e))?;
    let mut dir = path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == base || !d.starts_with(&base) || !only_sidecars(&d) {
            break;
        }
        if let Err(e) = std::fs::remove_dir_all(&d) {
            tracing::warn!(path = %d.display(), error = %e, "could not prune directory");
            break;
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    Ok(path)
}

fn only_sidecars(dir: &Path) -> bool {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return false;
    };
    rd.filter_map(Result::ok).all(|e| {
        let name = e.file_name();
        let name = name.to_string_lossy();
        e.file_type().map(|t| t.is_file()).unwrap_or(false)
            && (name == TRACK_META_FILE || name == JOB_META_FILE || name == COVER_FILE)
    })
}
