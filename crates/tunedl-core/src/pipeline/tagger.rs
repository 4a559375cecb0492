//! Post-download tagging: sidecar metadata files and job cover art.
//!
//! Tagging failures never fail an item; the adapter logs them and moves on.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-folder map of track title to its metadata.
pub const TRACK_META_FILE: &str = "__track_meta.json";
/// Job title and thumbnail at the job output root.
pub const JOB_META_FILE: &str = "__job_meta.json";
pub const COVER_FILE: &str = "cover.jpg";

/// Everything a tagger may need about the finished item.
#[derive(Debug, Clone)]
pub struct TagContext<'a> {
    /// Converted file, still in the temp dir.
    pub artifact: &'a Path,
    pub title: &'a str,
    pub source_url: &'a str,
    pub thumbnail: Option<&'a str>,
    /// Folder the artifact is about to be moved into.
    pub output_dir: &'a Path,
    /// `download_root/<job_id>`.
    pub job_root: &'a Path,
    pub job_title: Option<&'a str>,
    pub job_thumbnail: Option<&'a str>,
}

#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tag(&self, ctx: &TagContext<'_>) -> Result<()>;
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTagger;

#[async_trait]
impl Tagger for NoopTagger {
    async fn tag(&self, _ctx: &TagContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetaFile {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Writes `__track_meta.json` / `__job_meta.json` next to the tracks and
/// optionally fetches the job thumbnail as `cover.jpg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarTagger {
    pub fetch_cover: bool,
}

impl SidecarTagger {
    pub fn new(fetch_cover: bool) -> Self {
        Self { fetch_cover }
    }
}

#[async_trait]
impl Tagger for SidecarTagger {
    async fn tag(&self, ctx: &TagContext<'_>) -> Result<()> {
        tokio::fs::create_dir_all(ctx.output_dir)
            .await
            .with_context(|| format!("create {}", ctx.output_dir.display()))?;

        let track_meta = ctx.output_dir.join(TRACK_META_FILE);
        let mut tracks: BTreeMap<String, TrackMeta> = read_json(&track_meta).await.unwrap_or_default();
        tracks.insert(
            ctx.title.to_string(),
            TrackMeta {
                thumbnail: ctx.thumbnail.map(str::to_string),
                source_url: Some(ctx.source_url.to_string()),
            },
        );
        write_json(&track_meta, &tracks).await?;

        if ctx.job_title.is_some() || ctx.job_thumbnail.is_some() {
            let job_meta = ctx.job_root.join(JOB_META_FILE);
            if !job_meta.exists() {
                let meta = JobMetaFile {
                    title: ctx.job_title.map(str::to_string),
                    thumbnail: ctx.job_thumbnail.map(str::to_string),
                };
                write_json(&job_meta, &meta).await?;
            }
        }

        if self.fetch_cover {
            if let Some(thumb) = ctx.job_thumbnail.or(ctx.thumbnail) {
                let cover = ctx.output_dir.join(COVER_FILE);
                if !cover.exists() {
                    let url = thumb.to_string();
                    let dest = cover.clone();
                    tokio::task::spawn_blocking(move || fetch_to_file(&url, &dest))
                        .await
                        .context("cover fetch task")??;
                }
            }
        }
        Ok(())
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let data = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("write {}", path.display()))
}

/// GET `url` into `dest` with libcurl. Blocking; call from `spawn_blocking`.
fn fetch_to_file(url: &str, dest: &Path) -> Result<()> {
    let mut body = Vec::new();
    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid cover URL")?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(10))?;
    easy.timeout(Duration::from_secs(30))?;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform().context("cover request failed")?;
    }
    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("GET {} returned HTTP {}", url, code);
    }
    std::fs::write(dest, &body).with_context(|| format!("write {}", dest.display()))?;
    Ok(())
}
