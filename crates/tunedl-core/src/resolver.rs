//! URL resolution: decide whether a submitted URL is a single track, a
//! playlist, or a channel whose playlists the user must choose from.
//!
//! The engine never depends on this module; the HTTP layer calls it before
//! `create_job` so the user can pick items.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use crate::error::EngineError;
use crate::url_model::{
    looks_like_channel_url, looks_like_playlist_url, to_playlists_tab_url, validate_source_url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    Direct,
    Choose,
    Playlist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistChoice {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub index: u32,
    pub id: Option<String>,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// Entries actually listed; dynamic mixes report a larger count upstream.
    pub total: usize,
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub mode: ResolveMode,
    pub url: Option<String>,
    #[serde(default)]
    pub choices: Vec<PlaylistChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistInfo>,
}

impl Resolution {
    fn direct(url: impl Into<String>) -> Self {
        Self {
            mode: ResolveMode::Direct,
            url: Some(url.into()),
            choices: Vec::new(),
            playlist: None,
        }
    }

    fn playlist(url: impl Into<String>, info: PlaylistInfo) -> Self {
        Self {
            mode: ResolveMode::Playlist,
            url: Some(url.into()),
            choices: Vec::new(),
            playlist: Some(info),
        }
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Resolution, EngineError>;
}

/// Flat JSON metadata for a URL (`yt-dlp --dump-single-json --flat-playlist`).
/// None on any failure.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn dump_json(&self, url: &str) -> Option<Value>;
}

/// Runs yt-dlp for metadata only.
#[derive(Debug, Clone)]
pub struct YtDlpMetadata {
    pub bin: PathBuf,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl YtDlpMetadata {
    pub fn new(bin: impl Into<PathBuf>, proxy: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            proxy,
            timeout: Duration::from_secs(120),
        }
    }
}

#[async_trait]
impl MetadataSource for YtDlpMetadata {
    async fn dump_json(&self, url: &str) -> Option<Value> {
        let mut cmd = Command::new(&self.bin);
        cmd.args([
            "--dump-single-json",
            "--skip-download",
            "--flat-playlist",
            "--no-warnings",
            "--socket-timeout",
            "15",
        ]);
        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            cmd.args(["--proxy", proxy]);
        }
        cmd.arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "could not run yt-dlp for metadata");
                return None;
            }
            Err(_) => {
                tracing::warn!(url, "metadata lookup timed out");
                return None;
            }
        };
        if !out.status.success() {
            tracing::debug!(url, code = ?out.status.code(), "metadata lookup failed");
            return None;
        }
        serde_json::from_slice(&out.stdout).ok()
    }
}

/// The resolver the server uses.
#[derive(Clone)]
pub struct YtDlpResolver {
    source: Arc<dyn MetadataSource>,
}

impl YtDlpResolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }

    async fn playlist_entries(&self, url: &str) -> Option<PlaylistInfo> {
        let info = self.source.dump_json(url).await?;
        let playlist = playlist_from_json(&info);
        (!playlist.entries.is_empty()).then_some(playlist)
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, raw: &str) -> Result<Resolution, EngineError> {
        let url = validate_source_url(raw)?;
        let url_str = url.as_str().to_string();

        if looks_like_playlist_url(&url) {
            return Ok(match self.playlist_entries(&url_str).await {
                Some(info) => Resolution::playlist(url_str, info),
                None => Resolution::direct(url_str),
            });
        }
        if !looks_like_channel_url(&url) {
            return Ok(Resolution::direct(url_str));
        }

        let tab = to_playlists_tab_url(&url);
        let choices = match self.source.dump_json(tab.as_str()).await {
            Some(info) => choices_from_json(&info),
            None => Vec::new(),
        };
        match choices.as_slice() {
            [] => Ok(Resolution::direct(url_str)),
            [only] => Ok(match self.playlist_entries(&only.url).await {
                Some(info) => Resolution::playlist(only.url.clone(), info),
                None => Resolution::direct(only.url.clone()),
            }),
            _ => Ok(Resolution {
                mode: ResolveMode::Choose,
                url: None,
                choices,
                playlist: None,
            }),
        }
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Largest `width * height` thumbnail, ignoring `no_thumbnail` placeholders,
/// else the plain `thumbnail` field.
pub fn best_thumbnail(info: &Value) -> Option<String> {
    let best = info
        .get("thumbnails")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| {
            let url = t.get("url")?.as_str()?;
            if url.is_empty() || url.contains("no_thumbnail") {
                return None;
            }
            let w = t.get("width").and_then(Value::as_u64).unwrap_or(0);
            let h = t.get("height").and_then(Value::as_u64).unwrap_or(0);
            Some((w * h, url))
        })
        // Later entries win ties, matching yt-dlp's preference order.
        .fold(None::<(u64, &str)>, |best, cand| match best {
            Some((area, _)) if area > cand.0 => best,
            _ => Some(cand),
        });
    best.map(|(_, url)| url.to_string())
        .or_else(|| str_field(info, "thumbnail"))
}

/// Playlists listed on a channel's playlists tab, deduplicated by URL.
pub fn choices_from_json(info: &Value) -> Vec<PlaylistChoice> {
    let mut out: Vec<PlaylistChoice> = Vec::new();
    for entry in info.get("entries").and_then(Value::as_array).into_iter().flatten() {
        let Some(url) = str_field(entry, "webpage_url").or_else(|| str_field(entry, "url")) else {
            continue;
        };
        let Ok(parsed) = url::Url::parse(&url) else {
            continue;
        };
        if !looks_like_playlist_url(&parsed) {
            continue;
        }
        let title = str_field(entry, "title").unwrap_or_else(|| url.clone());
        match out.iter_mut().find(|c| c.url == url) {
            Some(existing) => existing.title = title,
            None => out.push(PlaylistChoice { title, url }),
        }
    }
    out
}

pub fn playlist_from_json(info: &Value) -> PlaylistInfo {
    let entries: Vec<PlaylistEntry> = info
        .get("entries")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|e| e.is_object())
        .enumerate()
        .map(|(i, e)| {
            let index = i as u32 + 1;
            let id = str_field(e, "id").or_else(|| str_field(e, "url"));
            let url = str_field(e, "url")
                .or_else(|| str_field(e, "webpage_url"))
                .or_else(|| id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={id}")));
            PlaylistEntry {
                index,
                title: str_field(e, "title").unwrap_or_else(|| format!("Track {index}")),
                duration: e.get("duration").and_then(Value::as_f64),
                thumbnail: str_field(e, "thumbnail").or_else(|| best_thumbnail_only(e)),
                id,
                url,
            }
        })
        .collect();
    PlaylistInfo {
        title: str_field(info, "title"),
        thumbnail: best_thumbnail(info),
        total: entries.len(),
        entries,
    }
}

fn best_thumbnail_only(entry: &Value) -> Option<String> {
    let mut stripped = entry.clone();
    if let Some(obj) = stripped.as_object_mut() {
        obj.remove("thumbnail");
    }
    best_thumbnail(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Canned(HashMap<String, Value>);

    #[async_trait]
    impl MetadataSource for Canned {
        async fn dump_json(&self, url: &str) -> Option<Value> {
            self.0.get(url).cloned()
        }
    }

    fn resolver(pairs: Vec<(&str, Value)>) -> YtDlpResolver {
        let map = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        YtDlpResolver::new(Arc::new(Canned(map)))
    }

    #[tokio::test]
    async fn malformed_url_is_validation_error() {
        let r = resolver(vec![]);
        for bad in ["", "   ", "youtube.com/watch?v=x", "ftp://x.org/a"] {
            let err = r.resolve(bad).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)), "{bad:?}");
            assert!(!err.to_string().is_empty());
        }
    }

    #[tokio::test]
    async fn single_video_is_direct_without_lookup() {
        let r = resolver(vec![]);
        let res = r.resolve("https://www.youtube.com/watch?v=abc").await.unwrap();
        assert_eq!(res.mode, ResolveMode::Direct);
        assert_eq!(res.url.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[tokio::test]
    async fn playlist_lists_entries() {
        let url = "https://www.youtube.com/playlist?list=PL1";
        let r = resolver(vec![(
            url,
            json!({
                "title": "Mix",
                "thumbnails": [
                    {"url": "https://i/small.jpg", "width": 10, "height": 10},
                    {"url": "https://i/big.jpg", "width": 100, "height": 100},
                    {"url": "https://i/no_thumbnail.jpg", "width": 900, "height": 900}
                ],
                "entries": [
                    {"id": "a1", "title": "One", "duration": 61.0},
                    {"id": "b2", "url": "https://www.youtube.com/watch?v=b2"},
                    "garbage"
                ]
            }),
        )]);
        let res = r.resolve(url).await.unwrap();
        assert_eq!(res.mode, ResolveMode::Playlist);
        let pl = res.playlist.unwrap();
        assert_eq!(pl.title.as_deref(), Some("Mix"));
        assert_eq!(pl.thumbnail.as_deref(), Some("https://i/big.jpg"));
        assert_eq!(pl.total, 2);
        assert_eq!(pl.entries[0].url.as_deref(), Some("https://www.youtube.com/watch?v=a1"));
        assert_eq!(pl.entries[1].title, "Track 2");
        assert_eq!(pl.entries[0].duration, Some(61.0));
    }

    #[tokio::test]
    async fn unreadable_playlist_falls_back_to_direct() {
        let r = resolver(vec![]);
        let res = r.resolve("https://www.youtube.com/playlist?list=PL9").await.unwrap();
        assert_eq!(res.mode, ResolveMode::Direct);
    }

    #[tokio::test]
    async fn channel_with_many_playlists_asks_to_choose() {
        let r = resolver(vec![(
            "https://www.youtube.com/@artist/playlists",
            json!({"entries": [
                {"title": "A", "url": "https://www.youtube.com/playlist?list=A"},
                {"title": "B", "url": "https://www.youtube.com/playlist?list=B"},
                {"title": "A again", "url": "https://www.youtube.com/playlist?list=A"},
                {"title": "video", "url": "https://www.youtube.com/watch?v=z"}
            ]}),
        )]);
        let res = r.resolve("https://www.youtube.com/@artist").await.unwrap();
        assert_eq!(res.mode, ResolveMode::Choose);
        assert!(res.url.is_none());
        assert_eq!(res.choices.len(), 2);
        assert_eq!(res.choices[0].title, "A again");
    }

    #[tokio::test]
    async fn channel_with_one_playlist_expands_it() {
        let list = "https://www.youtube.com/playlist?list=ONLY";
        let r = resolver(vec![
            (
                "https://www.youtube.com/@solo/playlists",
                json!({"entries": [{"title": "Only", "url": list}]}),
            ),
            (list, json!({"title": "Only", "entries": [{"id": "x"}]})),
        ]);
        let res = r.resolve("https://www.youtube.com/@solo").await.unwrap();
        assert_eq!(res.mode, ResolveMode::Playlist);
        assert_eq!(res.url.as_deref(), Some(list));
    }

    #[test]
    fn resolution_serializes_for_the_api() {
        let v = serde_json::to_value(Resolution::direct("https://x.org/a")).unwrap();
        assert_eq!(v, json!({"mode": "direct", "url": "https://x.org/a", "choices": []}));
    }
}
