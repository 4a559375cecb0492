//! Source URL checks and output folder naming.
//!
//! Only http/https URLs are accepted. Playlist and channel detection is
//! purely lexical; the resolver confirms it by asking the downloader.

mod sanitize;

pub use sanitize::sanitize_component;

use url::Url;

use crate::error::EngineError;

/// Folder used for multi-item jobs without a usable title.
pub const DEFAULT_FOLDER: &str = "Selected";

/// Parses and validates a user-supplied source URL.
pub fn validate_source_url(raw: &str) -> Result<Url, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::validation("url is required"));
    }
    let url = Url::parse(raw).map_err(|e| EngineError::validation(format!("invalid url: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(EngineError::validation(format!(
                "invalid url: unsupported scheme {other:?}"
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(EngineError::validation("invalid url: missing host"));
    }
    Ok(url)
}

/// `list=` query or a `/playlist` path.
pub fn looks_like_playlist_url(url: &Url) -> bool {
    url.query_pairs().any(|(k, _)| k == "list") || url.path().contains("/playlist")
}

/// Channel pages (`/@handle`, `/channel/..`, `/c/..`, `/user/..`).
pub fn looks_like_channel_url(url: &Url) -> bool {
    let mut segments = match url.path_segments() {
        Some(s) => s,
        None => return false,
    };
    match segments.next() {
        Some(first) if first.starts_with('@') => true,
        Some("channel" | "c" | "user") => segments.next().is_some_and(|s| !s.is_empty()),
        _ => false,
    }
}

/// The channel's playlists tab: `https://site/@name/videos` → `https://site/@name/playlists`.
pub fn to_playlists_tab_url(url: &Url) -> Url {
    let mut out = url.clone();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let keep = match segments.first() {
        Some(first) if first.starts_with('@') => 1,
        Some(_) => 2,
        None => 0,
    };
    let mut path: String = segments
        .iter()
        .take(keep)
        .map(|s| format!("/{s}"))
        .collect();
    path.push_str("/playlists");
    out.set_path(&path);
    out.set_query(None);
    out.set_fragment(None);
    out
}

/// Output folder name for a multi-item job.
pub fn folder_name(title: Option<&str>) -> String {
    title
        .map(sanitize_component)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string())
}
