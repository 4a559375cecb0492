use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineSettings;

/// Global configuration loaded from `~/.config/tunedl/config.toml`.
/// Every field has a default, so partial files parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunedlConfig {
    /// Maximum number of items downloading at once across all jobs.
    pub max_concurrent_items: usize,
    /// yt-dlp executable (name on PATH or absolute path).
    pub ytdlp_bin: PathBuf,
    /// Root of finished tracks; defaults to `~/.local/share/tunedl/download`.
    pub download_dir: Option<PathBuf>,
    /// Per-job scratch space; defaults to `~/.local/state/tunedl/jobs`.
    pub jobs_dir: Option<PathBuf>,
    /// Passed to yt-dlp as `--download-archive`.
    pub archive_file: Option<PathBuf>,
    pub audio_format: String,
    /// yt-dlp `--audio-quality` (0 = best VBR).
    pub audio_quality: String,
    /// Embed tags and thumbnail into the converted file.
    pub embed_metadata: bool,
    pub proxy: Option<String>,
    /// Minimum interval between two progress writes for one item.
    pub progress_interval_ms: u64,
    /// SIGTERM to SIGKILL grace when stopping a download.
    pub stop_grace_secs: u64,
    /// Output lines kept in an item's `error_msg`.
    pub error_tail_lines: usize,
    /// Also stop the in-flight item when a job is paused.
    pub interrupt_on_pause: bool,
    /// Fetch the job thumbnail as `cover.jpg` next to the tracks.
    pub fetch_cover: bool,
    /// Address `tunedl serve` binds and client commands connect to.
    pub listen_addr: String,
}

impl Default for TunedlConfig {
    fn default() -> Self {
        Self {
            max_concurrent_items: 3,
            ytdlp_bin: PathBuf::from("yt-dlp"),
            download_dir: None,
            jobs_dir: None,
            archive_file: None,
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
            embed_metadata: true,
            proxy: None,
            progress_interval_ms: 1000,
            stop_grace_secs: 5,
            error_tail_lines: 20,
            interrupt_on_pause: false,
            fetch_cover: true,
            listen_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

impl TunedlConfig {
    pub fn download_root(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_download_dir(),
        }
    }

    pub fn jobs_root(&self) -> Result<PathBuf> {
        match &self.jobs_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_jobs_dir(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            error_tail_lines: self.error_tail_lines.max(1),
            audio_ext: self.audio_format.clone(),
            archive_configured: self.archive_file.is_some(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tunedl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

pub fn default_download_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tunedl")?;
    Ok(xdg_dirs.get_data_home().join("tunedl").join("download"))
}

pub fn default_jobs_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tunedl")?;
    Ok(xdg_dirs.get_state_home().join("tunedl").join("jobs"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TunedlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TunedlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TunedlConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = TunedlConfig::default();
        assert_eq!(cfg.max_concurrent_items, 3);
        assert_eq!(cfg.ytdlp_bin, PathBuf::from("yt-dlp"));
        assert_eq!(cfg.audio_format, "mp3");
        assert_eq!(cfg.progress_interval_ms, 1000);
        assert_eq!(cfg.stop_grace_secs, 5);
        assert!(!cfg.interrupt_on_pause);
        assert_eq!(cfg.listen_addr, "127.0.0.1:5000");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = TunedlConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: TunedlConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_file() {
        let toml = r#"
            max_concurrent_items = 2
            audio_format = "opus"
            download_dir = "/srv/music"
            proxy = "socks5://127.0.0.1:9050"
        "#;
        let cfg: TunedlConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_items, 2);
        assert_eq!(cfg.audio_format, "opus");
        assert_eq!(cfg.download_root().unwrap(), PathBuf::from("/srv/music"));
        assert_eq!(cfg.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
        assert_eq!(cfg.stop_grace_secs, 5);
        assert!(cfg.archive_file.is_none());
    }

    #[test]
    fn pipeline_settings_follow_config() {
        let toml = r#"
            audio_format = "m4a"
            progress_interval_ms = 250
            stop_grace_secs = 2
            error_tail_lines = 0
            archive_file = "/srv/archive.txt"
        "#;
        let cfg: TunedlConfig = toml::from_str(toml).unwrap();
        let s = cfg.pipeline_settings();
        assert_eq!(s.audio_ext, "m4a");
        assert_eq!(s.progress_interval, Duration::from_millis(250));
        assert_eq!(s.stop_grace, Duration::from_secs(2));
        assert_eq!(s.error_tail_lines, 1);
        assert!(s.archive_configured);
    }
}
