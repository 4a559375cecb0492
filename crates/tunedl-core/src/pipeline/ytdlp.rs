//! yt-dlp invocation for one item.

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::{ChildProcess, DownloadHandle, DownloadRequest, Downloader, PipelineError};
use crate::config::TunedlConfig;

/// Conversion and network options passed on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpOptions {
    pub audio_format: String,
    pub audio_quality: String,
    pub embed_metadata: bool,
    pub archive_file: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
            embed_metadata: true,
            archive_file: None,
            proxy: None,
        }
    }
}

/// The real downloader: one `yt-dlp -x` process per item.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    options: YtDlpOptions,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>, options: YtDlpOptions) -> Self {
        Self {
            bin: bin.into(),
            options,
        }
    }

    pub fn from_config(cfg: &TunedlConfig) -> Self {
        Self::new(
            cfg.ytdlp_bin.clone(),
            YtDlpOptions {
                audio_format: cfg.audio_format.clone(),
                audio_quality: cfg.audio_quality.clone(),
                embed_metadata: cfg.embed_metadata,
                archive_file: cfg.archive_file.clone(),
                proxy: cfg.proxy.clone(),
            },
        )
    }

    pub fn args(&self, req: &DownloadRequest) -> Vec<OsString> {
        let o = &self.options;
        let mut args: Vec<OsString> = [
            "--no-playlist",
            "--newline",
            "--no-mtime",
            "--no-overwrites",
            "--extract-audio",
            "--audio-format",
            o.audio_format.as_str(),
            "--audio-quality",
            o.audio_quality.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        if o.embed_metadata {
            args.push("--add-metadata".into());
            args.push("--embed-thumbnail".into());
        }
        if let Some(archive) = &o.archive_file {
            args.push("--download-archive".into());
            args.push(archive.clone().into_os_string());
        }
        if let Some(proxy) = o.proxy.as_deref().filter(|p| !p.is_empty()) {
            args.push("--proxy".into());
            args.push(proxy.into());
        }
        args.push("--output".into());
        args.push(req.temp_dir.join("%(title)s.%(ext)s").into_os_string());
        args.push("--".into());
        args.push(req.url.clone().into());
        args
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn start(&self, req: &DownloadRequest) -> Result<Box<dyn DownloadHandle>, PipelineError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(self.args(req)).current_dir(&req.temp_dir);
        tracing::debug!(bin = %self.bin.display(), url = %req.url, "starting yt-dlp");
        Ok(Box::new(ChildProcess::spawn(cmd)?))
    }
}
