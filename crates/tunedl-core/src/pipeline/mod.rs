//! Item pipeline: the boundary around the external downloader/converter.
//!
//! `ytdlp` builds the command, `process` supervises it and turns its output
//! into [`ProcessEvent`]s (`parse`), `tagger` writes metadata after a
//! successful conversion, and `adapter` ties them together for one item.

mod adapter;
mod parse;
mod process;
mod tagger;
mod ytdlp;

pub use adapter::{ItemOutcome, ItemPipeline, ItemTask, PipelineSettings};
pub use parse::parse_line;
pub use process::{
    ChildProcess, DownloadHandle, DownloadRequest, Downloader, PipelineError, ProcessEvent,
    ProcessExit,
};
pub use tagger::{
    JobMetaFile, NoopTagger, SidecarTagger, TagContext, Tagger, TrackMeta, COVER_FILE,
    JOB_META_FILE, TRACK_META_FILE,
};
pub use ytdlp::{YtDlp, YtDlpOptions};
