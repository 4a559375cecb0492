//! Request and response bodies. Shared with the CLI client.

use serde::{Deserialize, Serialize};
use tunedl_core::job::{ItemSpec, JobSnapshot, NewJob};
use tunedl_core::library::Track;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub url: String,
}

/// `POST /jobs`. With `video_urls` only the listed entries are downloaded;
/// titles and thumbnails pair with them by position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_titles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_thumbnails: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl CreateJobRequest {
    pub fn into_new_job(self) -> NewJob {
        let titles = self.video_titles.unwrap_or_default();
        let thumbs = self.video_thumbnails.unwrap_or_default();
        let items = self
            .video_urls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, source_url)| ItemSpec {
                source_url,
                title: titles.get(i).cloned(),
                thumbnail: thumbs.get(i).cloned(),
            })
            .collect();
        NewJob {
            source_url: self.url,
            items,
            title: self.title,
            thumbnail_url: self.thumbnail_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `GET /jobs/{id}`: the snapshot plus `download_url` once packaged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: JobSnapshot,
    pub download_url: Option<String>,
}

impl From<JobSnapshot> for JobView {
    fn from(job: JobSnapshot) -> Self {
        let download_url = job.archive_url.clone();
        Self { job, download_url }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackView {
    #[serde(flatten)]
    pub track: Track,
    pub stream_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackList {
    pub tracks: Vec<TrackView>,
}

impl TrackList {
    /// `prefix` is the collection path, e.g. `/jobs/<id>/tracks`.
    pub fn new(prefix: &str, tracks: Vec<Track>) -> Self {
        let tracks = tracks
            .into_iter()
            .map(|track| TrackView {
                stream_url: format!("{prefix}/{}/stream", track.id),
                track,
            })
            .collect();
        Self { tracks }
    }
}
