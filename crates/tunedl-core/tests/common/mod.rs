#![allow(dead_code)]

pub mod fake_downloader;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tunedl_core::job::JobSnapshot;
use tunedl_core::pipeline::PipelineSettings;
use tunedl_core::{JobManager, JobManagerBuilder};

use fake_downloader::FakeDownloader;

/// Engine over `tmp` with fast settings: no progress throttle, short grace.
pub fn builder(dl: &Arc<FakeDownloader>, tmp: &Path) -> JobManagerBuilder {
    JobManagerBuilder::new(tmp.join("download"), tmp.join("jobs"), dl.clone()).settings(
        PipelineSettings {
            progress_interval: Duration::ZERO,
            stop_grace: Duration::from_millis(100),
            ..PipelineSettings::default()
        },
    )
}

/// Poll the job until `pred` holds. Panics after 10 s with the last snapshot.
pub async fn wait_for(
    manager: &JobManager,
    id: &str,
    what: &str,
    pred: impl Fn(&JobSnapshot) -> bool,
) -> JobSnapshot {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let snap = manager.get_job(id).expect("job exists");
        if pred(&snap) {
            return snap;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}: {snap:#?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn urls(n: u32) -> Vec<String> {
    (1..=n).map(|i| format!("https://media.test/t{i}")).collect()
}
