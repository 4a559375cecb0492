//! Job control for pause/resume/cancel: stop tokens and record transitions.
//!
//! Every function here runs with the job's record lock held. They only flip
//! flags and item statuses; the worker observes the result at its next
//! checkpoint, and the pipeline adapter observes the [`StopToken`] of the item
//! it is running.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::EngineError;
use crate::job::ItemStatus;
use crate::store::JobRecord;

/// Cooperative stop request for one pipeline invocation.
///
/// Once requested it stays requested; a new attempt gets a new token.
#[derive(Debug, Clone)]
pub struct StopToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`StopToken::request`] has been called.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on request.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// The item a worker currently has inside the pipeline adapter.
#[derive(Debug, Clone)]
pub struct ActiveItem {
    pub index: u32,
    pub stop: StopToken,
}

/// What the caller must do after releasing the record lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct ControlOutcome {
    /// Notify the parked worker.
    pub wake_worker: bool,
    /// No worker is running for this job; spawn one.
    pub restart_worker: bool,
}

impl ControlOutcome {
    fn wake() -> Self {
        Self {
            wake_worker: true,
            restart_worker: false,
        }
    }
}

/// Flag the job as canceling and stop the in-flight item.
///
/// No-op on a job that already settled. If no worker is attached the
/// remaining items are skipped right away.
pub fn request_cancel(rec: &mut JobRecord) -> ControlOutcome {
    if !rec.canceling && rec.status().is_terminal() {
        return ControlOutcome::default();
    }
    if !rec.canceling {
        rec.canceling = true;
        rec.paused = false;
        rec.message = "Canceling".to_string();
    }
    if let Some(active) = &rec.active {
        active.stop.request();
    }
    if !rec.worker_active {
        rec.skip_remaining();
        rec.message = "Canceled".to_string();
    }
    rec.refresh();
    ControlOutcome::wake()
}

/// Stop admitting new items. With `interrupt` the in-flight item is also
/// stopped and re-armed by the matching [`request_resume`].
pub fn request_pause(rec: &mut JobRecord, interrupt: bool) -> ControlOutcome {
    if rec.canceling || rec.status().is_terminal() {
        return ControlOutcome::default();
    }
    rec.paused = true;
    rec.message = "Paused".to_string();
    if interrupt {
        if let Some(active) = &rec.active {
            rec.paused_by_job.insert(active.index);
            active.stop.request();
        }
    }
    rec.refresh();
    ControlOutcome::default()
}

pub fn request_resume(rec: &mut JobRecord) -> ControlOutcome {
    if !rec.paused || rec.canceling {
        return ControlOutcome::default();
    }
    rec.paused = false;
    rec.message = "Resumed".to_string();
    let rearm: Vec<u32> = std::mem::take(&mut rec.paused_by_job).into_iter().collect();
    for index in rearm {
        match rec.item(index).map(|it| it.status) {
            Some(ItemStatus::Paused) => {
                if let Some(item) = rec.item_mut(index) {
                    rearm_item(item);
                }
            }
            // Stop still in flight: the worker re-arms it when it settles.
            Some(ItemStatus::Downloading) => {
                rec.paused_by_job.insert(index);
            }
            _ => {}
        }
    }
    rec.refresh();
    attach_worker(rec)
}

/// `pending` → `paused`; `downloading` → stop request, settles `paused`.
pub fn pause_item(rec: &mut JobRecord, index: u32) -> Result<ControlOutcome, EngineError> {
    let status = rec
        .item(index)
        .map(|it| it.status)
        .ok_or_else(|| EngineError::not_found(format!("item {index} of job {}", rec.id)))?;
    if rec.canceling {
        return Ok(ControlOutcome::default());
    }
    match status {
        ItemStatus::Pending => {
            if let Some(item) = rec.item_mut(index) {
                item.status = ItemStatus::Paused;
            }
            rec.refresh();
            Ok(ControlOutcome::wake())
        }
        ItemStatus::Downloading => {
            rec.paused_by_job.remove(&index);
            if let Some(active) = rec.active.as_ref().filter(|a| a.index == index) {
                active.stop.request();
            }
            Ok(ControlOutcome::default())
        }
        _ => Ok(ControlOutcome::default()),
    }
}

/// `paused`/`error` → `pending`. Restarts the worker of a settled job.
pub fn resume_item(rec: &mut JobRecord, index: u32) -> Result<ControlOutcome, EngineError> {
    let status = rec
        .item(index)
        .map(|it| it.status)
        .ok_or_else(|| EngineError::not_found(format!("item {index} of job {}", rec.id)))?;
    if !matches!(status, ItemStatus::Paused | ItemStatus::Error) {
        return Ok(ControlOutcome::default());
    }
    if rec.canceling || rec.deleting {
        return Err(EngineError::validation(format!(
            "job {} is canceled; items cannot be resumed",
            rec.id
        )));
    }
    if let Some(item) = rec.item_mut(index) {
        rearm_item(item);
    }
    rec.paused_by_job.remove(&index);
    rec.archive_path = None;
    rec.message = format!("Item {index} resumed");
    rec.refresh();
    Ok(attach_worker(rec))
}

fn rearm_item(item: &mut crate::job::DownloadItem) {
    item.status = ItemStatus::Pending;
    item.progress = 0.0;
    item.error_msg = None;
}

fn attach_worker(rec: &mut JobRecord) -> ControlOutcome {
    if rec.worker_active || rec.deleting || !rec.has_status(ItemStatus::Pending) {
        return ControlOutcome::wake();
    }
    rec.worker_active = true;
    ControlOutcome {
        wake_worker: false,
        restart_worker: true,
    }
}
