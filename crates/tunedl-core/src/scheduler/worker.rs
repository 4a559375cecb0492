//! Per-job worker task.
//!
//! One worker drives a job's items in ascending index order. At the top of
//! each round it consults the record (under the job lock) and either runs
//! the next pending item, parks until woken, or settles the job and exits.

use std::sync::Arc;

use crate::control::{ActiveItem, StopToken};
use crate::job::{ItemStatus, JobStatus};
use crate::package::{SettledJob, SettlementHook};
use crate::pipeline::{ItemOutcome, ItemPipeline, ItemTask};
use crate::storage;
use crate::store::{JobEntry, JobRecord};

use super::admission::AdmissionGate;

/// Shared by every worker of the engine.
pub struct WorkerContext {
    pub admission: AdmissionGate,
    pub pipeline: ItemPipeline,
    pub hooks: Vec<Arc<dyn SettlementHook>>,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("admission", &self.admission)
            .field("pipeline", &self.pipeline)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStep {
    Run,
    Wait,
    Settle,
}

/// Decide what the worker does next. Cancellation skips every item that has
/// not started yet.
pub(crate) fn next_step(rec: &mut JobRecord) -> NextStep {
    if rec.canceling {
        let skipped = rec.skip_remaining();
        if skipped > 0 {
            tracing::debug!(job_id = %rec.id, skipped, "skipped remaining items");
        }
        return NextStep::Settle;
    }
    let pending = rec.has_status(ItemStatus::Pending);
    if !pending && !rec.has_status(ItemStatus::Paused) {
        return NextStep::Settle;
    }
    if pending && !rec.paused {
        return NextStep::Run;
    }
    NextStep::Wait
}

/// Claim the lowest pending item, re-checking the flags under the lock.
pub(crate) fn claim_next(rec: &mut JobRecord) -> Option<(ItemTask, StopToken)> {
    if rec.canceling || rec.paused || rec.deleting {
        return None;
    }
    let index = rec.next_pending()?;
    let total = rec.items.len();
    let stop = StopToken::new();
    let task = {
        let item = rec.item_mut(index)?;
        item.status = ItemStatus::Downloading;
        item.progress = 0.0;
        item.error_msg = None;
        item.partial_path = None;
        item.output_path = None;
        ItemTask {
            index,
            source_url: item.source_url.clone(),
            title: item.title.clone(),
            thumbnail: item.thumbnail.clone(),
            temp_dir: storage::item_temp_dir(&rec.scratch_dir, index),
            output_dir: rec.output_dir.clone(),
            job_root: rec.output_root.clone(),
            job_title: rec.title.clone(),
            job_thumbnail: rec.thumbnail_url.clone(),
        }
    };
    rec.started = true;
    rec.active = Some(ActiveItem {
        index,
        stop: stop.clone(),
    });
    rec.message = if total > 1 {
        format!("Downloading {index}/{total}: {}", task.title)
    } else {
        format!("Downloading {}", task.title)
    };
    Some((task, stop))
}

/// Write the adapter's outcome back into the item.
pub(crate) fn settle_item(rec: &mut JobRecord, index: u32, outcome: ItemOutcome) {
    rec.active = None;
    let canceling = rec.canceling;
    let job_paused = rec.paused;
    let paused_by_job = rec.paused_by_job.remove(&index);
    let job_id = rec.id.clone();
    let Some(item) = rec.item_mut(index) else {
        return;
    };
    let mut message = None;
    match outcome {
        ItemOutcome::Done {
            output_path,
            size_bytes,
        } => {
            item.status = ItemStatus::Done;
            item.progress = 100.0;
            item.error_msg = None;
            item.partial_path = None;
            item.output_path = output_path;
            if size_bytes.is_some() {
                item.size_bytes = size_bytes;
            }
            tracing::info!(job_id = %job_id, index, "item done");
        }
        ItemOutcome::Failed { partial_path, .. } | ItemOutcome::Stopped { partial_path }
            if canceling =>
        {
            item.status = ItemStatus::Skipped;
            item.partial_path = partial_path;
            tracing::info!(job_id = %job_id, index, "item skipped by cancel");
        }
        ItemOutcome::Failed {
            message: error,
            partial_path,
        } => {
            item.status = ItemStatus::Error;
            item.partial_path = partial_path;
            let last = last_line(&error).to_string();
            item.error_msg = Some(error);
            tracing::warn!(job_id = %job_id, index, error = %last, "item failed");
            message = Some(failure_message(index, &last));
        }
        ItemOutcome::Stopped { partial_path } => {
            item.partial_path = partial_path;
            if paused_by_job && !job_paused {
                // The job was resumed while the stop was in flight.
                item.status = ItemStatus::Pending;
                item.progress = 0.0;
            } else {
                item.status = ItemStatus::Paused;
                message = Some(format!("Item {index} paused"));
                if paused_by_job {
                    rec.paused_by_job.insert(index);
                }
            }
            tracing::info!(job_id = %job_id, index, "item paused");
        }
    }
    if let Some(msg) = message {
        rec.message = msg;
    }
}

fn last_line(error: &str) -> &str {
    error.lines().last().unwrap_or_default()
}

fn failure_message(index: u32, last: &str) -> String {
    format!("Item {index} failed: {last}")
}

/// Worker body. The caller set `worker_active` under the lock before spawning.
pub(crate) async fn run_worker(entry: Arc<JobEntry>, ctx: Arc<WorkerContext>) {
    let job_id = entry.id();
    tracing::debug!(job_id = %job_id, "worker started");
    loop {
        match entry.update(next_step) {
            NextStep::Wait => entry.wake.notified().await,
            NextStep::Run => {
                // Control commands wake the worker; re-evaluate instead of
                // holding a queue position for a job that may be canceled.
                let permit = tokio::select! {
                    permit = ctx.admission.acquire() => permit,
                    _ = entry.wake.notified() => continue,
                };
                let Some((task, stop)) = entry.update(claim_next) else {
                    continue;
                };
                tracing::info!(job_id = %job_id, index = task.index, url = %task.source_url, "item started");
                let outcome = ctx.pipeline.run_item(&entry, &task, &stop).await;
                drop(permit);
                entry.update(|rec| settle_item(rec, task.index, outcome));
            }
            NextStep::Settle => {
                if settle_job(&entry, &ctx).await {
                    break;
                }
            }
        }
    }
    entry.worker_changed.notify_waiters();
    tracing::debug!(job_id = %job_id, "worker exited");
}

/// Run the settlement hooks and detach the worker. Returns false when new
/// work arrived meanwhile.
async fn settle_job(entry: &JobEntry, ctx: &WorkerContext) -> bool {
    let (settled, deleting) = {
        let rec = entry.lock();
        (
            SettledJob {
                snapshot: rec.snapshot(),
                output_root: rec.output_root.clone(),
                scratch_dir: rec.scratch_dir.clone(),
            },
            rec.deleting,
        )
    };

    let mut archive = None;
    if !deleting {
        for hook in &ctx.hooks {
            match hook.on_settled(&settled).await {
                Ok(Some(path)) => archive = Some(path),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %settled.snapshot.id, error = %e, "settlement hook failed")
                }
            }
        }
    }

    entry.update(|rec| {
        if rec.has_status(ItemStatus::Pending) || rec.has_status(ItemStatus::Paused) {
            return false;
        }
        if archive.is_some() {
            rec.archive_path = archive;
        }
        rec.worker_active = false;
        let status = rec.status();
        match status {
            JobStatus::Canceled => rec.message = "Canceled".to_string(),
            JobStatus::Done => {
                let s = rec.stats();
                rec.message = if s.total_items > 1 {
                    format!("Done ({}/{} downloaded)", s.downloaded_count, s.total_items)
                } else {
                    "Done".to_string()
                };
            }
            JobStatus::Error => {
                let first = rec.items.iter().find(|it| it.status == ItemStatus::Error);
                if let Some(item) = first {
                    let last = item.error_msg.as_deref().map(last_line).unwrap_or_default();
                    rec.message = failure_message(item.index, last);
                }
            }
            _ => {}
        }
        tracing::info!(job_id = %rec.id, status = %status, "job settled");
        true
    })
}
