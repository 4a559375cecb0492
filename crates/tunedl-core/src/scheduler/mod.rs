//! Job scheduling: one worker task per active job, a global admission gate
//! bounding concurrent item downloads, and the progress aggregator.

mod admission;
pub mod progress;
mod worker;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use progress::{aggregate, ProgressStats};
pub use worker::WorkerContext;

use std::sync::Arc;

use crate::store::JobEntry;

/// Spawn the worker for `entry`. The caller must have set `worker_active`
/// under the record lock, which is what keeps a job at one worker.
pub(crate) fn spawn_worker(entry: &Arc<JobEntry>, ctx: &Arc<WorkerContext>) {
    let handle = tokio::spawn(worker::run_worker(Arc::clone(entry), Arc::clone(ctx)));
    entry.set_worker(handle);
}
