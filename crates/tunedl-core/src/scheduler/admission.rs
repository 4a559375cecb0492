//! Global admission limit shared across jobs.
//!
//! Each worker holds one permit while its item is inside the pipeline adapter,
//! so the number of concurrently downloading items across all jobs stays under
//! `max_concurrent_items`. Waiters are admitted in FIFO order.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared admission semaphore. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    max_active: usize,
    slots: Arc<Semaphore>,
}

/// Held while an item is being downloaded; the slot is released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate with the given number of slots (at least one).
    pub fn new(max_active: usize) -> Self {
        let max_active = max_active.max(1);
        Self {
            max_active,
            slots: Arc::new(Semaphore::new(max_active)),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.max_active.saturating_sub(self.slots.available_permits())
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> AdmissionPermit {
        // The semaphore is never closed, so acquisition only fails if that
        // invariant is broken.
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("admission semaphore closed"));
        AdmissionPermit { _permit: permit }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }
}
