//! Job status derivation.
//!
//! A job never stores its status. It is recomputed from the multiset of item
//! statuses and two flags every time a snapshot is taken.

use super::types::{ItemStatus, JobStatus};

/// Job-level flags that take part in status derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    /// The worker has claimed at least one item.
    pub started: bool,
    /// `cancel` (or `delete`) was requested.
    pub canceling: bool,
}

/// Count of items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTally {
    pub pending: usize,
    pub downloading: usize,
    pub done: usize,
    pub error: usize,
    pub skipped: usize,
    pub paused: usize,
}

impl ItemTally {
    pub fn from_statuses<I: IntoIterator<Item = ItemStatus>>(statuses: I) -> Self {
        let mut t = ItemTally::default();
        for s in statuses {
            match s {
                ItemStatus::Pending => t.pending += 1,
                ItemStatus::Downloading => t.downloading += 1,
                ItemStatus::Done => t.done += 1,
                ItemStatus::Error => t.error += 1,
                ItemStatus::Skipped => t.skipped += 1,
                ItemStatus::Paused => t.paused += 1,
            }
        }
        t
    }

    pub fn total(&self) -> usize {
        self.pending + self.downloading + self.done + self.error + self.skipped + self.paused
    }

    /// Items that still need the worker (or the user) before the job can settle.
    pub fn unsettled(&self) -> usize {
        self.pending + self.downloading + self.paused
    }
}

/// Pure status function.
///
/// - canceling: `canceled` once every item is terminal, else `canceling`
/// - not started: `queued`
/// - any pending, downloading or paused item: `running`
/// - otherwise `error` if any item errored, else `done`
pub fn derive_status<I: IntoIterator<Item = ItemStatus>>(statuses: I, flags: StatusFlags) -> JobStatus {
    let tally = ItemTally::from_statuses(statuses);
    match (flags.canceling, flags.started) {
        (true, _) if tally.unsettled() == 0 => JobStatus::Canceled,
        (true, _) => JobStatus::Canceling,
        (false, false) => JobStatus::Queued,
        (false, true) if tally.unsettled() > 0 => JobStatus::Running,
        (false, true) if tally.error > 0 => JobStatus::Error,
        (false, true) => JobStatus::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    const ALL: [ItemStatus; 6] = [Pending, Downloading, Done, Error, Skipped, Paused];

    fn running() -> StatusFlags {
        StatusFlags {
            started: true,
            canceling: false,
        }
    }

    #[test]
    fn fresh_job_is_queued() {
        assert_eq!(derive_status([Pending, Pending], StatusFlags::default()), JobStatus::Queued);
    }

    #[test]
    fn all_done_or_skipped_is_done() {
        assert_eq!(derive_status([Done, Skipped, Done], running()), JobStatus::Done);
    }

    #[test]
    fn error_only_once_siblings_settle() {
        assert_eq!(derive_status([Error, Pending], running()), JobStatus::Running);
        assert_eq!(derive_status([Error, Done], running()), JobStatus::Error);
    }

    #[test]
    fn paused_items_keep_job_running() {
        assert_eq!(derive_status([Done, Paused], running()), JobStatus::Running);
    }

    #[test]
    fn cancel_settles_when_everything_is_terminal() {
        let flags = StatusFlags {
            started: true,
            canceling: true,
        };
        assert_eq!(derive_status([Done, Downloading, Pending], flags), JobStatus::Canceling);
        assert_eq!(derive_status([Done, Skipped, Skipped], flags), JobStatus::Canceled);
        assert_eq!(derive_status([Done, Error, Skipped], flags), JobStatus::Canceled);
    }

    #[test]
    fn status_is_a_function_of_the_multiset() {
        // Every two-item combination under every flag pair maps to one of the
        // enumerated statuses, independent of item order.
        for a in ALL {
            for b in ALL {
                for started in [false, true] {
                    for canceling in [false, true] {
                        let flags = StatusFlags { started, canceling };
                        let ab = derive_status([a, b], flags);
                        let ba = derive_status([b, a], flags);
                        assert_eq!(ab, ba, "{a:?} {b:?} {flags:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn tally_counts() {
        let t = ItemTally::from_statuses([Pending, Done, Done, Paused]);
        assert_eq!(t.total(), 4);
        assert_eq!(t.done, 2);
        assert_eq!(t.unsettled(), 2);
    }
}
