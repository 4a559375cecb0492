//! Progress aggregation for a job (overall percentage and counters).
//!
//! Pure: the store calls [`aggregate`] after every item transition and copies
//! the result into the record.

use crate::job::{DownloadItem, ItemStatus};

/// Job-level numbers derived from the item list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStats {
    /// Overall percentage in [0.0, 100.0].
    pub progress: f64,
    /// Number of items in `done`.
    pub downloaded_count: u32,
    /// Index of the item currently downloading, if any.
    pub current_item: Option<u32>,
    pub total_items: u32,
}

impl ProgressStats {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        self.progress / 100.0
    }
}

/// Contribution of one item to the job total, in [0.0, 1.0].
///
/// Active items count their own percentage, done and skipped items count
/// fully, pending/paused/error items count nothing until retried.
pub fn item_contribution(item: &DownloadItem) -> f64 {
    match item.status {
        ItemStatus::Downloading => clamp_pct(item.progress) / 100.0,
        ItemStatus::Done | ItemStatus::Skipped => 1.0,
        ItemStatus::Pending | ItemStatus::Paused | ItemStatus::Error => 0.0,
    }
}

/// `progress = 100 * Σ contribution / total_items`.
pub fn aggregate(items: &[DownloadItem]) -> ProgressStats {
    let total_items = items.len() as u32;
    let progress = if items.is_empty() {
        0.0
    } else {
        let sum: f64 = items.iter().map(item_contribution).sum();
        clamp_pct(100.0 * sum / items.len() as f64)
    };
    ProgressStats {
        progress,
        downloaded_count: items
            .iter()
            .filter(|it| it.status == ItemStatus::Done)
            .count() as u32,
        current_item: items
            .iter()
            .find(|it| it.status == ItemStatus::Downloading)
            .map(|it| it.index),
        total_items,
    }
}

pub(crate) fn clamp_pct(p: f64) -> f64 {
    if p.is_nan() {
        return 0.0;
    }
    p.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: u32, status: ItemStatus, progress: f64) -> DownloadItem {
        let mut it = DownloadItem::new(index, format!("t{index}"), "https://example.com");
        it.status = status;
        it.progress = progress;
        it
    }

    #[test]
    fn empty_list_is_zero() {
        let s = aggregate(&[]);
        assert_eq!(s.progress, 0.0);
        assert_eq!(s.total_items, 0);
        assert!(s.current_item.is_none());
    }

    #[test]
    fn mixed_states() {
        let items = vec![
            item(1, ItemStatus::Done, 100.0),
            item(2, ItemStatus::Downloading, 50.0),
            item(3, ItemStatus::Pending, 0.0),
            item(4, ItemStatus::Error, 70.0),
        ];
        let s = aggregate(&items);
        assert!((s.progress - 37.5).abs() < 1e-9);
        assert_eq!(s.downloaded_count, 1);
        assert_eq!(s.current_item, Some(2));
        assert_eq!(s.total_items, 4);
    }

    #[test]
    fn canceled_playlist_gets_skip_credit() {
        let items = vec![
            item(1, ItemStatus::Done, 100.0),
            item(2, ItemStatus::Done, 100.0),
            item(3, ItemStatus::Skipped, 10.0),
            item(4, ItemStatus::Skipped, 0.0),
            item(5, ItemStatus::Skipped, 0.0),
        ];
        let s = aggregate(&items);
        assert_eq!(s.progress, 100.0);
        assert_eq!(s.downloaded_count, 2);
        assert!(s.current_item.is_none());
    }

    #[test]
    fn paused_item_contributes_nothing() {
        let items = vec![item(1, ItemStatus::Paused, 80.0), item(2, ItemStatus::Done, 100.0)];
        assert_eq!(aggregate(&items).progress, 50.0);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let items = vec![item(1, ItemStatus::Downloading, 250.0)];
        assert_eq!(aggregate(&items).progress, 100.0);
        let items = vec![item(1, ItemStatus::Downloading, -5.0)];
        assert_eq!(aggregate(&items).progress, 0.0);
        let items = vec![item(1, ItemStatus::Downloading, f64::NAN)];
        assert_eq!(aggregate(&items).progress, 0.0);
    }
}
