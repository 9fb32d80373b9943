//! Hotlist: buffers with unread activity, categorized by priority.

use chrono::{DateTime, Utc};
use relay_protocol::{format_timestamp, HotlistEntry};

/// Activity priorities, low to high. Array indexes in the per-entry
/// counts follow this order.
pub const PRIORITY_LOW: usize = 0;
pub const PRIORITY_MESSAGE: usize = 1;
pub const PRIORITY_PRIVATE: usize = 2;
pub const PRIORITY_HIGHLIGHT: usize = 3;

#[derive(Debug, Clone)]
pub struct Hotlist {
    pub buffer_id: i64,
    /// Buffer number at the time of the last activity.
    pub buffer_number: i32,
    pub priority: u8,
    pub date: DateTime<Utc>,
    pub count: [i64; 4],
}

impl Hotlist {
    pub fn to_wire(&self) -> HotlistEntry {
        HotlistEntry {
            priority: self.priority,
            date: format_timestamp(self.date),
            buffer_id: self.buffer_id,
            count: self.count,
        }
    }
}

/// Sort order of the hotlist, from the `look.hotlist_sort` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotlistSort {
    GroupTimeAsc,
    GroupTimeDesc,
    GroupNumberAsc,
    GroupNumberDesc,
    NumberAsc,
    NumberDesc,
}

impl HotlistSort {
    pub fn from_option(value: &str) -> Self {
        match value {
            "group_time_desc" => Self::GroupTimeDesc,
            "group_number_asc" => Self::GroupNumberAsc,
            "group_number_desc" => Self::GroupNumberDesc,
            "number_asc" => Self::NumberAsc,
            "number_desc" => Self::NumberDesc,
            _ => Self::GroupTimeAsc,
        }
    }
}

/// Sorts entries per the configured order; ties always break on
/// buffer id so the output is deterministic.
pub fn sort_entries(entries: &mut [Hotlist], sort: HotlistSort) {
    entries.sort_by(|a, b| {
        let ordering = match sort {
            HotlistSort::GroupTimeAsc => b
                .priority
                .cmp(&a.priority)
                .then_with(|| a.date.cmp(&b.date)),
            HotlistSort::GroupTimeDesc => b
                .priority
                .cmp(&a.priority)
                .then_with(|| b.date.cmp(&a.date)),
            HotlistSort::GroupNumberAsc => b
                .priority
                .cmp(&a.priority)
                .then_with(|| a.buffer_number.cmp(&b.buffer_number)),
            HotlistSort::GroupNumberDesc => b
                .priority
                .cmp(&a.priority)
                .then_with(|| b.buffer_number.cmp(&a.buffer_number)),
            HotlistSort::NumberAsc => a.buffer_number.cmp(&b.buffer_number),
            HotlistSort::NumberDesc => b.buffer_number.cmp(&a.buffer_number),
        };
        ordering.then_with(|| a.buffer_id.cmp(&b.buffer_id))
    });
}
