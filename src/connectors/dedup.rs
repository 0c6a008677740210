//! Connector-local message deduplication
//!
//! Platforms redeliver recent history after a reconnect; each connector
//! keeps a sliding window of recently seen `raw_id`s so duplicates never
//! reach the aggregator. The window is owned exclusively by its connector.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum dedup window entries
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Sliding window of recently seen message ids.
///
/// Ids are held in arrival order: `order` is the queue of `(id, seen_at)`
/// pairs and `seen` the membership set. A duplicate is never re-recorded,
/// so each id appears in the queue at most once and expiry can always
/// proceed from the front. When the cap is hit the oldest id is evicted
/// first.
#[derive(Debug)]
pub struct DedupWindow {
    order: VecDeque<(String, Instant)>,
    seen: HashSet<String>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl DedupWindow {
    /// Create a window with explicit bounds
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            ttl,
            max_entries,
        }
    }

    /// Check whether the given id has been seen within the window.
    ///
    /// Returns `true` if this is a duplicate. Returns `false` on first
    /// sight and records the id.
    pub fn is_duplicate(&mut self, raw_id: &str) -> bool {
        let now = Instant::now();

        // Arrival order doubles as expiry order
        while let Some((id, seen_at)) = self.order.front() {
            if now.duration_since(*seen_at) < self.ttl {
                break;
            }
            self.seen.remove(id.as_str());
            self.order.pop_front();
        }

        if self.seen.contains(raw_id) {
            return true;
        }

        if self.order.len() >= self.max_entries {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(raw_id.to_string());
        self.order.push_back((raw_id.to_string(), now));
        false
    }

    /// Number of ids currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_is_not_duplicate() {
        let mut window = DedupWindow::default();
        assert!(!window.is_duplicate("msg-1"));
    }

    #[test]
    fn second_sight_is_duplicate() {
        let mut window = DedupWindow::default();
        assert!(!window.is_duplicate("msg-1"));
        assert!(window.is_duplicate("msg-1"));
    }

    #[test]
    fn distinct_ids_pass() {
        let mut window = DedupWindow::default();
        assert!(!window.is_duplicate("msg-1"));
        assert!(!window.is_duplicate("msg-2"));
        assert!(!window.is_duplicate("msg-3"));
    }

    #[test]
    fn expired_ids_pass_again() {
        let mut window = DedupWindow::new(Duration::from_millis(0), 100);
        assert!(!window.is_duplicate("msg-1"));
        // TTL of zero means the entry is immediately stale
        assert!(!window.is_duplicate("msg-1"));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut window = DedupWindow::new(Duration::from_secs(300), 10);
        for i in 0..50 {
            window.is_duplicate(&format!("msg-{i}"));
        }
        assert!(window.len() <= 10);
    }

    #[test]
    fn cap_evicts_oldest_arrival_first() {
        let mut window = DedupWindow::new(Duration::from_secs(300), 3);
        assert!(!window.is_duplicate("msg-1"));
        assert!(!window.is_duplicate("msg-2"));
        assert!(!window.is_duplicate("msg-3"));

        // Fourth id pushes out msg-1 and nothing newer
        assert!(!window.is_duplicate("msg-4"));
        assert!(!window.is_duplicate("msg-1"));
        assert!(window.is_duplicate("msg-3"));
        assert!(window.is_duplicate("msg-4"));
    }

    #[test]
    fn duplicates_do_not_refresh_arrival_order() {
        let mut window = DedupWindow::new(Duration::from_secs(300), 2);
        assert!(!window.is_duplicate("msg-1"));
        assert!(!window.is_duplicate("msg-2"));

        // Re-seeing msg-1 must not move it to the back of the queue
        assert!(window.is_duplicate("msg-1"));
        assert!(!window.is_duplicate("msg-3"));
        assert!(!window.is_duplicate("msg-1"));
    }
}
