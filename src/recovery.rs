/// Snapshot refresh for symbols the engine has no state for
///
/// An update for an unknown symbol cannot be applied; instead the engine asks
/// an external collaborator for a full snapshot. The tracker remembers which
/// symbols are waiting so a burst of updates produces a single request.

use std::collections::HashSet;

/// Sink for snapshot refresh requests, typically the transport layer.
pub trait RefreshRequester: Send {
    fn request_refresh(&self, symbol: &str);
}

impl<F> RefreshRequester for F
where
    F: Fn(&str) + Send,
{
    fn request_refresh(&self, symbol: &str) {
        self(symbol)
    }
}

/// Drops every request. Used when no snapshot source is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl RefreshRequester for NoRefresh {
    fn request_refresh(&self, _symbol: &str) {}
}

#[derive(Debug, Clone)]
pub struct RefreshTracker {
    pending: HashSet<String>,
    dedupe: bool,
    requests_sent: u64,
}

impl RefreshTracker {
    pub fn new(dedupe: bool) -> Self {
        RefreshTracker {
            pending: HashSet::new(),
            dedupe,
            requests_sent: 0,
        }
    }

    /// Record that `symbol` needs a snapshot. Returns true when a request
    /// should go out.
    pub fn needs_request(&mut self, symbol: &str) -> bool {
        if self.dedupe && !self.pending.insert(symbol.to_string()) {
            return false;
        }
        self.requests_sent += 1;
        true
    }

    /// A snapshot arrived; later misses for this symbol ask again.
    pub fn snapshot_received(&mut self, symbol: &str) {
        self.pending.remove(symbol);
    }

    pub fn is_pending(&self, symbol: &str) -> bool {
        self.pending.contains(symbol)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

impl Default for RefreshTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_dedupes_until_snapshot() {
        let mut tracker = RefreshTracker::new(true);
        assert!(tracker.needs_request("HOZ9"));
        assert!(!tracker.needs_request("HOZ9"));
        assert!(tracker.needs_request("CLZ9"));
        assert_eq!(tracker.pending_count(), 2);

        tracker.snapshot_received("HOZ9");
        assert!(!tracker.is_pending("HOZ9"));
        assert!(tracker.needs_request("HOZ9"));
        assert_eq!(tracker.requests_sent(), 3);
    }

    #[test]
    fn test_without_dedupe_every_miss_requests() {
        let mut tracker = RefreshTracker::new(false);
        assert!(tracker.needs_request("HOZ9"));
        assert!(tracker.needs_request("HOZ9"));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_reset() {
        let mut tracker = RefreshTracker::default();
        tracker.needs_request("HOZ9");
        tracker.reset();
        assert!(tracker.needs_request("HOZ9"));
    }

    #[test]
    fn test_closure_requester() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |symbol: &str| seen.lock().unwrap().push(symbol.to_string())
        };
        sink.request_refresh("ESZ9");
        NoRefresh.request_refresh("ignored");
        assert_eq!(*seen.lock().unwrap(), vec!["ESZ9".to_string()]);
    }
}
