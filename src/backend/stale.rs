//! Stale-response filter.
//!
//! Each outbound backend request gets a strictly increasing id before the
//! call starts. When answers arrive, only the answer to the most recently
//! issued request is honored; anything older has been superseded and is
//! dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues request ids and decides whether an answer is still current.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_id: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the id for a request that is about to be sent.
    pub fn issue(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// True iff `id` belongs to the most recently issued request.
    pub fn is_current(&self, id: RequestId) -> bool {
        id.0.checked_add(1) == Some(self.next_id.load(Ordering::SeqCst))
    }

    /// Id that the next call to [`issue`](Self::issue) will return.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.next_id.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let tracker = RequestTracker::new();
        let a = tracker.issue();
        let b = tracker.issue();
        let c = tracker.issue();
        assert!(a < b && b < c);
        assert_eq!(tracker.next_id(), RequestId(3));
    }

    #[test]
    fn test_nothing_is_current_before_first_issue() {
        let tracker = RequestTracker::new();
        assert!(!tracker.is_current(RequestId(0)));
    }

    #[test]
    fn test_only_latest_request_is_current() {
        let tracker = RequestTracker::new();
        let ids: Vec<RequestId> = (0..5).map(|_| tracker.issue()).collect();

        // Answers arrive in reverse order; only the last issued is honored.
        let accepted: Vec<RequestId> = ids
            .iter()
            .rev()
            .copied()
            .filter(|id| tracker.is_current(*id))
            .collect();
        assert_eq!(accepted, vec![ids[4]]);
    }

    #[test]
    fn test_answer_becomes_stale_after_newer_issue() {
        let tracker = RequestTracker::new();
        let first = tracker.issue();
        assert!(tracker.is_current(first));

        let second = tracker.issue();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }
}
