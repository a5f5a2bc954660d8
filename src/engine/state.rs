//! Mutable per-task runtime state

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use tokio::sync::Notify;

/// Counters and progress of one running task instance
///
/// Shared between the runner, the status aggregator and the entry point of a
/// single replica. Never shared across replicas.
#[derive(Debug, Default)]
pub struct RuntimeState {
    failures: AtomicU32,
    recoveries: AtomicU32,
    current_index: AtomicI64,
    done: AtomicBool,
    changed: Notify,
}

impl RuntimeState {
    pub fn new(start: i64) -> Self {
        Self {
            current_index: AtomicI64::new(start),
            ..Default::default()
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries.load(Ordering::SeqCst)
    }

    pub fn current_index(&self) -> i64 {
        self.current_index.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn set_current_index(&self, index: i64) {
        self.current_index.store(index, Ordering::SeqCst);
        self.changed.notify_one();
    }

    /// Move the current index forward by `by`, returning the new value
    pub fn advance(&self, by: i64) -> i64 {
        let index = self.current_index.fetch_add(by, Ordering::SeqCst) + by;
        self.changed.notify_one();
        index
    }

    /// Set the terminal done flag. Repeated calls are no-ops.
    pub fn mark_done(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.changed.notify_one();
        }
    }

    /// Returns the new failure count
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decay one failure, never going below zero. Returns the new count.
    pub(crate) fn record_success(&self) -> u32 {
        match self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub(crate) fn reset_failures(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    pub(crate) fn increment_recoveries(&self) -> u32 {
        self.recoveries.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolves after the next index or done-flag change
    pub(crate) async fn changed(&self) {
        self.changed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_never_goes_negative() {
        let state = RuntimeState::new(0);
        assert_eq!(state.record_success(), 0);
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);
        assert_eq!(state.record_success(), 1);
        assert_eq!(state.record_success(), 0);
        assert_eq!(state.record_success(), 0);
        assert_eq!(state.failures(), 0);
    }

    #[test]
    fn test_advance() {
        let state = RuntimeState::new(10);
        assert_eq!(state.advance(5), 15);
        assert_eq!(state.current_index(), 15);
        state.set_current_index(-3);
        assert_eq!(state.current_index(), -3);
    }

    #[test]
    fn test_mark_done_is_idempotent() {
        let state = RuntimeState::new(0);
        state.record_failure();
        state.mark_done();
        state.mark_done();
        assert!(state.is_done());
        assert_eq!(state.failures(), 1);
        assert_eq!(state.recoveries(), 0);
    }

    #[tokio::test]
    async fn test_changed_wakes_after_mark_done() {
        let state = std::sync::Arc::new(RuntimeState::new(0));
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.changed().await })
        };
        state.mark_done();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be notified")
            .unwrap();
    }
}
