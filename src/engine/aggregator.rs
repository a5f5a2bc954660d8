//! Status channel aggregator
//!
//! One aggregator runs next to every run attempt. It folds the entry point's
//! status signals into the failure counter and ends the attempt once
//! [`should_stop`](super::policy::should_stop) holds. Pending signals are
//! always applied before the stop predicate is checked; an empty channel is
//! never a reason to stop on its own.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tokio::task::JoinHandle;

use super::policy::{self, StatusSignal};
use super::state::RuntimeState;
use super::task::TaskConfig;
use crate::metrics;

/// Why the aggregator released its attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The stop predicate held
    Stopped,
    /// Every signal sender was dropped and the channel was drained
    Disconnected,
}

/// What one aggregator saw during its attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSummary {
    pub successes: u64,
    pub failures: u64,
    pub release: Release,
}

pub struct StatusAggregator {
    signals: UnboundedReceiver<StatusSignal>,
    state: Arc<RuntimeState>,
    config: TaskConfig,
    poll_interval: Duration,
    successes: u64,
    failures: u64,
}

impl StatusAggregator {
    pub fn new(
        signals: UnboundedReceiver<StatusSignal>,
        state: Arc<RuntimeState>,
        config: TaskConfig,
    ) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            signals,
            state,
            config,
            poll_interval,
            successes: 0,
            failures: 0,
        }
    }

    /// Run on its own task; the join handle resolves exactly once, when the
    /// attempt is released
    pub fn spawn(self) -> JoinHandle<AggregatorSummary> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> AggregatorSummary {
        loop {
            let disconnected = match self.signals.try_recv() {
                Ok(signal) => {
                    self.apply(signal);
                    continue;
                }
                Err(TryRecvError::Empty) => false,
                Err(TryRecvError::Disconnected) => true,
            };

            if policy::should_stop(&self.state, &self.config) {
                return self.summary(Release::Stopped);
            }

            if disconnected {
                tracing::debug!(
                    source = %self.config.source(),
                    "All status senders dropped, releasing attempt"
                );
                return self.summary(Release::Disconnected);
            }

            tokio::select! {
                biased;
                signal = self.signals.recv() => {
                    if let Some(signal) = signal {
                        self.apply(signal);
                    }
                }
                _ = self.state.changed() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn apply(&mut self, signal: StatusSignal) {
        policy::on_signal(&self.state, signal);

        if signal.is_success() {
            self.successes += 1;
        } else {
            self.failures += 1;
            tracing::debug!(
                source = %self.config.source(),
                code = signal.code(),
                failures = self.state.failures(),
                "Failure signal received"
            );
        }
        metrics::record_signal(self.config.source(), signal.is_success());
    }

    fn summary(&self, release: Release) -> AggregatorSummary {
        AggregatorSummary {
            successes: self.successes,
            failures: self.failures,
            release,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    fn config(max_failures: u32) -> TaskConfig {
        TaskConfig::builder()
            .source("tst")
            .max_failures(max_failures)
            .poll_interval(Duration::from_millis(5))
            .entry_point(|_h| async {})
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_stops_when_failure_budget_spent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RuntimeState::new(0));
        let handle = StatusAggregator::new(rx, state.clone(), config(2)).spawn();

        tx.send(StatusSignal::FAILURE).unwrap();
        tx.send(StatusSignal::FAILURE).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.release, Release::Stopped);
        assert_eq!(summary.failures, 2);
        assert_eq!(state.failures(), 2);
        drop(tx);
    }

    #[tokio::test]
    async fn test_success_interleaving_delays_stop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RuntimeState::new(0));

        // queued before the aggregator starts: all four are applied in order
        tx.send(StatusSignal::FAILURE).unwrap();
        tx.send(StatusSignal::SUCCESS).unwrap();
        tx.send(StatusSignal::FAILURE).unwrap();
        tx.send(StatusSignal::SUCCESS).unwrap();
        drop(tx);

        let summary = StatusAggregator::new(rx, state.clone(), config(2)).run().await;
        assert_eq!(summary.release, Release::Disconnected);
        assert_eq!((summary.successes, summary.failures), (2, 2));
        assert_eq!(state.failures(), 0);
    }

    #[tokio::test]
    async fn test_idle_channel_does_not_stop() {
        let (tx, rx) = mpsc::unbounded_channel::<StatusSignal>();
        let state = Arc::new(RuntimeState::new(0));
        let handle = StatusAggregator::new(rx, state.clone(), config(5)).spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        state.mark_done();
        let summary = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.release, Release::Stopped);
        drop(tx);
    }

    proptest! {
        #[test]
        fn prop_failure_counter_bounds(signals in proptest::collection::vec(any::<bool>(), 0..200)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let state = Arc::new(RuntimeState::new(0));
            let (tx, rx) = mpsc::unbounded_channel();
            for ok in &signals {
                let signal = if *ok { StatusSignal::SUCCESS } else { StatusSignal::FAILURE };
                tx.send(signal).unwrap();
            }
            drop(tx);

            // budget high enough that every signal is consumed
            let summary = rt.block_on(StatusAggregator::new(rx, state.clone(), config(u32::MAX)).run());

            let failure_signals = signals.iter().filter(|ok| !**ok).count() as u32;
            prop_assert!(state.failures() <= failure_signals);
            prop_assert_eq!(summary.failures as u32, failure_signals);
        }
    }
}
