//! Task runner: one task instance, run to completion or recovery exhaustion

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::aggregator::StatusAggregator;
use super::handle::TaskHandle;
use super::policy::{self, AttemptOutcome};
use super::state::RuntimeState;
use super::task::TaskConfig;
use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::metrics;

/// Final outcome of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Entry point marked the task done
    Completed,
    /// Bounded range fully consumed
    RangeExhausted,
    /// Recovery budget spent without success
    GaveUp,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Self::GaveUp)
    }
}

/// Summary returned by [`TaskRunner::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Run attempts made, including the first
    pub attempts: u32,
    pub recoveries: u32,
    /// Current index when the runner stopped
    pub last_index: i64,
    pub start: i64,
    pub end: Option<i64>,
}

/// Runs the recovery loop for one task instance
///
/// Owns its [`RuntimeState`]; nothing in it is visible to other runners.
pub struct TaskRunner {
    run_id: Uuid,
    config: TaskConfig,
    collector_config: CollectorConfig,
    state: Arc<RuntimeState>,
}

impl TaskRunner {
    pub fn new(config: TaskConfig, collector_config: CollectorConfig) -> Self {
        let state = Arc::new(RuntimeState::new(config.start()));
        Self {
            run_id: Uuid::new_v4(),
            config,
            collector_config,
            state,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> Arc<RuntimeState> {
        self.state.clone()
    }

    pub async fn run(self) -> RunReport {
        let span = tracing::info_span!(
            "task",
            run_id = %self.run_id,
            source = %self.config.source(),
            base = %self.config.base(),
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> RunReport {
        let config = &self.config;
        let state = &self.state;
        let mut start = config.start();
        let mut attempts = 0u32;
        let mut collector: Option<Arc<Collector>> = None;

        while state.recoveries() <= config.max_recoveries() {
            attempts += 1;
            metrics::record_attempt(config.source());

            collector = self.reset_collector(collector.as_deref());
            let outcome = match &collector {
                Some(collector) => self.run_attempt(start, attempts, collector.clone()).await,
                None => AttemptOutcome::SetupFailed,
            };

            match outcome {
                AttemptOutcome::Done | AttemptOutcome::RangeExhausted => {
                    tracing::info!(
                        source = %config.source(),
                        base = %config.base(),
                        failures = state.failures(),
                        last_index = state.current_index(),
                        attempts,
                        "Harvest finished"
                    );
                    let outcome = if outcome == AttemptOutcome::Done {
                        RunOutcome::Completed
                    } else {
                        RunOutcome::RangeExhausted
                    };
                    metrics::record_finished(config.source(), outcome.is_success());
                    return self.report(outcome, attempts);
                }
                failed => {
                    let failures = state.failures();
                    let last_index = state.current_index();
                    let rewind = policy::recovery_start(last_index, failures, config.page_size());

                    tracing::warn!(
                        source = %config.source(),
                        base = %config.base(),
                        failures,
                        last_index,
                        recovery_start = rewind,
                        reason = ?failed,
                        "Run attempt failed"
                    );
                    if rewind < 0 {
                        tracing::warn!(
                            recovery_start = rewind,
                            "Recovery start index is negative"
                        );
                    }

                    start = rewind;
                    let recoveries = state.recoveries() + 1;
                    if recoveries <= config.max_recoveries() {
                        tokio::time::sleep(config.recovery_delay()).await;
                        metrics::record_recovery(config.source());
                    }
                    state.reset_failures();
                    state.increment_recoveries();
                }
            }
        }

        tracing::error!(
            source = %config.source(),
            base = %config.base(),
            attempts,
            max_recoveries = config.max_recoveries(),
            last_index = state.current_index(),
            "Recovery budget exhausted, giving up"
        );
        metrics::record_finished(config.source(), false);
        self.report(RunOutcome::GaveUp, attempts)
    }

    /// Fresh collector for the next attempt. Falls back to the previous one
    /// when a new client cannot be built.
    fn reset_collector(&self, previous: Option<&Collector>) -> Option<Arc<Collector>> {
        let fresh = match previous {
            Some(previous) => previous.fresh(),
            None => Collector::new(&self.collector_config),
        };

        match fresh {
            Ok(collector) => Some(Arc::new(collector)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to build collector");
                None
            }
        }
    }

    async fn run_attempt(&self, start: i64, attempt: u32, collector: Arc<Collector>) -> AttemptOutcome {
        let config = &self.config;
        let _timer = metrics::start_attempt_timer(config.source());
        self.state.set_current_index(start);

        tracing::debug!(attempt, start, end = ?config.end(), "Starting run attempt");

        let (tx, rx) = mpsc::unbounded_channel();
        let use_aggregator = config.use_status_aggregator();
        let handle = TaskHandle::new(
            config.clone(),
            self.state.clone(),
            collector,
            use_aggregator.then_some(tx),
            start,
            attempt,
        );

        let entry = tokio::spawn((config.entry_point())(handle).in_current_span());

        if use_aggregator {
            let aggregator = StatusAggregator::new(rx, self.state.clone(), config.clone()).spawn();
            match aggregator.await {
                Ok(summary) => tracing::debug!(
                    successes = summary.successes,
                    failures = summary.failures,
                    release = ?summary.release,
                    "Attempt released"
                ),
                Err(e) => tracing::error!(error = %e, "Status aggregator failed"),
            }

            // stale entry points must not outlive their attempt
            entry.abort();
        } else {
            drop(rx);
        }

        if let Err(e) = entry.await {
            if e.is_panic() {
                tracing::error!(attempt, "Entry point panicked");
            }
        }

        policy::classify(&self.state, config)
    }

    fn report(&self, outcome: RunOutcome, attempts: u32) -> RunReport {
        RunReport {
            run_id: self.run_id,
            outcome,
            attempts,
            recoveries: self.state.recoveries(),
            last_index: self.state.current_index(),
            start: self.config.start(),
            end: self.config.end(),
        }
    }
}
