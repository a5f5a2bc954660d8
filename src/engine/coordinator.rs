//! Replica coordinator
//!
//! Supervises a pool of [`TaskRunner`]s. Two counters drive the loop:
//! `active` replicas and remaining `capacity`. A finished replica reports
//! activity -1; one that gave up additionally reports capacity -1, which
//! shrinks the pool for good. The loop ends when both counters reach zero.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::allocator::IndexRange;
use super::runner::{RunOutcome, RunReport, TaskRunner};
use super::task::{Concurrency, TaskConfig};
use crate::context::HarvestContext;
use crate::metrics;

/// Result of a coordinated run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Ranges handed to replicas, in spawn order
    pub assigned: Vec<IndexRange>,
    /// One report per replica, in completion order
    pub reports: Vec<RunReport>,
}

impl PoolReport {
    pub fn completed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    pub fn gave_up(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == RunOutcome::GaveUp)
            .count()
    }
}

pub struct ReplicaCoordinator {
    ctx: Arc<HarvestContext>,
    config: TaskConfig,
}

impl ReplicaCoordinator {
    pub fn new(ctx: Arc<HarvestContext>, config: TaskConfig) -> Self {
        Self { ctx, config }
    }

    /// Run the task: a single runner when no concurrency is configured,
    /// otherwise a replica pool
    pub async fn run(self) -> PoolReport {
        if let Some(setup) = self.config.setup() {
            tracing::debug!(source = %self.config.source(), "Running setup action");
            setup().await;
        }

        match self.config.concurrency() {
            None => self.run_sequential().await,
            Some(concurrency) => self.run_pool(concurrency).await,
        }
    }

    async fn run_sequential(self) -> PoolReport {
        let collector = self.ctx.settings().collector.clone();
        let report = TaskRunner::new(self.config, collector).run().await;
        PoolReport {
            assigned: Vec::new(),
            reports: vec![report],
        }
    }

    async fn run_pool(self, concurrency: Concurrency) -> PoolReport {
        let source = self.config.source().to_string();
        let end = self.config.end().unwrap_or(i64::MAX);

        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel::<isize>();
        let (capacity_tx, mut capacity_rx) = mpsc::unbounded_channel::<isize>();

        let mut active: usize = 0;
        let mut capacity: usize = concurrency.replicas;
        let mut replicas = JoinSet::new();
        let mut report = PoolReport::default();

        // every pool walks its own range from the configured origin
        let origin = self
            .ctx
            .settings()
            .control
            .cursor_seed
            .unwrap_or(self.config.start());
        self.ctx.allocator().seed(Some(origin)).await;

        tracing::info!(
            source = %source,
            replicas = concurrency.replicas,
            range_width = concurrency.range_width,
            start = self.config.start(),
            end,
            "Starting replica pool"
        );

        loop {
            // activity before capacity: a replica reports capacity first
            drain(&mut activity_rx, &mut active);
            drain(&mut capacity_rx, &mut capacity);
            metrics::set_active_replicas(&source, active);

            if active == 0 && capacity == 0 {
                break;
            }

            if active < capacity {
                let allocated = self
                    .ctx
                    .allocator()
                    .allocate(concurrency.range_width, self.config.start())
                    .await;

                let range = match allocated {
                    Some(range) if range.start <= end => range,
                    Some(range) => {
                        tracing::debug!(range = %range, end, "Range past end index, shrinking pool");
                        capacity -= 1;
                        continue;
                    }
                    None => {
                        tracing::warn!(end, "Index space exhausted, shrinking pool");
                        capacity -= 1;
                        continue;
                    }
                };

                let replica = report.assigned.len();
                let range = IndexRange {
                    start: range.start,
                    end: range.end.min(end),
                };
                report.assigned.push(range);

                let runner = TaskRunner::new(
                    self.config.for_range(range.start, range.end),
                    self.ctx.settings().collector.clone(),
                );
                let span = tracing::info_span!("replica", replica, range = %range);
                let activity_tx = activity_tx.clone();
                let capacity_tx = capacity_tx.clone();

                tracing::info!(replica, range = %range, "Spawning replica");
                replicas.spawn(
                    async move {
                        let run = runner.run().await;
                        if run.outcome == RunOutcome::GaveUp {
                            let _ = capacity_tx.send(-1);
                        }
                        let _ = activity_tx.send(-1);
                        run
                    }
                    .instrument(span),
                );
                active += 1;
                continue;
            }

            tokio::select! {
                Some(delta) = activity_rx.recv() => apply(&mut active, delta),
                Some(delta) = capacity_rx.recv() => apply(&mut capacity, delta),
            }
        }

        while let Some(joined) = replicas.join_next().await {
            match joined {
                Ok(run) => report.reports.push(run),
                Err(e) => tracing::error!(error = %e, "Replica task failed"),
            }
        }

        tracing::info!(
            source = %source,
            spawned = report.assigned.len(),
            completed = report.completed(),
            gave_up = report.gave_up(),
            "Replica pool drained"
        );
        report
    }
}

fn apply(counter: &mut usize, delta: isize) {
    *counter = counter.saturating_add_signed(delta);
}

fn drain(rx: &mut UnboundedReceiver<isize>, counter: &mut usize) {
    while let Ok(delta) = rx.try_recv() {
        apply(counter, delta);
    }
}
