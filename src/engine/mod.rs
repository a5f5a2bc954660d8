//! Harvest orchestration engine
//!
//! A task is described once by a [`TaskConfig`] and executed by a
//! [`ReplicaCoordinator`]:
//!
//! - sequential tasks run a single [`TaskRunner`]
//! - concurrent tasks run a pool of runners, each on its own slice of the
//!   index space handed out by the context's [`RangeAllocator`]
//!
//! Every runner loops over run attempts. An attempt invokes the entry point
//! with a [`TaskHandle`]; the [`StatusAggregator`] folds the entry point's
//! status signals into a failure counter and releases the attempt when the
//! failure budget is spent, the range is consumed or the task is marked done.
//! Failed attempts are retried from a rewound index until the recovery budget
//! runs out.
//!
//! # Example
//!
//! ```no_run
//! use jurisharvest::config::Settings;
//! use jurisharvest::context::HarvestContext;
//! use jurisharvest::engine::{self, TaskHandle};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let ctx = HarvestContext::new(Settings::from_env()?)?;
//! let config = ctx
//!     .task_builder()
//!     .source("tjsp")
//!     .base("civil")
//!     .start(0)
//!     .end(999)
//!     .page_size(10)
//!     .concurrency(4, 100)
//!     .entry_point(|handle: TaskHandle| async move {
//!         while !handle.should_stop() {
//!             // fetch a page, persist its records...
//!             handle.report_success();
//!             handle.advance_page();
//!         }
//!     })
//!     .build()?;
//!
//! let report = engine::run(ctx, config).await;
//! println!("{} replicas completed", report.completed());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod allocator;
pub mod coordinator;
pub mod handle;
pub mod policy;
pub mod runner;
pub mod state;
pub mod task;

use std::sync::Arc;

use crate::context::HarvestContext;

pub use aggregator::{AggregatorSummary, Release, StatusAggregator};
pub use allocator::{IndexRange, RangeAllocator};
pub use coordinator::{PoolReport, ReplicaCoordinator};
pub use handle::TaskHandle;
pub use policy::{AttemptOutcome, StatusSignal};
pub use runner::{RunOutcome, RunReport, TaskRunner};
pub use state::RuntimeState;
pub use task::{Concurrency, EntryPoint, SetupAction, TaskConfig, TaskConfigBuilder};

/// Run `config` to completion within `ctx`
pub async fn run(ctx: Arc<HarvestContext>, config: TaskConfig) -> PoolReport {
    ReplicaCoordinator::new(ctx, config).run().await
}
