//! jurisharvest - Orchestrator for long-running court document harvests
//!
//! Coordinates harvesting tasks that walk a paginated source and persist what
//! they find to a document store, with a failure budget, automatic recovery
//! and an optional replica pool that splits the index space.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Settings loaded from environment or TOML
//! - [`context`] - Process-wide settings and shared range cursor
//! - [`engine`] - Task configuration, runners, aggregator and replica pool
//! - [`collector`] - Rate-limited HTTP client handed to entry points
//! - [`storage`] - Document store trait with OpenSearch and in-memory backends
//! - [`models`] - Persisted record type
//! - [`pages`] - Built-in entry point for paginated JSON sources
//! - [`metrics`] - Prometheus counters for attempts, recoveries and replicas
//!
//! # Example
//!
//! ```no_run
//! use jurisharvest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = HarvestContext::new(Settings::from_env()?)?;
//!     let config = ctx
//!         .task_builder()
//!         .source("stj")
//!         .entry_point(|handle: TaskHandle| async move { handle.mark_done() })
//!         .build()?;
//!
//!     let report = jurisharvest::engine::run(ctx, config).await;
//!     assert_eq!(report.completed(), 1);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pages;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collector::Collector;
    pub use crate::config::Settings;
    pub use crate::context::HarvestContext;
    pub use crate::engine::{
        PoolReport, RunOutcome, RunReport, StatusSignal, TaskConfig, TaskHandle,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::Record;
    pub use crate::storage::{DocumentStore, InMemoryStore, OpenSearchStore};
}

// Direct re-exports for convenience
pub use context::HarvestContext;
pub use models::Record;
