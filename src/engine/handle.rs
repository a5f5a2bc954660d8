//! Handle given to entry points for one run attempt

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::policy::{self, StatusSignal};
use super::state::RuntimeState;
use super::task::TaskConfig;
use crate::collector::Collector;
use crate::models::Record;
use crate::storage::DocumentStore;

/// An entry point's view of its task: where to start, where to stop, how to
/// report progress and outcomes
///
/// Clones share the same attempt. Once every clone is dropped the attempt's
/// status channel closes.
#[derive(Clone)]
pub struct TaskHandle {
    config: TaskConfig,
    state: Arc<RuntimeState>,
    collector: Arc<Collector>,
    signals: Option<UnboundedSender<StatusSignal>>,
    start: i64,
    attempt: u32,
}

impl TaskHandle {
    pub(crate) fn new(
        config: TaskConfig,
        state: Arc<RuntimeState>,
        collector: Arc<Collector>,
        signals: Option<UnboundedSender<StatusSignal>>,
        start: i64,
        attempt: u32,
    ) -> Self {
        Self {
            config,
            state,
            collector,
            signals,
            start,
            attempt,
        }
    }

    pub fn source(&self) -> &str {
        self.config.source()
    }

    pub fn base(&self) -> &str {
        self.config.base()
    }

    /// Index this attempt starts from. Rewound on recovery attempts.
    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> Option<i64> {
        self.config.end()
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size()
    }

    /// 1 for the first attempt, 2 for the first recovery, ...
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn failures(&self) -> u32 {
        self.state.failures()
    }

    pub fn current_index(&self) -> i64 {
        self.state.current_index()
    }

    pub fn set_current_index(&self, index: i64) {
        self.state.set_current_index(index);
    }

    /// Advance the current index by one page, returning the new index
    pub fn advance_page(&self) -> i64 {
        self.state.advance(i64::from(self.config.page_size()))
    }

    /// Push an outcome code for one unit of work
    ///
    /// Without a status aggregator the signal is applied to the failure
    /// counter immediately.
    pub fn report(&self, signal: impl Into<StatusSignal>) {
        let signal = signal.into();
        match &self.signals {
            Some(tx) => {
                if tx.send(signal).is_err() {
                    tracing::trace!(code = signal.code(), "Status channel closed, signal dropped");
                }
            }
            None => policy::on_signal(&self.state, signal),
        }
    }

    pub fn report_success(&self) {
        self.report(StatusSignal::SUCCESS);
    }

    pub fn report_failure(&self) {
        self.report(StatusSignal::FAILURE);
    }

    /// Mark the task as finished. Idempotent.
    pub fn mark_done(&self) {
        self.state.mark_done();
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Entry points should poll this between pages and return once it is true
    pub fn should_stop(&self) -> bool {
        policy::should_stop(&self.state, &self.config)
    }

    /// Collector for this attempt
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Upsert `record` under `{source}-{base}-{document_id}` and report 200
    /// on success or 500 on failure. Returns whether the write succeeded.
    pub async fn persist(&self, store: &dyn DocumentStore, record: &Record) -> bool {
        let key = record.document_key(self.base());

        match store.upsert(&key, record).await {
            Ok(()) => {
                self.report(StatusSignal::SUCCESS);
                true
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %record.document_id,
                    document_type = %record.document_type,
                    error = %e,
                    "Failed to save document"
                );
                self.report(StatusSignal::FAILURE);
                false
            }
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("source", &self.config.source())
            .field("base", &self.config.base())
            .field("start", &self.start)
            .field("attempt", &self.attempt)
            .field("current_index", &self.state.current_index())
            .finish()
    }
}
