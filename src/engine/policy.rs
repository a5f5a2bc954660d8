//! Failure and recovery decisions
//!
//! Pure functions over [`RuntimeState`] and [`TaskConfig`]. The status
//! aggregator evaluates [`should_stop`] continuously, so an attempt can be
//! asked to stop while the entry point is still mid-page.

use super::state::RuntimeState;
use super::task::TaskConfig;

/// Outcome code pushed by an entry point for each unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusSignal(pub u16);

impl StatusSignal {
    pub const SUCCESS: StatusSignal = StatusSignal(200);
    pub const FAILURE: StatusSignal = StatusSignal(500);

    /// Only 200 counts as success
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn code(self) -> u16 {
        self.0
    }
}

impl From<u16> for StatusSignal {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// True when the failure budget is spent, a bounded range has been passed,
/// or the entry point marked the task done
pub fn should_stop(state: &RuntimeState, config: &TaskConfig) -> bool {
    if state.failures() >= config.max_failures() {
        return true;
    }

    if let Some(end) = config.end() {
        if state.current_index() > end {
            return true;
        }
    }

    state.is_done()
}

/// Failures count up by one; successes decay the count by one, floor zero
pub fn on_signal(state: &RuntimeState, signal: StatusSignal) {
    if signal.is_success() {
        state.record_success();
    } else {
        state.record_failure();
    }
}

/// Index a recovery attempt resumes from: the last `failures` pages are
/// fetched again. Not clamped; the result can be negative.
pub fn recovery_start(current_index: i64, failures: u32, page_size: u32) -> i64 {
    current_index - i64::from(failures) * i64::from(page_size)
}

/// How a single run attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Entry point marked the task done
    Done,
    /// Bounded run moved past its end index
    RangeExhausted,
    /// Failure counter reached `max_failures`
    FailureBudgetExhausted,
    /// Entry point went away without finishing or failing out
    Abandoned,
    /// The attempt could not be started
    SetupFailed,
}

impl AttemptOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Done | Self::RangeExhausted)
    }
}

/// Classify a finished attempt from its final state
pub fn classify(state: &RuntimeState, config: &TaskConfig) -> AttemptOutcome {
    if state.is_done() {
        return AttemptOutcome::Done;
    }

    if state.failures() >= config.max_failures() {
        return AttemptOutcome::FailureBudgetExhausted;
    }

    match config.end() {
        Some(end) if state.current_index() > end => AttemptOutcome::RangeExhausted,
        _ => AttemptOutcome::Abandoned,
    }
}
