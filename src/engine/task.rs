//! Task configuration and its validated builder

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::handle::TaskHandle;
use crate::config::{ConfigError, ControlConfig};

pub const DEFAULT_PAGE_SIZE: u32 = 1;
pub const DEFAULT_MAX_FAILURES: u32 = 25;
pub const DEFAULT_MAX_RECOVERIES: u32 = 5;
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Caller-supplied work for one run attempt
pub type EntryPoint = Arc<dyn Fn(TaskHandle) -> BoxFuture<'static, ()> + Send + Sync>;

/// One-time action executed before the first run attempt
pub type SetupAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Replica pool parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency {
    /// Maximum number of replicas running at once
    pub replicas: usize,

    /// Width of the index range handed to each replica
    pub range_width: i64,
}

/// Immutable description of a harvesting task
///
/// Cloning is cheap (the callbacks are reference counted) and every replica
/// runs on its own clone.
#[derive(Clone)]
pub struct TaskConfig {
    source: String,
    base: String,
    start: i64,
    end: Option<i64>,
    page_size: u32,
    max_failures: u32,
    max_recoveries: u32,
    concurrency: Option<Concurrency>,
    use_status_aggregator: bool,
    recovery_delay: Duration,
    poll_interval: Duration,
    setup: Option<SetupAction>,
    entry_point: EntryPoint,
}

impl std::fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskConfig")
            .field("source", &self.source)
            .field("base", &self.base)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("page_size", &self.page_size)
            .field("max_failures", &self.max_failures)
            .field("max_recoveries", &self.max_recoveries)
            .field("concurrency", &self.concurrency)
            .field("use_status_aggregator", &self.use_status_aggregator)
            .field("recovery_delay", &self.recovery_delay)
            .field("has_setup", &self.setup.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskConfig {
    pub fn builder() -> TaskConfigBuilder {
        TaskConfigBuilder::default()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> Option<i64> {
        self.end
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn max_recoveries(&self) -> u32 {
        self.max_recoveries
    }

    pub fn concurrency(&self) -> Option<Concurrency> {
        self.concurrency
    }

    pub fn use_status_aggregator(&self) -> bool {
        self.use_status_aggregator
    }

    pub fn recovery_delay(&self) -> Duration {
        self.recovery_delay
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn setup(&self) -> Option<&SetupAction> {
        self.setup.as_ref()
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    /// Private copy for one replica, narrowed to `[start, end]`
    pub(crate) fn for_range(&self, start: i64, end: i64) -> Self {
        let mut replica = self.clone();
        replica.start = start;
        replica.end = Some(end);
        replica
    }
}

// ============================================================================
// Task Config Builder
// ============================================================================

/// Builder for [`TaskConfig`]
///
/// Defaults: page size 1, 25 failures, 5 recoveries, status aggregator on,
/// 10 s recovery delay, start index 0, no end index, sequential.
/// Calling a setter twice keeps the last value.
pub struct TaskConfigBuilder {
    source: Option<String>,
    base: String,
    start: i64,
    end: Option<i64>,
    page_size: u32,
    max_failures: u32,
    max_recoveries: u32,
    concurrency: Option<Concurrency>,
    use_status_aggregator: bool,
    recovery_delay: Duration,
    poll_interval: Duration,
    setup: Option<SetupAction>,
    entry_point: Option<EntryPoint>,
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self {
            source: None,
            base: String::new(),
            start: 0,
            end: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_failures: DEFAULT_MAX_FAILURES,
            max_recoveries: DEFAULT_MAX_RECOVERIES,
            concurrency: None,
            use_status_aggregator: true,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            setup: None,
            entry_point: None,
        }
    }
}

impl TaskConfigBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn max_recoveries(mut self, max_recoveries: u32) -> Self {
        self.max_recoveries = max_recoveries;
        self
    }

    /// Run on a pool of `replicas`, each covering `range_width` indexes
    pub fn concurrency(mut self, replicas: usize, range_width: i64) -> Self {
        self.concurrency = Some(Concurrency {
            replicas,
            range_width,
        });
        self
    }

    /// Turn the built-in status aggregator on or off. When off, the entry
    /// point alone decides when an attempt ends: the attempt is over when its
    /// future completes.
    pub fn status_aggregator(mut self, enabled: bool) -> Self {
        self.use_status_aggregator = enabled;
        self
    }

    pub fn recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Take recovery delay and poll interval from the process settings
    pub fn control(self, control: &ControlConfig) -> Self {
        self.recovery_delay(control.recovery_delay())
            .poll_interval(control.poll_interval())
    }

    pub fn setup<F, Fut>(mut self, setup: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.setup = Some(Arc::new(move || Box::pin(setup())));
        self
    }

    pub fn entry_point<F, Fut>(mut self, entry: F) -> Self
    where
        F: Fn(TaskHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.entry_point = Some(Arc::new(move |handle| Box::pin(entry(handle))));
        self
    }

    pub fn build(self) -> Result<TaskConfig, ConfigError> {
        let entry_point = self
            .entry_point
            .ok_or_else(|| ConfigError::MissingField("entry_point".to_string()))?;

        let source = self
            .source
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingField("source".to_string()))?;

        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "page_size".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        if self.max_failures == 0 {
            return Err(ConfigError::InvalidValue(
                "max_failures".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        if let Some(end) = self.end {
            if end < self.start {
                return Err(ConfigError::InvalidCombination(format!(
                    "end index {end} is before start index {}",
                    self.start
                )));
            }
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency.replicas == 0 {
                return Err(ConfigError::InvalidValue(
                    "concurrency.replicas".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
            if concurrency.range_width <= 0 {
                return Err(ConfigError::InvalidValue(
                    "concurrency.range_width".to_string(),
                    "must be greater than 0".to_string(),
                ));
            }
            if self.end.is_none() {
                return Err(ConfigError::InvalidCombination(
                    "concurrent runs require an end index".to_string(),
                ));
            }
        }

        Ok(TaskConfig {
            source,
            base: self.base,
            start: self.start,
            end: self.end,
            page_size: self.page_size,
            max_failures: self.max_failures,
            max_recoveries: self.max_recoveries,
            concurrency: self.concurrency,
            use_status_aggregator: self.use_status_aggregator,
            recovery_delay: self.recovery_delay,
            poll_interval: self.poll_interval,
            setup: self.setup,
            entry_point,
        })
    }
}
