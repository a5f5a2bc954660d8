//! Process-wide harvesting context
//!
//! Holds validated settings and the range allocator used by replica pools
//! started from this process. Each pool re-seeds the allocator when it
//! starts, so pools on one context run one after another. Build it once at
//! startup and pass the `Arc` around.

use std::sync::Arc;

use crate::config::{ConfigError, Settings};
use crate::engine::{RangeAllocator, TaskConfigBuilder, TaskConfig};

#[derive(Debug)]
pub struct HarvestContext {
    settings: Settings,
    allocator: RangeAllocator,
}

impl HarvestContext {
    /// Validate `settings` and seed the allocator from `control.cursor_seed`
    pub fn new(settings: Settings) -> Result<Arc<Self>, ConfigError> {
        settings.validate()?;

        let allocator = RangeAllocator::new(settings.control.cursor_seed);
        Ok(Arc::new(Self {
            settings,
            allocator,
        }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn allocator(&self) -> &RangeAllocator {
        &self.allocator
    }

    /// Task builder preloaded with the recovery delay and poll interval
    /// from the control settings
    pub fn task_builder(&self) -> TaskConfigBuilder {
        TaskConfig::builder().control(&self.settings.control)
    }
}
