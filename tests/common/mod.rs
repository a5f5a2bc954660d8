//! Common test utilities

use std::sync::Arc;
use std::time::Duration;

use jurisharvest::config::{Settings, StoreConfig};
use jurisharvest::context::HarvestContext;
use jurisharvest::engine::TaskConfigBuilder;

/// Context with fast control loops and a generous rate limit
pub fn test_context() -> Arc<HarvestContext> {
    let mut settings = Settings::default();
    settings.control.recovery_delay_ms = 0;
    settings.control.poll_interval_ms = 5;
    settings.collector.requests_per_second = 100;
    settings.collector.request_timeout_secs = 5;
    HarvestContext::new(settings).unwrap()
}

/// Task builder from [`test_context`] settings with a source already set
pub fn builder(ctx: &HarvestContext, source: &str) -> TaskConfigBuilder {
    ctx.task_builder()
        .source(source)
        .recovery_delay(Duration::ZERO)
}

/// Store settings pointing at a mock server URI such as `http://127.0.0.1:1234`
#[allow(dead_code)]
pub fn store_config_for(uri: &str, index: &str) -> StoreConfig {
    let parsed = url::Url::parse(uri).unwrap();
    StoreConfig {
        url: format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap()),
        port: parsed.port().unwrap(),
        index: index.to_string(),
        retry_connection_delay_secs: 0,
        retry_ping_delay_secs: 0,
        ..StoreConfig::default()
    }
}
