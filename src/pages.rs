//! Built-in entry point for paginated JSON sources
//!
//! Walks an endpoint that returns a JSON array of documents per page. The page
//! URL is a template carrying an `{index}` placeholder (the current index) and
//! optionally a `{size}` placeholder (the page size):
//!
//! ```text
//! https://api.example.org/decisions?offset={index}&limit={size}
//! ```
//!
//! Every document is persisted through [`TaskHandle::persist`]. An empty page
//! marks the task done. A page that fails with a recoverable error is fetched
//! again; one that can never succeed (bad status, malformed body) is skipped.
//! Both count against the failure budget.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::collector::FetchError;
use crate::config::ConfigError;
use crate::engine::{StatusSignal, TaskHandle};
use crate::models::Record;
use crate::storage::DocumentStore;

const INDEX_PLACEHOLDER: &str = "{index}";
const SIZE_PLACEHOLDER: &str = "{size}";

/// One document as served by a JSON page
#[derive(Debug, Clone, Deserialize)]
pub struct PageItem {
    pub id: String,
    #[serde(default)]
    pub document_type: Option<String>,
    pub content: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub judged_at: Option<DateTime<Utc>>,
}

impl PageItem {
    pub fn into_record(self, source: &str, default_type: &str) -> Record {
        let document_type = self.document_type.unwrap_or_else(|| default_type.to_string());
        let mut record = Record::new(source, document_type, self.id, self.content);
        if let Some(link) = self.link {
            record = record.with_link(link);
        }
        if let Some(judged_at) = self.judged_at {
            record = record.with_judged_at(judged_at);
        }
        record
    }
}

pub struct JsonPageSource {
    url_template: String,
    document_type: String,
    store: Arc<dyn DocumentStore>,
}

impl JsonPageSource {
    pub fn new(
        url_template: impl Into<String>,
        document_type: impl Into<String>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, ConfigError> {
        let url_template = url_template.into();
        if !url_template.contains(INDEX_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue(
                "url_template".to_string(),
                format!("must contain the {INDEX_PLACEHOLDER} placeholder"),
            ));
        }

        Ok(Self {
            url_template,
            document_type: document_type.into(),
            store,
        })
    }

    pub fn page_url(&self, index: i64, page_size: u32) -> String {
        self.url_template
            .replace(INDEX_PLACEHOLDER, &index.to_string())
            .replace(SIZE_PLACEHOLDER, &page_size.to_string())
    }

    /// Entry point body: collect pages until the handle says stop or a page
    /// comes back empty
    pub async fn run(&self, handle: TaskHandle) {
        while !handle.should_stop() {
            let index = handle.current_index();
            let url = self.page_url(index, handle.page_size());

            match handle.collector().fetch_json::<Vec<PageItem>>(&url).await {
                Ok(items) if items.is_empty() => {
                    tracing::info!(index, "Empty page, source exhausted");
                    handle.mark_done();
                    return;
                }
                Ok(items) => {
                    tracing::debug!(index, documents = items.len(), "Collected page");
                    for item in items {
                        let record = item.into_record(handle.source(), &self.document_type);
                        handle.persist(self.store.as_ref(), &record).await;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(index, url = %url, error = %e, "Failed to collect page, retrying");
                    handle.report(signal_for(&e));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(index, url = %url, error = %e, "Skipping page");
                    handle.report(signal_for(&e));
                }
            }

            handle.advance_page();
        }
    }
}

fn signal_for(error: &FetchError) -> StatusSignal {
    match error {
        FetchError::Status(code) => StatusSignal(*code),
        _ => StatusSignal::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn source(template: &str) -> Result<JsonPageSource, ConfigError> {
        JsonPageSource::new(template, "ruling", Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_page_url_substitution() {
        let pages = source("http://host/api?offset={index}&limit={size}").unwrap();
        assert_eq!(pages.page_url(40, 20), "http://host/api?offset=40&limit=20");
    }

    #[test]
    fn test_template_requires_index() {
        assert!(source("http://host/api?page=1").is_err());
    }

    #[test]
    fn test_item_into_record() {
        let item: PageItem = serde_json::from_str(
            r#"{"id": "7", "content": "ementa", "link": "http://host/7.pdf"}"#,
        )
        .unwrap();
        let record = item.into_record("tjrs", "ruling");
        assert_eq!(record.document_type, "ruling");
        assert_eq!(record.full_document_link, "http://host/7.pdf");
        assert!(record.judged_at.is_none());
    }

    #[test]
    fn test_status_errors_keep_their_code() {
        assert_eq!(signal_for(&FetchError::Status(503)), StatusSignal(503));
        assert_eq!(signal_for(&FetchError::Timeout), StatusSignal::FAILURE);
    }
}
