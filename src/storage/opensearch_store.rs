//! OpenSearch-backed [`DocumentStore`]

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    IndexParts, OpenSearch,
};
use serde_json::Value;
use url::Url;

use super::{record_mapping, DocumentStore, IndexStatus, StoreError};
use crate::config::StoreConfig;
use crate::models::Record;

/// OpenSearch client wrapper
pub struct OpenSearchStore {
    /// OpenSearch client
    client: OpenSearch,

    /// Index name
    index: String,
}

impl OpenSearchStore {
    /// Build a client for the configured endpoint. No request is sent.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let url =
            Url::parse(&config.endpoint()).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        Ok(Self {
            client: OpenSearch::new(transport),
            index: config.index.clone(),
        })
    }

    /// Connect and ping, retrying forever with the configured fixed delays
    ///
    /// Only returns once the cluster has answered a ping. Connection problems
    /// are never fatal to the process; they are logged and retried.
    pub async fn connect_with_retry(config: &StoreConfig) -> Self {
        let endpoint = config.endpoint();

        loop {
            let store = match Self::new(config) {
                Ok(store) => store,
                Err(e) => {
                    tracing::error!(endpoint = %endpoint, error = %e, "Failed to connect to OpenSearch");
                    tracing::warn!(
                        delay_secs = config.retry_connection_delay_secs,
                        "Retrying connection"
                    );
                    tokio::time::sleep(config.retry_connection_delay()).await;
                    continue;
                }
            };

            match store.ping().await {
                Ok(()) => {
                    tracing::info!(endpoint = %endpoint, index = %store.index, "Connected to OpenSearch");
                    return store;
                }
                Err(e) => {
                    tracing::error!(endpoint = %endpoint, error = %e, "Ping to OpenSearch failed");
                    tracing::warn!(delay_secs = config.retry_ping_delay_secs, "Retrying ping");
                    tokio::time::sleep(config.retry_ping_delay()).await;
                }
            }
        }
    }

    /// Index name
    pub fn index(&self) -> &str {
        &self.index
    }

    async fn create_index(&self) -> Result<IndexStatus, StoreError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(record_mapping())
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        if !body["acknowledged"].as_bool().unwrap_or(false) {
            tracing::warn!(index = %self.index, "Index was created, but not acknowledged");
            return Err(StoreError::NotAcknowledged(self.index.clone()));
        }

        tracing::info!(index = %self.index, "Index created and acknowledged");
        Ok(IndexStatus::Created)
    }
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let response = self.client.ping().send().await?;
        let status = response.status_code();

        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }

    async fn ensure_index(&self) -> Result<IndexStatus, StoreError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await?;

        match response.status_code().as_u16() {
            200 => {
                tracing::info!(index = %self.index, "Index found");
                Ok(IndexStatus::Existing)
            }
            404 => {
                tracing::warn!(index = %self.index, "Index not found, attempting to create");
                self.create_index().await
            }
            status => Err(StoreError::Status {
                status,
                body: String::new(),
            }),
        }
    }

    async fn upsert(&self, key: &str, record: &Record) -> Result<(), StoreError> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index, key))
            .body(record)
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
