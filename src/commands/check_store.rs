use std::time::Duration;

use jurisharvest::config::Settings;
use jurisharvest::error::{Error, Result};
use jurisharvest::storage::{DocumentStore, IndexStatus, OpenSearchStore};

/// Connect to the configured store and make sure the index exists
///
/// With `wait` set, gives up connecting after that long instead of retrying
/// forever.
pub async fn check_store(settings: &Settings, wait: Option<Duration>) -> Result<IndexStatus> {
    println!("Checking document store: {}", settings.store.endpoint());

    let connect = OpenSearchStore::connect_with_retry(&settings.store);
    let store = match wait {
        Some(wait) => tokio::time::timeout(wait, connect).await.map_err(|_| {
            Error::other(format!(
                "store at {} did not answer within {}s",
                settings.store.endpoint(),
                wait.as_secs()
            ))
        })?,
        None => connect.await,
    };

    let status = store.ensure_index().await?;
    match status {
        IndexStatus::Existing => println!("  Index '{}' exists", store.index()),
        IndexStatus::Created => println!("  Index '{}' created", store.index()),
    }
    Ok(status)
}
