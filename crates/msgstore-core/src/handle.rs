//! Process-wide message store handle
//!
//! The store is opened at most once per process and lives until exit.
//! [`initialize`] opens it with an explicit config; [`db`] hands out the
//! shared handle and opens it with [`Config::default`] if nobody has yet.
//! Code that wants its own store calls [`open_store`] and passes the handle
//! around instead.

use tokio::sync::OnceCell;

use msgstore_storage::MessageStore;

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

static STORE: OnceCell<MessageStore> = OnceCell::const_new();

pub async fn open_store(config: &Config) -> Result<MessageStore> {
    let store = MessageStore::open(config.store_config()?).await?;

    tracing::info!(
        path = %config.database_path().display(),
        page_size = config.query_page_size,
        "Message store ready"
    );

    Ok(store)
}

/// Open the process-wide store with `config`. Fails with
/// [`CoreError::AlreadyInitialized`] once a store exists.
pub async fn initialize(config: Config) -> Result<&'static MessageStore> {
    if STORE.initialized() {
        return Err(CoreError::AlreadyInitialized);
    }

    let store = open_store(&config).await?;
    STORE
        .set(store)
        .map_err(|_| CoreError::AlreadyInitialized)?;

    STORE.get().ok_or(CoreError::AlreadyInitialized)
}

/// The shared store, opened with the default config on first access.
pub async fn db() -> Result<&'static MessageStore> {
    STORE
        .get_or_try_init(|| async { open_store(&Config::default()).await })
        .await
}

pub fn is_initialized() -> bool {
    STORE.initialized()
}
