//! msgstore Core
//!
//! Application-facing layer over the storage crate: configuration, logging
//! and the process-wide store handle.

mod config;
mod error;
mod handle;

pub use config::Config;
pub use error::CoreError;
pub use handle::{db, initialize, is_initialized, open_store};

// Re-export storage types callers work with
pub use msgstore_storage::{
    IndexField, IndexQuery, Matcher, Message, MessageStore, NewMessage, StorageError,
    StoreConfig, StoreSchema,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
