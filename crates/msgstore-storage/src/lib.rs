//! msgstore Storage Layer
//!
//! SQLite-backed persistence for messages: one `messages` table keyed by an
//! auto-incrementing id, with secondary indexes on topic, message and
//! timestamp. Inserts and their key allocation are transactional.

mod database;
mod error;
mod message;
mod migrations;
mod query;
mod schema;
mod store;
mod table;

pub use database::Database;
pub use error::StorageError;
pub use message::{Message, NewMessage};
pub use query::{IndexQuery, Matcher};
pub use schema::{
    IndexField, PrimaryKey, StoreSchema, TableSchema, DATABASE_NAME, MESSAGES_TABLE,
    SCHEMA_VERSION,
};
pub use store::{MessageStore, StoreConfig, DEFAULT_PAGE_SIZE};

pub type Result<T> = std::result::Result<T, StorageError>;
