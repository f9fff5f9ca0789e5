//! Async message store
//!
//! `MessageStore` is the handle callers share. Every operation runs the
//! blocking SQLite call on tokio's blocking pool, so callers suspend until
//! the engine finishes and in-flight operations interleave freely. Only the
//! work inside a single call is transactional.

use futures_util::stream::{self, Stream, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;

use crate::database::Database;
use crate::error::StorageError;
use crate::message::{Message, NewMessage};
use crate::query::{fetch_page, IndexQuery, Matcher, ScanPosition};
use crate::schema::{IndexField, StoreSchema, TableSchema, MESSAGES_TABLE};
use crate::table;
use crate::Result;

pub const DEFAULT_PAGE_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file
    pub path: PathBuf,
    pub schema: StoreSchema,
    /// Rows fetched per round trip while streaming a query
    pub page_size: usize,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: StoreSchema::messages_v1(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db: Database,
    table: Arc<TableSchema>,
    page_size: usize,
}

impl MessageStore {
    /// Open or create the database described by `config`.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let page_size = config.page_size;
        let db = tokio::task::spawn_blocking(move || Database::open(&config.path, config.schema))
            .await??;
        Self::from_database(db, page_size)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let db = tokio::task::spawn_blocking(|| Database::open_in_memory(StoreSchema::messages_v1()))
            .await??;
        Self::from_database(db, DEFAULT_PAGE_SIZE)
    }

    pub fn from_database(db: Database, page_size: usize) -> Result<Self> {
        let table = db
            .schema()
            .table(MESSAGES_TABLE)
            .cloned()
            .ok_or_else(|| StorageError::Schema(format!("no {MESSAGES_TABLE} table declared")))?;

        Ok(Self {
            db,
            table: Arc::new(table),
            page_size: page_size.max(1),
        })
    }

    pub fn schema(&self) -> &StoreSchema {
        self.db.schema()
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database, &TableSchema) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || f(&db, table.as_ref())).await?
    }

    /// Insert a message, returning its id (assigned when the record has none).
    pub async fn insert(&self, record: impl Into<NewMessage>) -> Result<String> {
        let record = record.into();
        let result = self
            .run(move |db, messages| db.transaction(|conn| table::insert(conn, messages, record)))
            .await;

        match &result {
            Ok(id) => tracing::debug!(id = %id, "Inserted message"),
            Err(StorageError::ConstraintViolation { key, .. }) => {
                tracing::warn!(id = %key, "Rejected duplicate message key")
            }
            Err(e) => tracing::error!(error = %e, "Failed to insert message"),
        }

        result
    }

    /// Insert several messages as one unit; either all land or none do.
    pub async fn bulk_insert<I>(&self, records: I) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<NewMessage>,
    {
        let records: Vec<NewMessage> = records.into_iter().map(Into::into).collect();
        let count = records.len();

        let ids = self
            .run(move |db, messages| {
                db.transaction(|conn| {
                    records
                        .into_iter()
                        .map(|record| table::insert(conn, messages, record))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .await?;

        tracing::debug!(count, "Inserted message batch");
        Ok(ids)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        let id = id.to_string();
        self.run(move |db, messages| db.with_connection(|conn| table::get(conn, messages, &id)))
            .await
    }

    /// Delete by id. Deleting a missing id is a no-op; the flag reports
    /// whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let removed = self
            .run(move |db, messages| db.with_connection(|conn| table::delete(conn, messages, &id)))
            .await?;
        tracing::debug!(removed, "Deleted message");
        Ok(removed)
    }

    pub async fn count(&self) -> Result<u64> {
        self.run(|db, messages| db.with_connection(|conn| table::count(conn, messages)))
            .await
    }

    pub async fn clear(&self) -> Result<usize> {
        let removed = self
            .run(|db, messages| db.with_connection(|conn| table::clear(conn, messages)))
            .await?;
        tracing::info!(removed, "Cleared messages");
        Ok(removed)
    }

    pub fn query_by_index(
        &self,
        field: IndexField,
        matcher: Matcher,
    ) -> impl Stream<Item = Result<Message>> + Send + 'static {
        self.query(IndexQuery::new(field, matcher))
    }

    /// Lazily stream the rows matching `query` in index order.
    ///
    /// Nothing touches the database until the stream is polled; rows are then
    /// fetched a page at a time. Re-running the same query re-scans.
    pub fn query(&self, query: IndexQuery) -> impl Stream<Item = Result<Message>> + Send + 'static {
        let scan = Scan {
            store: self.clone(),
            remaining: query.limit,
            query: Arc::new(query),
            after: None,
            exhausted: false,
        };

        stream::try_unfold(scan, Scan::next_page)
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StorageError>)))
            .try_flatten()
    }

    /// Run `query` to completion.
    pub async fn query_all(&self, query: IndexQuery) -> Result<Vec<Message>> {
        self.query(query).try_collect().await
    }
}

struct Scan {
    store: MessageStore,
    query: Arc<IndexQuery>,
    after: Option<ScanPosition>,
    remaining: Option<usize>,
    exhausted: bool,
}

impl Scan {
    async fn next_page(mut self) -> Result<Option<(Vec<Message>, Self)>> {
        if self.exhausted || self.remaining == Some(0) {
            return Ok(None);
        }

        if !self.store.table.has_index(self.query.field) {
            return Err(StorageError::Schema(format!(
                "field {} is not indexed on {}",
                self.query.field, self.store.table.name
            )));
        }

        let page_size = match self.remaining {
            Some(remaining) => remaining.min(self.store.page_size),
            None => self.store.page_size,
        };

        let query = Arc::clone(&self.query);
        let after = self.after.clone();
        let page = self
            .store
            .run(move |db, messages| {
                db.with_connection(|conn| {
                    fetch_page(conn, messages, &query, after.as_ref(), page_size)
                })
            })
            .await?;

        tracing::trace!(
            field = %self.query.field,
            rows = page.len(),
            "Fetched query page"
        );

        if page.len() < page_size {
            self.exhausted = true;
        }
        let Some(last) = page.last() else {
            return Ok(None);
        };

        self.after = Some((self.query.key_of(last).to_string(), last.id.clone()));
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(page.len());
        }

        Ok(Some((page, self)))
    }
}
