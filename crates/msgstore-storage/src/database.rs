//! Database connection and transactions

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::migrations::run_migrations;
use crate::schema::StoreSchema;
use crate::Result;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    schema: Arc<StoreSchema>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P, schema: StoreSchema) -> Result<Self> {
        schema.validate()?;

        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn, &schema)?;

        tracing::info!(
            path = %path.display(),
            database = %schema.database_name,
            version = schema.version,
            "Opened database"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema: Arc::new(schema),
        })
    }

    pub fn open_in_memory(schema: StoreSchema) -> Result<Self> {
        schema.validate()?;

        let conn = Connection::open_in_memory()?;
        run_migrations(&conn, &schema)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema: Arc::new(schema),
        })
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside one transaction; any error rolls the whole unit back.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            schema: Arc::clone(&self.schema),
        }
    }
}
