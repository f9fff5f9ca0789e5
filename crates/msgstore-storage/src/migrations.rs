//! Database migrations
//!
//! Exactly one schema version exists. Tables and indexes are generated from
//! the validated [`StoreSchema`], so the declaration is the single source of
//! truth for what lives on disk.

use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;
use crate::schema::{StoreSchema, TableSchema};
use crate::Result;

pub fn run_migrations(conn: &Connection, schema: &StoreSchema) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > schema.version {
        return Err(StorageError::VersionMismatch {
            found: current_version,
            expected: schema.version,
        });
    }

    if current_version < 1 {
        migrate_v1(conn, schema)?;
    }

    set_schema_version(conn, schema.version)?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !tracked {
        conn.execute(
            "CREATE TABLE schema_version (version INTEGER NOT NULL)",
            [],
        )?;
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn migrate_v1(conn: &Connection, schema: &StoreSchema) -> Result<()> {
    tracing::info!(
        database = %schema.database_name,
        tables = schema.tables.len(),
        "Running migration v1: Initial schema"
    );

    // Surrogate key counters, advanced in the same transaction as each insert
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS key_sequence (
            table_name TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL
        );
    "#,
    )?;

    for table in &schema.tables {
        create_table(conn, table)?;
    }

    Ok(())
}

fn create_table(conn: &Connection, table: &TableSchema) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            {key} TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
    "#,
        name = table.name,
        key = table.primary_key.field,
    ))?;

    for field in &table.indexes {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {name}({field}, {key});",
            index = table.index_name(*field),
            name = table.name,
            field = field.as_str(),
            key = table.primary_key.field,
        ))?;
    }

    if table.primary_key.auto_increment {
        conn.execute(
            "INSERT OR IGNORE INTO key_sequence (table_name, next_id) VALUES (?1, 1)",
            [&table.name],
        )?;
    }

    tracing::debug!(table = %table.name, indexes = table.indexes.len(), "Created table");

    Ok(())
}
