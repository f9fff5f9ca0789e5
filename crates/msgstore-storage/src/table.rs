//! Row-level operations on a message table
//!
//! These run on a borrowed connection so callers decide the transaction
//! boundary. `insert` must run inside one: it reads and advances the key
//! counter before writing the row.

use rusqlite::{Connection, ErrorCode, OptionalExtension};

use crate::error::StorageError;
use crate::message::{Message, NewMessage};
use crate::query::message_from_row;
use crate::schema::TableSchema;
use crate::Result;

pub fn insert(conn: &Connection, table: &TableSchema, record: NewMessage) -> Result<String> {
    let id = match record.id.clone() {
        Some(id) => {
            if exists(conn, table, &id)? {
                return Err(StorageError::ConstraintViolation {
                    table: table.name.clone(),
                    key: id,
                });
            }
            if table.primary_key.auto_increment {
                advance_past(conn, table, &id)?;
            }
            id
        }
        None if table.primary_key.auto_increment => next_key(conn, table)?,
        None => {
            return Err(StorageError::Schema(format!(
                "table {} has no auto-incrementing key, an id is required",
                table.name
            )))
        }
    };

    let message = record.into_message(id);
    conn.execute(
        &format!(
            "INSERT INTO {name} ({key}, topic, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            name = table.name,
            key = table.primary_key.field,
        ),
        rusqlite::params![
            message.id,
            message.topic,
            message.message,
            message.timestamp
        ],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageError::ConstraintViolation {
            table: table.name.clone(),
            key: message.id.clone(),
        },
        _ => e.into(),
    })?;

    Ok(message.id)
}

pub fn get(conn: &Connection, table: &TableSchema, id: &str) -> Result<Option<Message>> {
    let message = conn
        .prepare_cached(&format!(
            "SELECT {key}, topic, message, timestamp FROM {name} WHERE {key} = ?1",
            name = table.name,
            key = table.primary_key.field,
        ))?
        .query_row([id], message_from_row)
        .optional()?;
    Ok(message)
}

/// Returns whether a row was removed; a missing id is not an error.
pub fn delete(conn: &Connection, table: &TableSchema, id: &str) -> Result<bool> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {name} WHERE {key} = ?1",
            name = table.name,
            key = table.primary_key.field,
        ),
        [id],
    )?;
    Ok(removed > 0)
}

pub fn count(conn: &Connection, table: &TableSchema) -> Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.name),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Remove every row. The key counter is left alone so ids are never reused.
pub fn clear(conn: &Connection, table: &TableSchema) -> Result<usize> {
    Ok(conn.execute(&format!("DELETE FROM {}", table.name), [])?)
}

fn exists(conn: &Connection, table: &TableSchema, id: &str) -> Result<bool> {
    let found: Option<i32> = conn
        .prepare_cached(&format!(
            "SELECT 1 FROM {name} WHERE {key} = ?1",
            name = table.name,
            key = table.primary_key.field,
        ))?
        .query_row([id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn current_counter(conn: &Connection, table: &TableSchema) -> Result<i64> {
    let next: Option<i64> = conn
        .query_row(
            "SELECT next_id FROM key_sequence WHERE table_name = ?1",
            [&table.name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(next.unwrap_or(1))
}

fn set_counter(conn: &Connection, table: &TableSchema, next: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO key_sequence (table_name, next_id) VALUES (?1, ?2)
         ON CONFLICT(table_name) DO UPDATE SET next_id = excluded.next_id",
        rusqlite::params![table.name, next],
    )?;
    Ok(())
}

/// Take the next surrogate key, skipping any value a caller already used.
fn next_key(conn: &Connection, table: &TableSchema) -> Result<String> {
    let exhausted = || StorageError::KeySpaceExhausted {
        table: table.name.clone(),
    };

    let mut next = current_counter(conn, table)?;
    while exists(conn, table, &next.to_string())? {
        next = next.checked_add(1).ok_or_else(exhausted)?;
    }
    set_counter(conn, table, next.checked_add(1).ok_or_else(exhausted)?)?;
    Ok(next.to_string())
}

/// Explicit numeric ids push the counter past them. Ids too close to
/// `i64::MAX` leave it alone; the skip in `next_key` still avoids them.
fn advance_past(conn: &Connection, table: &TableSchema, id: &str) -> Result<()> {
    let Ok(n) = id.parse::<i64>() else {
        return Ok(());
    };
    let Some(after) = n.checked_add(1).filter(|after| *after < i64::MAX) else {
        return Ok(());
    };
    if after > current_counter(conn, table)? {
        set_counter(conn, table, after)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::schema::StoreSchema;
    use std::collections::HashSet;

    fn setup() -> (Database, TableSchema) {
        let db = Database::open_in_memory(StoreSchema::messages_v1()).unwrap();
        let table = db.schema().tables[0].clone();
        (db, table)
    }

    fn hello() -> Message {
        Message::new("1", "chat", "hello", "2024-01-01T00:00:00Z")
    }

    #[test]
    fn test_insert_then_get_round_trip() {
        let (db, table) = setup();
        let id = db
            .transaction(|conn| insert(conn, &table, hello().into()))
            .unwrap();
        assert_eq!(id, "1");

        let stored = db.with_connection(|conn| get(conn, &table, &id)).unwrap();
        assert_eq!(stored, Some(hello()));
    }

    #[test]
    fn test_auto_assigned_keys_are_distinct() {
        let (db, table) = setup();
        let mut seen = HashSet::new();
        for i in 0..20 {
            let id = db
                .transaction(|conn| {
                    insert(
                        conn,
                        &table,
                        NewMessage::new("chat", format!("m{i}"), "2024-01-01T00:00:00Z"),
                    )
                })
                .unwrap();
            assert!(seen.insert(id));
        }
        assert_eq!(seen.len(), 20);
        assert!(seen.contains("1") && seen.contains("20"));
    }

    #[test]
    fn test_explicit_numeric_id_advances_counter() {
        let (db, table) = setup();
        db.transaction(|conn| insert(conn, &table, hello().into()))
            .unwrap();

        let next = db
            .transaction(|conn| {
                insert(
                    conn,
                    &table,
                    NewMessage::new("chat", "next", "2024-01-01T00:00:01Z"),
                )
            })
            .unwrap();
        assert_eq!(next, "2");

        db.transaction(|conn| {
            insert(
                conn,
                &table,
                NewMessage::new("chat", "jump", "2024-01-01T00:00:02Z").with_id("10"),
            )
        })
        .unwrap();
        let after_jump = db
            .transaction(|conn| {
                insert(
                    conn,
                    &table,
                    NewMessage::new("chat", "after", "2024-01-01T00:00:03Z"),
                )
            })
            .unwrap();
        assert_eq!(after_jump, "11");
    }

    #[test]
    fn test_duplicate_key_is_rejected_and_original_kept() {
        let (db, table) = setup();
        db.transaction(|conn| insert(conn, &table, hello().into()))
            .unwrap();

        let dup = NewMessage::new("other", "changed", "2025-01-01T00:00:00Z").with_id("1");
        let err = db
            .transaction(|conn| insert(conn, &table, dup))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::ConstraintViolation { ref key, .. } if key == "1"
        ));

        let stored = db.with_connection(|conn| get(conn, &table, "1")).unwrap();
        assert_eq!(stored, Some(hello()));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (db, table) = setup();
        db.transaction(|conn| insert(conn, &table, hello().into()))
            .unwrap();

        assert!(db.with_connection(|conn| delete(conn, &table, "1")).unwrap());
        assert!(!db.with_connection(|conn| delete(conn, &table, "1")).unwrap());
        assert!(!db.with_connection(|conn| delete(conn, &table, "nope")).unwrap());
        assert_eq!(db.with_connection(|conn| get(conn, &table, "1")).unwrap(), None);
    }

    #[test]
    fn test_clear_keeps_counter() {
        let (db, table) = setup();
        for _ in 0..3 {
            db.transaction(|conn| {
                insert(
                    conn,
                    &table,
                    NewMessage::new("chat", "x", "2024-01-01T00:00:00Z"),
                )
            })
            .unwrap();
        }
        assert_eq!(db.with_connection(|conn| count(conn, &table)).unwrap(), 3);
        assert_eq!(db.with_connection(|conn| clear(conn, &table)).unwrap(), 3);
        assert_eq!(db.with_connection(|conn| count(conn, &table)).unwrap(), 0);

        let id = db
            .transaction(|conn| {
                insert(
                    conn,
                    &table,
                    NewMessage::new("chat", "y", "2024-01-01T00:00:00Z"),
                )
            })
            .unwrap();
        assert_eq!(id, "4");
    }

    fn auto_insert(db: &Database, table: &TableSchema) -> Result<String> {
        db.transaction(|conn| {
            insert(
                conn,
                table,
                NewMessage::new("chat", "auto", "2024-01-01T00:00:00Z"),
            )
        })
    }

    #[test]
    fn test_explicit_id_near_max_keeps_auto_keys_working() {
        let (db, table) = setup();
        db.transaction(|conn| {
            insert(
                conn,
                &table,
                NewMessage::new("chat", "far", "2024-01-01T00:00:00Z")
                    .with_id("9223372036854775806"),
            )
        })
        .unwrap();

        assert_eq!(auto_insert(&db, &table).unwrap(), "1");
        assert_eq!(auto_insert(&db, &table).unwrap(), "2");

        db.transaction(|conn| {
            insert(
                conn,
                &table,
                NewMessage::new("chat", "max", "2024-01-01T00:00:00Z")
                    .with_id(i64::MAX.to_string()),
            )
        })
        .unwrap();
        assert_eq!(auto_insert(&db, &table).unwrap(), "3");
    }

    #[test]
    fn test_counter_at_upper_bound_reports_exhaustion() {
        let (db, table) = setup();
        db.with_connection(|conn| set_counter(conn, &table, i64::MAX - 1))
            .unwrap();

        assert_eq!(
            auto_insert(&db, &table).unwrap(),
            (i64::MAX - 1).to_string()
        );

        let err = auto_insert(&db, &table).unwrap_err();
        assert!(matches!(err, StorageError::KeySpaceExhausted { .. }));
        assert_eq!(db.with_connection(|conn| count(conn, &table)).unwrap(), 1);
    }

    #[test]
    fn test_skip_over_taken_key_at_upper_bound() {
        let (db, table) = setup();
        db.with_connection(|conn| set_counter(conn, &table, i64::MAX))
            .unwrap();
        db.transaction(|conn| {
            insert(
                conn,
                &table,
                NewMessage::new("chat", "max", "2024-01-01T00:00:00Z")
                    .with_id(i64::MAX.to_string()),
            )
        })
        .unwrap();

        let err = auto_insert(&db, &table).unwrap_err();
        assert!(matches!(err, StorageError::KeySpaceExhausted { .. }));
    }

    #[test]
    fn test_non_decimal_ids_leave_counter_alone() {
        let (db, table) = setup();
        for id in ["abc", "-3", "1e9", " 42", ""] {
            db.transaction(|conn| {
                insert(
                    conn,
                    &table,
                    NewMessage::new("chat", "odd", "2024-01-01T00:00:00Z").with_id(id),
                )
            })
            .unwrap();
        }
        assert_eq!(auto_insert(&db, &table).unwrap(), "1");

        // A leading plus still parses as a number
        db.transaction(|conn| {
            insert(
                conn,
                &table,
                NewMessage::new("chat", "plus", "2024-01-01T00:00:00Z").with_id("+5"),
            )
        })
        .unwrap();
        assert_eq!(auto_insert(&db, &table).unwrap(), "6");
    }
}
