//! Store schema declaration
//!
//! The schema is an explicit value: database name, version and the tables
//! with their primary key and secondary indexes. It is validated before any
//! SQL is generated from it, so table and column names used in statements
//! are always plain identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;
use crate::Result;

pub const DATABASE_NAME: &str = "myDatabase";
pub const MESSAGES_TABLE: &str = "messages";
pub const SCHEMA_VERSION: i32 = 1;

/// Secondary indexes a message table may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexField {
    Topic,
    Message,
    Timestamp,
}

impl IndexField {
    pub const ALL: [IndexField; 3] = [IndexField::Topic, IndexField::Message, IndexField::Timestamp];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexField::Topic => "topic",
            IndexField::Message => "message",
            IndexField::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexField {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topic" => Ok(IndexField::Topic),
            "message" => Ok(IndexField::Message),
            "timestamp" => Ok(IndexField::Timestamp),
            other => Err(StorageError::Schema(format!("unknown index field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub field: String,
    /// Engine assigns the next surrogate key when the caller omits one
    pub auto_increment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: PrimaryKey,
    pub indexes: Vec<IndexField>,
}

impl TableSchema {
    /// Parse a compact declaration such as `"++id, topic, message, timestamp"`.
    ///
    /// The first entry names the primary key (`++` marks it auto-incrementing),
    /// the remaining entries are secondary indexes.
    pub fn parse(name: &str, spec: &str) -> Result<Self> {
        let mut entries = spec.split(',').map(str::trim);

        let key = entries
            .next()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StorageError::Schema(format!("table {name} declares no primary key")))?;

        let primary_key = match key.strip_prefix("++") {
            Some(field) => PrimaryKey {
                field: field.to_string(),
                auto_increment: true,
            },
            None => PrimaryKey {
                field: key.to_string(),
                auto_increment: false,
            },
        };

        let indexes = entries
            .filter(|e| !e.is_empty())
            .map(IndexField::from_str)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            primary_key,
            indexes,
        })
    }

    pub fn has_index(&self, field: IndexField) -> bool {
        self.indexes.contains(&field)
    }

    pub fn index_name(&self, field: IndexField) -> String {
        format!("idx_{}_{}", self.name, field.as_str())
    }

    fn validate(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            return Err(StorageError::Schema(format!(
                "table name {:?} is not a plain identifier",
                self.name
            )));
        }

        if !is_identifier(&self.primary_key.field) {
            return Err(StorageError::Schema(format!(
                "primary key {:?} of table {} is not a plain identifier",
                self.primary_key.field, self.name
            )));
        }

        if self.name == MESSAGES_TABLE && self.primary_key.field != "id" {
            return Err(StorageError::Schema(format!(
                "table {} must be keyed by id, found {}",
                self.name, self.primary_key.field
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.indexes {
            if field.as_str() == self.primary_key.field {
                return Err(StorageError::Schema(format!(
                    "table {} indexes its primary key {}",
                    self.name, field
                )));
            }
            if !seen.insert(*field) {
                return Err(StorageError::Schema(format!(
                    "table {} declares index {} twice",
                    self.name, field
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub database_name: String,
    pub version: i32,
    pub tables: Vec<TableSchema>,
}

impl StoreSchema {
    /// The message store declaration: one `messages` table keyed by an
    /// auto-incrementing `id`, indexed on every other field.
    pub fn messages_v1() -> Self {
        Self {
            database_name: DATABASE_NAME.to_string(),
            version: SCHEMA_VERSION,
            tables: vec![TableSchema {
                name: MESSAGES_TABLE.to_string(),
                primary_key: PrimaryKey {
                    field: "id".to_string(),
                    auto_increment: true,
                },
                indexes: IndexField::ALL.to_vec(),
            }],
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_name.trim().is_empty() {
            return Err(StorageError::Schema("database name cannot be empty".into()));
        }

        if self.version < 1 {
            return Err(StorageError::Schema(format!(
                "schema version must be at least 1, found {}",
                self.version
            )));
        }

        if self.tables.is_empty() {
            return Err(StorageError::Schema("schema declares no tables".into()));
        }

        let mut names = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !names.insert(table.name.as_str()) {
                return Err(StorageError::Schema(format!(
                    "table {} declared twice",
                    table.name
                )));
            }
        }

        if self.table(MESSAGES_TABLE).is_none() {
            return Err(StorageError::Schema(format!(
                "schema must declare a {MESSAGES_TABLE} table"
            )));
        }

        Ok(())
    }
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self::messages_v1()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
