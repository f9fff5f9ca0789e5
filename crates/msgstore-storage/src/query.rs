//! Index queries
//!
//! A query names one secondary index and a matcher over its key. Results
//! come back in index key order with the primary key breaking ties, one page
//! at a time: each page resumes strictly after the last `(key, id)` pair seen,
//! so a scan never skips or repeats rows that were present when it started.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::ops::Bound;

use crate::message::Message;
use crate::schema::{IndexField, TableSchema};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Every row, in index order
    All,
    Equals(String),
    AnyOf(Vec<String>),
    Range {
        lower: Bound<String>,
        upper: Bound<String>,
    },
    StartsWith(String),
}

impl Matcher {
    pub fn equals(value: impl Into<String>) -> Self {
        Matcher::Equals(value.into())
    }

    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::AnyOf(values.into_iter().map(Into::into).collect())
    }

    /// Lower bound inclusive, upper bound exclusive
    pub fn between(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Matcher::Range {
            lower: Bound::Included(lower.into()),
            upper: Bound::Excluded(upper.into()),
        }
    }

    pub fn above(value: impl Into<String>) -> Self {
        Matcher::Range {
            lower: Bound::Excluded(value.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn above_or_equal(value: impl Into<String>) -> Self {
        Matcher::Range {
            lower: Bound::Included(value.into()),
            upper: Bound::Unbounded,
        }
    }

    pub fn below(value: impl Into<String>) -> Self {
        Matcher::Range {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(value.into()),
        }
    }

    pub fn below_or_equal(value: impl Into<String>) -> Self {
        Matcher::Range {
            lower: Bound::Unbounded,
            upper: Bound::Included(value.into()),
        }
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Matcher::StartsWith(prefix.into())
    }

    /// True when no key can ever match
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Matcher::AnyOf(values) if values.is_empty())
    }

    fn push_conditions(&self, column: &str, sql: &mut Vec<String>, params: &mut Vec<Value>) {
        match self {
            Matcher::All => {}
            Matcher::Equals(value) => {
                sql.push(format!("{column} = ?"));
                params.push(Value::Text(value.clone()));
            }
            Matcher::AnyOf(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push(format!("{column} IN ({placeholders})"));
                params.extend(values.iter().cloned().map(Value::Text));
            }
            Matcher::Range { lower, upper } => {
                match lower {
                    Bound::Included(v) => {
                        sql.push(format!("{column} >= ?"));
                        params.push(Value::Text(v.clone()));
                    }
                    Bound::Excluded(v) => {
                        sql.push(format!("{column} > ?"));
                        params.push(Value::Text(v.clone()));
                    }
                    Bound::Unbounded => {}
                }
                match upper {
                    Bound::Included(v) => {
                        sql.push(format!("{column} <= ?"));
                        params.push(Value::Text(v.clone()));
                    }
                    Bound::Excluded(v) => {
                        sql.push(format!("{column} < ?"));
                        params.push(Value::Text(v.clone()));
                    }
                    Bound::Unbounded => {}
                }
            }
            Matcher::StartsWith(prefix) => {
                sql.push(format!("{column} >= ?"));
                params.push(Value::Text(prefix.clone()));
                if let Some(upper) = prefix_upper_bound(prefix) {
                    sql.push(format!("{column} < ?"));
                    params.push(Value::Text(upper));
                }
            }
        }
    }
}

/// Smallest string above every string that starts with `prefix`.
///
/// UTF-8 byte order is code point order, so bumping the last character that
/// isn't `char::MAX` (and dropping what follows) gives the bound. `None` when
/// no such character exists and the range is open above.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match last {
            char::MAX => continue,
            '\u{D7FF}' => '\u{E000}',
            c => char::from_u32(c as u32 + 1)?,
        };
        chars.push(next);
        return Some(chars.into_iter().collect());
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub field: IndexField,
    pub matcher: Matcher,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl IndexQuery {
    pub fn new(field: IndexField, matcher: Matcher) -> Self {
        Self {
            field,
            matcher,
            reverse: false,
            limit: None,
        }
    }

    /// Whole index in key order
    pub fn order_by(field: IndexField) -> Self {
        Self::new(field, Matcher::All)
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The index key of `message` for this query's field
    pub fn key_of<'a>(&self, message: &'a Message) -> &'a str {
        match self.field {
            IndexField::Topic => &message.topic,
            IndexField::Message => &message.message,
            IndexField::Timestamp => &message.timestamp,
        }
    }
}

/// Position of the last row handed out: `(index key, primary key)`.
pub type ScanPosition = (String, String);

/// Fetch up to `page_size` rows matching `query` that sort after `after`.
pub fn fetch_page(
    conn: &Connection,
    table: &TableSchema,
    query: &IndexQuery,
    after: Option<&ScanPosition>,
    page_size: usize,
) -> Result<Vec<Message>> {
    if page_size == 0 || query.matcher.is_empty() {
        return Ok(Vec::new());
    }

    let column = query.field.as_str();
    let key = table.primary_key.field.as_str();
    let (cmp, direction) = if query.reverse {
        ("<", "DESC")
    } else {
        (">", "ASC")
    };

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    query
        .matcher
        .push_conditions(column, &mut conditions, &mut params);

    if let Some((last_key, last_id)) = after {
        conditions.push(format!(
            "({column} {cmp} ? OR ({column} = ? AND {key} {cmp} ?))"
        ));
        params.push(Value::Text(last_key.clone()));
        params.push(Value::Text(last_key.clone()));
        params.push(Value::Text(last_id.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {key}, topic, message, timestamp FROM {table}
         {where_clause}
         ORDER BY {column} {direction}, {key} {direction}
         LIMIT ?",
        table = table.name,
    );
    params.push(Value::Integer(
        i64::try_from(page_size).unwrap_or(i64::MAX),
    ));

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        topic: row.get(1)?,
        message: row.get(2)?,
        timestamp: row.get(3)?,
    })
}
