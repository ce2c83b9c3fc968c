use crate::error::PersistenceError;
use serde::Serialize;
use std::fmt;

mod memory;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// A single cell in the tabular store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Text(String),
}

impl CellValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Integer(v.into())
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Ordered column -> value mapping. Column order is the header order
/// used when the store creates a table from the first appended record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, CellValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Replaces the value when the column already exists, otherwise appends it.
    pub fn set(&mut self, column: &str, value: impl Into<CellValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| c == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Narrow append/rewrite interface over a tabular store.
///
/// `append` creates the store and the named table on first use, deriving the
/// header from the record's keys. Retrying a failed append is the caller's
/// policy; the gateway itself is not idempotent.
pub trait PersistenceGateway: Send + Sync {
    fn append(&self, table: &str, record: &Record) -> Result<(), PersistenceError>;

    /// Rows in insertion order. A table that does not exist yet is empty.
    fn select_all(&self, table: &str) -> Result<Vec<Record>, PersistenceError>;

    fn select_where(
        &self,
        table: &str,
        column: &str,
        value: &CellValue,
    ) -> Result<Vec<Record>, PersistenceError>;

    /// Sets `column = value` on every row whose `key_column` equals `key`.
    /// Returns the number of rewritten rows.
    fn update_where(
        &self,
        table: &str,
        key_column: &str,
        key: &CellValue,
        column: &str,
        value: &CellValue,
    ) -> Result<usize, PersistenceError>;
}

pub(crate) fn check_identifier(kind: &str, name: &str) -> Result<(), PersistenceError> {
    if name.trim().is_empty() {
        return Err(PersistenceError::Schema(format!("empty {} name", kind)));
    }
    Ok(())
}
