//! Lightweight SQLite access helpers.
//!
//! # Intention
//!
//! - Open a connection, run parameterized queries, and map result rows into
//!   generic column-name to value records.
//! - Provide convenience builders for INSERT/UPDATE/DELETE statements.
//! - Delegate everything non-trivial (file format, locking, statement
//!   execution) to rusqlite, treated as a black box.
//!
//! # Architectural Boundaries
//!
//! - Only thin glue over the driver belongs here.
//! - No connection pooling, transactions, migrations, retry logic, or
//!   ORM-style object mapping.

pub mod error;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use sqlite::Database;

use std::collections::HashMap;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Core value types for fetched columns and statement bindings.
///
/// Fetched NULLs stay [`Value::Null`] and numerics stay typed; only text and
/// blob payloads are normalized to [`Value::Text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

// SQLite stores booleans as integers.
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(n) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*n)),
            Value::Real(x) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*x)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// One fetched record: an insertion-ordered mapping from column name to
/// [`Value`]. Immutable once returned; owned solely by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value. A duplicate column name silently overwrites the
    /// earlier entry's value in place (the entry keeps its position), the
    /// same quirk a query with duplicate result columns exhibits.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in fetch order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Column/value payload for INSERT and UPDATE statements.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Payload {
    pub values: HashMap<String, Value>,
}

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.values.insert(column.to_string(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from(7i32), Value::Integer(7));
        assert_eq!(Value::from(1.5f64), Value::Real(1.5));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Integer(5).as_i64(), Some(5));
        assert_eq!(Value::Text("a".into()).as_str(), Some("a"));
        assert_eq!(Value::Integer(5).as_str(), None);
        assert_eq!(Value::Real(2.0).as_f64(), Some(2.0));
    }

    #[test]
    fn row_duplicate_column_overwrites_in_place() {
        let mut row = Row::new();
        row.insert("a", Value::Integer(1));
        row.insert("b", Value::Integer(2));
        row.insert("a", Value::Integer(3));

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("a"), Some(&Value::Integer(3)));
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["a", "b"]);
    }

    #[test]
    fn row_serializes_as_map_in_column_order() {
        let mut row = Row::new();
        row.insert("name", Value::Text("ada".into()));
        row.insert("age", Value::Null);
        row.insert("id", Value::Integer(1));

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"name":"ada","age":null,"id":1}"#);
    }

    #[test]
    fn payload_builder_collects_values() {
        let payload = Payload::new().with("a", 1i64).with("b", "x");
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.values.get("a"), Some(&Value::Integer(1)));
        assert_eq!(payload.values.get("b"), Some(&Value::Text("x".into())));
    }
}
