//! Connection handle, row materializer, and statement builders.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, Statement};
use tracing::{error, info, warn};

use crate::error::{DbError, DbResult};
use crate::{Payload, Row, Value};

/// Owned handle over one driver connection.
///
/// Created once and threaded explicitly through the application; there is no
/// process-wide singleton, no pooling, and no reconnect. Every operation
/// requires a successfully opened handle, which the constructor guarantees.
/// Thread safety for shared use is whatever the driver provides: `Database`
/// is `Send` but not `Sync`.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// Failure is returned, not aborted on, so the application decides at its
    /// top level whether to fail fast. The outcome is logged either way.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        match Connection::open(path) {
            Ok(conn) => {
                info!(path = %path.display(), "opened sqlite database");
                Ok(Self { conn })
            }
            Err(source) => {
                error!(path = %path.display(), %source, "failed to open sqlite database");
                Err(DbError::Open {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        match Connection::open_in_memory() {
            Ok(conn) => {
                info!("opened in-memory sqlite database");
                Ok(Self { conn })
            }
            Err(source) => {
                error!(%source, "failed to open in-memory sqlite database");
                Err(DbError::Open {
                    path: ":memory:".into(),
                    source,
                })
            }
        }
    }

    /// Borrow the underlying driver connection, for anything this layer does
    /// not wrap (DDL, pragmas).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a batch of semicolon-separated statements, e.g. schema setup.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Legacy unparameterized query: every column is stringified (NULL
    /// becomes the empty string, numerics are formatted, text and blob
    /// payloads are lossy-decoded). Returns one map per row, in fetch order.
    ///
    /// # Injection safety
    ///
    /// There is no argument binding here; if `sql` embeds untrusted input
    /// this call is injectable. Prefer [`Database::fetch_all`].
    pub fn query(&self, sql: &str) -> DbResult<Vec<HashMap<String, String>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = HashMap::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                record.insert(column.clone(), stringify(row.get_ref(idx)?));
            }
            result.push(record);
        }
        Ok(result)
    }

    /// Execute `sql` with `?` placeholders bound to `args` and materialize
    /// the first row. Zero rows is `Ok(None)`, not an error.
    pub fn fetch_one(&self, sql: &str, args: &[Value]) -> DbResult<Option<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        match rows.next()? {
            Some(row) => Ok(Some(materialize(&columns, row)?)),
            None => Ok(None),
        }
    }

    /// Execute `sql` with `?` placeholders bound to `args` and materialize
    /// every row, in fetch order (no order guarantee without an ORDER BY).
    ///
    /// A row that fails to materialize is logged and skipped; the remaining
    /// rows are still returned. Zero rows yields an empty vector.
    pub fn fetch_all(&self, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            match materialize(&columns, row) {
                Ok(record) => result.push(record),
                Err(err) => warn!(%err, "dropping row that failed to materialize"),
            }
        }
        Ok(result)
    }

    /// Insert one record and return the driver-reported last-inserted row id.
    ///
    /// One placeholder is generated per payload entry, and the bound values
    /// come from the same iteration that produced the column list, so the
    /// pairing cannot skew.
    ///
    /// # Injection safety
    ///
    /// `table` is spliced into the statement verbatim and never validated.
    /// It must not originate from untrusted input.
    pub fn insert(&self, table: &str, data: &Payload) -> DbResult<i64> {
        let (sql, vals) = build_insert(table, data);
        self.conn.execute(&sql, params_from_iter(vals))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update records matching `condition` and return the affected-row count.
    ///
    /// Payload values are bound first, then `args` for the placeholders
    /// inside `condition`. An empty `condition` omits the WHERE clause and
    /// updates the whole table; `args` is ignored in that case.
    ///
    /// # Injection safety
    ///
    /// `table` and `condition` are spliced into the statement verbatim and
    /// never validated. They must not originate from untrusted input; values
    /// inside the condition belong in `args`, not in the string.
    pub fn update(
        &self,
        table: &str,
        condition: &str,
        data: &Payload,
        args: &[Value],
    ) -> DbResult<usize> {
        let (sql, vals) = build_update(table, condition, data, args);
        Ok(self.conn.execute(&sql, params_from_iter(vals))?)
    }

    /// Delete records matching `condition` and return the affected-row count.
    ///
    /// An empty `condition` omits the WHERE clause and deletes every row.
    ///
    /// # Injection safety
    ///
    /// Same contract as [`Database::update`]: `table` and `condition` are
    /// caller-trusted raw SQL fragments.
    pub fn delete(&self, table: &str, condition: &str, args: &[Value]) -> DbResult<usize> {
        let sql = build_delete(table, condition);
        Ok(self.conn.execute(&sql, params_from_iter(args.iter()))?)
    }
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().iter().map(|c| c.to_string()).collect()
}

/// Materialize the cursor's current row into a [`Row`].
///
/// Text and blob payloads arrive from the driver as raw bytes and are decoded
/// to UTF-8 text; integers, reals, and NULLs pass through as typed scalars.
/// Stringifying those too would corrupt NULL and numeric fidelity.
fn materialize(columns: &[String], row: &rusqlite::Row<'_>) -> DbResult<Row> {
    let mut out = Row::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(x) => Value::Real(x),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| DbError::Decode {
                    column: column.clone(),
                })?;
                Value::Text(text.to_owned())
            }
        };
        out.insert(column.clone(), value);
    }
    Ok(out)
}

/// Legacy stringification used by [`Database::query`].
fn stringify(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(x) => x.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

// The builders collect columns and values in one pass over the payload, the
// single iteration order both sides of the statement depend on.

fn build_insert<'a>(table: &str, data: &'a Payload) -> (String, Vec<&'a Value>) {
    let mut fields = Vec::with_capacity(data.values.len());
    let mut vals = Vec::with_capacity(data.values.len());
    for (field, value) in &data.values {
        fields.push(field.as_str());
        vals.push(value);
    }
    let placeholders = vec!["?"; vals.len()].join(",");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        fields.join(","),
        placeholders
    );
    (sql, vals)
}

fn build_update<'a>(
    table: &str,
    condition: &str,
    data: &'a Payload,
    args: &'a [Value],
) -> (String, Vec<&'a Value>) {
    let mut assignments = Vec::with_capacity(data.values.len());
    let mut vals: Vec<&Value> = Vec::with_capacity(data.values.len() + args.len());
    for (field, value) in &data.values {
        assignments.push(format!("{field}=?"));
        vals.push(value);
    }
    let mut sql = format!("UPDATE {} SET {}", table, assignments.join(","));
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
        vals.extend(args.iter());
    }
    (sql, vals)
}

fn build_delete(table: &str, condition: &str) -> String {
    if condition.is_empty() {
        format!("DELETE FROM {table}")
    } else {
        format!("DELETE FROM {table} WHERE {condition}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_builder_pairs_columns_and_values() {
        let payload = Payload::new().with("a", 1i64).with("b", "x");
        let (sql, vals) = build_insert("t", &payload);

        assert_eq!(sql.matches('?').count(), payload.len());
        assert_eq!(vals.len(), payload.len());

        // Whatever order the payload iterated in, column i must line up
        // with bound value i.
        let cols = sql
            .strip_prefix("INSERT INTO t (")
            .and_then(|rest| rest.split_once(')'))
            .map(|(cols, _)| cols)
            .unwrap();
        for (col, val) in cols.split(',').zip(&vals) {
            assert_eq!(payload.values.get(col), Some(*val));
        }
    }

    #[test]
    fn update_builder_binds_payload_then_condition_args() {
        let payload = Payload::new().with("x", 5i64);
        let args = [Value::Integer(7)];
        let (sql, vals) = build_update("t", "id=?", &payload, &args);

        assert_eq!(sql, "UPDATE t SET x=? WHERE id=?");
        assert_eq!(vals, vec![&Value::Integer(5), &Value::Integer(7)]);
    }

    #[test]
    fn update_builder_without_condition_omits_where() {
        let payload = Payload::new().with("x", 5i64);
        let (sql, vals) = build_update("t", "", &payload, &[Value::Integer(7)]);

        assert_eq!(sql, "UPDATE t SET x=?");
        assert_eq!(vals, vec![&Value::Integer(5)]);
    }

    #[test]
    fn delete_builder_omits_where_for_empty_condition() {
        assert_eq!(build_delete("t", ""), "DELETE FROM t");
        assert!(!build_delete("t", "").contains("WHERE"));
        assert_eq!(build_delete("t", "id=?"), "DELETE FROM t WHERE id=?");
    }

    #[test]
    fn duplicate_result_columns_keep_last_value() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .fetch_one("SELECT 1 AS a, 2 AS a", &[])
            .unwrap()
            .unwrap();

        assert_eq!(row.len(), 1);
        assert_eq!(row.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn materializer_keeps_native_scalar_types() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .fetch_one("SELECT 1 AS i, 1.5 AS r, 'x' AS t, NULL AS n", &[])
            .unwrap()
            .unwrap();

        assert_eq!(row.get("i"), Some(&Value::Integer(1)));
        assert_eq!(row.get("r"), Some(&Value::Real(1.5)));
        assert_eq!(row.get("t"), Some(&Value::Text("x".into())));
        assert_eq!(row.get("n"), Some(&Value::Null));
    }

    #[test]
    fn blob_payloads_normalize_to_text() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .fetch_one("SELECT x'616263' AS b", &[])
            .unwrap()
            .unwrap();

        assert_eq!(row.get("b"), Some(&Value::Text("abc".into())));
    }

    #[test]
    fn fetch_one_with_non_utf8_payload_is_a_decode_error() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .fetch_one("SELECT x'fffe' AS b", &[])
            .unwrap_err();

        assert!(matches!(err, DbError::Decode { column } if column == "b"));
    }
}
