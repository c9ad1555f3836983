use std::fmt;

use bwq_common::{BwqError, Result};
use serde::{Deserialize, Serialize};

/// One cell returned by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

pub type Row = Vec<Value>;

/// Rows plus column names, in executor order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Native string escaping of the target database.
pub trait SqlEscaper: Send + Sync {
    /// Escape `value` for placement between single quotes.
    fn escape_string(&self, value: &str) -> String {
        escape_mysql_string(value)
    }
}

/// MySQL `mysql_real_escape_string` rules without a live connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlEscaper;

impl SqlEscaper for MySqlEscaper {}

pub fn escape_mysql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{1a}' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out
}

/// The relational store that runs compiled SQL.
///
/// Implementations own connections, pooling and timeouts; the compiler treats
/// every call as a blocking call/return boundary.
pub trait RelationalExecutor: SqlEscaper {
    /// Name of the database queries run against; part of every cache key.
    fn database_identity(&self) -> &str;

    /// Run one statement and return its rows.
    ///
    /// # Errors
    /// Returns [`BwqError::Execution`] for any database-side failure.
    fn execute(&self, sql: &str) -> Result<ResultSet>;

    /// Create a table with the given columns and secondary indexes.
    ///
    /// # Errors
    /// Must return [`BwqError::TableExists`] when `name` is already taken so that
    /// create-if-absent callers can recover; any other failure is fatal.
    fn create_indexed_table(
        &self,
        name: &str,
        columns: &[String],
        index_columns: &[String],
    ) -> Result<()>;

    /// Append rows to an existing table. Returns the number of rows written.
    fn bulk_insert(&self, name: &str, rows: &[Row]) -> Result<u64>;

    /// Drop a table, used to discard a derived table whose fill failed.
    fn drop_table(&self, name: &str) -> Result<()>;
}

/// Read a single integer from the first cell of a result set.
pub fn scalar_i64(rs: &ResultSet) -> Result<i64> {
    rs.rows
        .first()
        .and_then(|r| r.first())
        .and_then(Value::as_i64)
        .ok_or_else(|| BwqError::Execution("expected one integer cell".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{escape_mysql_string, scalar_i64, ResultSet, Value};

    #[test]
    fn escapes_quotes_and_control_characters() {
        assert_eq!(escape_mysql_string("O'Brien"), "O\\'Brien");
        assert_eq!(escape_mysql_string("a\\b"), "a\\\\b");
        assert_eq!(escape_mysql_string("line\nnext"), "line\\nnext");
        assert_eq!(escape_mysql_string("plain"), "plain");
    }

    #[test]
    fn scalar_reads_first_cell() {
        let rs = ResultSet::new(vec!["COUNT(*)".to_string()], vec![vec![Value::Int(7)]]);
        assert_eq!(scalar_i64(&rs).expect("scalar"), 7);
        assert!(scalar_i64(&ResultSet::default()).is_err());
    }

    #[test]
    fn values_render_without_quotes() {
        assert_eq!(Value::Text("x".to_string()).to_string(), "x");
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Text(" 12 ".to_string()).as_i64(), Some(12));
    }
}
