//! In-process executor.
//!
//! Holds created tables in memory and answers other statements from scripted
//! replies matched by substring. Useful for embedding the compiler without a
//! database and for exercising cache and catalog behavior in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use bwq_common::{BwqError, Result};

use crate::provider::{RelationalExecutor, ResultSet, Row, SqlEscaper, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub index_columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone)]
enum Reply {
    Rows(ResultSet),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Rule {
    fragment: String,
    reply: Reply,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    rules: Vec<Rule>,
    executed: Vec<String>,
    create_calls: usize,
    insert_calls: usize,
    drop_calls: usize,
}

#[derive(Debug)]
pub struct MemoryExecutor {
    database: String,
    state: Mutex<MemoryState>,
}

impl MemoryExecutor {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Answer any statement containing `fragment` with `rows`.
    ///
    /// Rules are tried in registration order.
    pub fn respond(&self, fragment: impl Into<String>, rows: ResultSet) -> &Self {
        self.state().rules.push(Rule {
            fragment: fragment.into(),
            reply: Reply::Rows(rows),
        });
        self
    }

    /// Fail any statement containing `fragment`.
    pub fn fail(&self, fragment: impl Into<String>, message: impl Into<String>) -> &Self {
        self.state().rules.push(Rule {
            fragment: fragment.into(),
            reply: Reply::Fail(message.into()),
        });
        self
    }

    /// Register a populated table; `SELECT COUNT(*)` and `SELECT *` against it
    /// are answered from its rows.
    pub fn insert_table(&self, name: impl Into<String>, columns: &[&str], rows: Vec<Row>) {
        self.state().tables.insert(
            name.into(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                index_columns: vec![],
                rows,
            },
        );
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.state().tables.get(name).cloned()
    }

    /// Statements passed to [`RelationalExecutor::execute`], in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn bulk_insert_calls(&self) -> usize {
        self.state().insert_calls
    }

    pub fn drop_calls(&self) -> usize {
        self.state().drop_calls
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SqlEscaper for MemoryExecutor {}

impl RelationalExecutor for MemoryExecutor {
    fn database_identity(&self) -> &str {
        &self.database
    }

    fn execute(&self, sql: &str) -> Result<ResultSet> {
        let mut state = self.state();
        state.executed.push(sql.to_string());
        if let Some(rule) = state.rules.iter().find(|r| sql.contains(&r.fragment)) {
            return match &rule.reply {
                Reply::Rows(rs) => Ok(rs.clone()),
                Reply::Fail(msg) => Err(BwqError::Execution(msg.clone())),
            };
        }
        if let Some(table) = sql.trim().strip_prefix("SELECT COUNT(*) FROM ") {
            return match state.tables.get(table.trim()) {
                Some(t) => Ok(ResultSet::new(
                    vec!["COUNT(*)".to_string()],
                    vec![vec![Value::Int(t.rows.len() as i64)]],
                )),
                None => Err(BwqError::Execution(format!(
                    "Table '{}' doesn't exist",
                    table.trim()
                ))),
            };
        }
        if let Some(table) = sql.trim().strip_prefix("SELECT * FROM ") {
            if let Some(t) = state.tables.get(table.trim()) {
                return Ok(ResultSet::new(t.columns.clone(), t.rows.clone()));
            }
        }
        Ok(ResultSet::default())
    }

    fn create_indexed_table(
        &self,
        name: &str,
        columns: &[String],
        index_columns: &[String],
    ) -> Result<()> {
        let mut state = self.state();
        state.create_calls += 1;
        if state.tables.contains_key(name) {
            return Err(BwqError::TableExists(name.to_string()));
        }
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.to_vec(),
                index_columns: index_columns.to_vec(),
                rows: vec![],
            },
        );
        Ok(())
    }

    fn bulk_insert(&self, name: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.state();
        state.insert_calls += 1;
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| BwqError::Execution(format!("Table '{name}' doesn't exist")))?;
        table.rows.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.drop_calls += 1;
        state
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BwqError::Execution(format!("Unknown table '{name}'")))
    }
}
