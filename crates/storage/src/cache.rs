use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use bwq_common::{BwqError, CacheKey, MetricsRegistry, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::provider::RelationalExecutor;

/// Hex digits of the content hash kept in table names.
const TABLE_HASH_LEN: usize = 32;

/// One materialized derived table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub table_name: String,
    pub created_at_ms: u64,
}

/// Content-addressed store of materialized subquery results.
///
/// Tables are named after a hash of the normalized SQL and the database, so
/// every process that materializes the same subquery lands on the same table.
/// Entries are never expired here: dropping stale tables after the corpus
/// changes is the operator's job.
#[derive(Debug)]
pub struct DerivedTableCache {
    scratch_database: String,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    metrics: MetricsRegistry,
}

impl DerivedTableCache {
    pub fn new(scratch_database: impl Into<String>, metrics: MetricsRegistry) -> Self {
        Self {
            scratch_database: scratch_database.into(),
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Deterministic key for `sql` run against `database`.
    pub fn cache_key(sql: &str, database: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(bwq_sql::normalize_sql(sql).as_bytes());
        hasher.update([0u8]);
        hasher.update(database.as_bytes());
        CacheKey(format!("{:x}", hasher.finalize()))
    }

    pub fn table_name(&self, key: &CacheKey) -> String {
        let hash = &key.0[..TABLE_HASH_LEN.min(key.0.len())];
        format!("{}.tmp{hash}", self.scratch_database)
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| BwqError::Storage("cache entries lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize the rows of `sql` into an indexed table and return its name.
    ///
    /// The first caller for a key runs the query, creates the table and inserts
    /// the rows; later callers get the same name without touching the executor.
    /// When another process created the table first, creation reports
    /// [`BwqError::TableExists`] and the insert is skipped.
    ///
    /// The query runs before the table is created, and a table whose insert
    /// fails is dropped again, so a failed fill never leaves an empty table
    /// under the key's name.
    ///
    /// # Errors
    /// Executor failures other than the creation race are returned as
    /// [`BwqError::Storage`].
    pub fn materialize(
        &self,
        executor: &dyn RelationalExecutor,
        sql: &str,
        index_columns: &[String],
    ) -> Result<String> {
        let key = Self::cache_key(sql, executor.database_identity());
        if let Some(entry) = self.get(&key)? {
            self.metrics.record_cache_lookup("hit");
            return Ok(entry.table_name);
        }

        let key_lock = self.key_lock(&key)?;
        let _guard = key_lock
            .lock()
            .map_err(|_| BwqError::Storage("cache key lock poisoned".to_string()))?;
        if let Some(entry) = self.get(&key)? {
            self.metrics.record_cache_lookup("hit");
            return Ok(entry.table_name);
        }

        let table = self.table_name(&key);
        let rs = executor.execute(sql).map_err(storage_error(&table))?;
        let columns = bwq_sql::projection_names(sql).unwrap_or_else(|| rs.columns.clone());

        let outcome = match executor.create_indexed_table(&table, &columns, index_columns) {
            Ok(()) => {
                let inserted = match executor.bulk_insert(&table, &rs.rows) {
                    Ok(n) => n,
                    Err(e) => {
                        if let Err(drop_err) = executor.drop_table(&table) {
                            warn!(table = %table, error = %drop_err, operator = "DerivedTableCache", "could not drop partially filled table");
                        }
                        return Err(storage_error(&table)(e));
                    }
                };
                self.metrics.record_cache_insert(inserted);
                debug!(table = %table, rows = inserted, operator = "DerivedTableCache", "materialized");
                "miss"
            }
            Err(BwqError::TableExists(_)) => {
                debug!(table = %table, operator = "DerivedTableCache", "table created elsewhere; reusing");
                "race"
            }
            Err(e) => return Err(storage_error(&table)(e)),
        };
        self.metrics.record_cache_lookup(outcome);

        let entry = CacheEntry {
            key: key.clone(),
            table_name: table.clone(),
            created_at_ms: now_ms()?,
        };
        self.entries
            .write()
            .map_err(|_| BwqError::Storage("cache entries lock poisoned".to_string()))?
            .insert(key.clone(), entry);
        self.release_key_lock(&key)?;
        Ok(table)
    }

    fn key_lock(&self, key: &CacheKey) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| BwqError::Storage("cache key table lock poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    /// Forget the lock of a key that now has an entry; waiters still holding
    /// it find the entry on their second lookup.
    fn release_key_lock(&self, key: &CacheKey) -> Result<()> {
        self.key_locks
            .lock()
            .map_err(|_| BwqError::Storage("cache key table lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.key_locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

fn storage_error(table: &str) -> impl Fn(BwqError) -> BwqError + '_ {
    move |e| match e {
        BwqError::Storage(msg) => BwqError::Storage(msg),
        other => BwqError::Storage(format!("materializing {table}: {other}")),
    }
}

fn now_ms() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BwqError::Storage(format!("clock error: {e}")))?
        .as_millis() as u64)
}
