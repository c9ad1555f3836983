//! Memory-table fallback.
//!
//! The fast catalog and dictionary live in MEMORY tables that are empty after a
//! database restart until someone reloads them. Their on-disk twins carry the
//! same name with a trailing `_`.

use bwq_common::CompilerConfig;
use tracing::{debug, info};

use crate::provider::{scalar_i64, RelationalExecutor};

/// Physical table to read for `table`: the table itself when populated,
/// otherwise its disk copy.
pub fn fallback_table(executor: &dyn RelationalExecutor, table: &str) -> String {
    if table.ends_with('_') {
        return table.to_string();
    }
    let rows = executor
        .execute(&format!("SELECT COUNT(*) FROM {table}"))
        .and_then(|rs| scalar_i64(&rs));
    match rows {
        Ok(n) if n > 0 => table.to_string(),
        Ok(_) => {
            info!(table, operator = "TableFallback", "memory table empty; using disk copy");
            format!("{table}_")
        }
        Err(e) => {
            debug!(table, error = %e, operator = "TableFallback", "memory table unreadable");
            format!("{table}_")
        }
    }
}

/// Copy of `config` with the fast catalog and dictionary names resolved.
///
/// Disk-only tables are never probed.
pub fn resolve_fallback_tables(
    executor: &dyn RelationalExecutor,
    config: &CompilerConfig,
) -> CompilerConfig {
    let mut resolved = config.clone();
    resolved.fastcat = fallback_table(executor, &config.fastcat);
    resolved.fastword = fallback_table(executor, &config.fastword);
    resolved
}
