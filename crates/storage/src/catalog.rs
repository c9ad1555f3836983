use std::collections::{BTreeMap, BTreeSet};

use bwq_common::{BwqError, CompilerConfig, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{RelationalExecutor, Value};

/// Logical name of the per-record catalog root.
pub const CATALOG_ROOT: &str = "fastcat";
/// Logical name of the word dictionary root.
pub const DICTIONARY_ROOT: &str = "wordsheap";

/// Raw field/table metadata as delivered by a [`SchemaCatalogProvider`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Public field name -> owning table.
    pub field_table: BTreeMap<String, String>,
    /// Table -> table it joins through on the way to a root.
    pub table_parent: BTreeMap<String, String>,
    /// Public field name -> indexed internal column.
    pub aliases: BTreeMap<String, String>,
}

/// Source of schema metadata for one database.
pub trait SchemaCatalogProvider {
    /// # Errors
    /// Returns an error when this strategy cannot describe the database; callers
    /// may then try another strategy.
    fn load_metadata(&self) -> Result<SchemaMetadata>;
}

/// Preferred strategy: the explicit `masterVariableTable`/`masterTableTable` pair
/// written at ingestion time.
pub struct MetadataTables<'a> {
    executor: &'a dyn RelationalExecutor,
    config: &'a CompilerConfig,
}

impl<'a> MetadataTables<'a> {
    pub fn new(executor: &'a dyn RelationalExecutor, config: &'a CompilerConfig) -> Self {
        Self { executor, config }
    }
}

impl SchemaCatalogProvider for MetadataTables<'_> {
    fn load_metadata(&self) -> Result<SchemaMetadata> {
        let rs = self.executor.execute(
            "SELECT dbname,alias,tablename,dependsOn FROM masterVariableTable \
             JOIN masterTableTable USING (tablename)",
        )?;
        let mut meta = SchemaMetadata::default();
        for row in &rs.rows {
            let (Some(dbname), Some(tablename)) = (cell(row, 0), cell(row, 2)) else {
                continue;
            };
            if let Some(alias) = cell(row, 1) {
                meta.aliases.insert(dbname.clone(), alias);
            }
            if let Some(parent) = cell(row, 3) {
                if parent != tablename {
                    meta.table_parent.insert(tablename.clone(), parent);
                }
            }
            meta.field_table.insert(dbname, tablename);
        }
        register_keys(&mut meta, self.config);
        Ok(meta)
    }
}

/// Fallback strategy for databases built before the metadata tables existed:
/// reconstruct the layout from `information_schema`.
pub struct InformationSchema<'a> {
    executor: &'a dyn RelationalExecutor,
    config: &'a CompilerConfig,
}

impl<'a> InformationSchema<'a> {
    pub fn new(executor: &'a dyn RelationalExecutor, config: &'a CompilerConfig) -> Self {
        Self { executor, config }
    }
}

impl SchemaCatalogProvider for InformationSchema<'_> {
    fn load_metadata(&self) -> Result<SchemaMetadata> {
        let db = self
            .executor
            .escape_string(self.executor.database_identity());
        // Key columns sort first within each table, so the first row of a table
        // names the column it hangs off.
        let sql = format!(
            "SELECT ENGINE,TABLE_NAME,COLUMN_NAME,COLUMN_KEY,\
             TABLE_NAME='fastcat' OR TABLE_NAME='wordsheap' AS privileged \
             FROM information_schema.COLUMNS JOIN information_schema.TABLES \
             USING (TABLE_NAME,TABLE_SCHEMA) WHERE TABLE_SCHEMA='{db}' \
             ORDER BY privileged,ENGINE DESC,TABLE_NAME,COLUMN_KEY DESC"
        );
        let rs = self.executor.execute(&sql)?;
        let alias_suffix = Regex::new(r"__id\*?$")
            .map_err(|e| BwqError::InvalidConfig(format!("alias pattern: {e}")))?;

        let mut meta = SchemaMetadata::default();
        let mut table_anchor: BTreeMap<String, String> = BTreeMap::new();
        let mut previous: Option<String> = None;
        let mut anchor = "bookid".to_string();
        for row in &rs.rows {
            let (Some(table), Some(column)) = (cell(row, 1), cell(row, 2)) else {
                continue;
            };
            let keyed = matches!(cell(row, 3).as_deref(), Some("PRI") | Some("MUL"));
            if previous.as_deref() != Some(table.as_str()) {
                if keyed {
                    anchor = column;
                    previous = Some(table);
                } else {
                    anchor = "bookid".to_string();
                }
                continue;
            }
            if !keyed {
                meta.field_table.insert(column.clone(), table.clone());
            }
            if alias_suffix.is_match(&column) {
                let public = column.replace("__id", "").replace('*', "");
                meta.aliases.insert(public, column.clone());
            }
            table_anchor.insert(table, anchor.clone());
        }

        for (table, anchor) in table_anchor {
            let parent = if anchor == "bookid" {
                CATALOG_ROOT.to_string()
            } else {
                match meta.field_table.get(&anchor) {
                    Some(t) => t.clone(),
                    None => CATALOG_ROOT.to_string(),
                }
            };
            if parent != table {
                meta.table_parent.insert(table, parent);
            }
        }

        match self
            .executor
            .execute("SELECT dbname,tablename,anchor,alias FROM masterVariableTables")
        {
            Ok(extra) => {
                for row in &extra.rows {
                    if let (Some(dbname), Some(alias)) = (cell(row, 0), cell(row, 3)) {
                        if dbname != alias {
                            meta.aliases.insert(dbname, alias);
                        }
                    }
                }
            }
            Err(e) => debug!(error = %e, "no masterVariableTables alias overrides"),
        }

        register_keys(&mut meta, self.config);
        Ok(meta)
    }
}

fn register_keys(meta: &mut SchemaMetadata, config: &CompilerConfig) {
    meta.field_table
        .insert("bookid".to_string(), config.fastcat.clone());
    meta.field_table
        .insert("wordid".to_string(), config.fastword.clone());
}

fn cell(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx)? {
        Value::Null => None,
        v => Some(v.to_string()),
    }
}

/// Field-to-table resolution and table dependency lookups for one database.
///
/// Built once per connection and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    field_table: BTreeMap<String, String>,
    table_parent: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    roots: BTreeSet<String>,
    max_hops: usize,
}

impl SchemaCatalog {
    pub fn from_metadata(meta: SchemaMetadata, config: &CompilerConfig) -> Self {
        let roots = [
            CATALOG_ROOT,
            DICTIONARY_ROOT,
            config.fastcat.as_str(),
            config.fastword.as_str(),
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        Self {
            field_table: meta.field_table,
            table_parent: meta.table_parent,
            aliases: meta.aliases,
            roots,
            max_hops: config.max_dependency_hops,
        }
    }

    /// Build from the metadata tables, or from `information_schema` when the
    /// metadata tables cannot be read.
    pub fn connect(executor: &dyn RelationalExecutor, config: &CompilerConfig) -> Result<Self> {
        let metadata = match MetadataTables::new(executor, config).load_metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(
                    error = %e,
                    operator = "SchemaCatalog",
                    "metadata tables unavailable; falling back to information_schema"
                );
                InformationSchema::new(executor, config).load_metadata()?
            }
        };
        debug!(
            fields = metadata.field_table.len(),
            tables = metadata.table_parent.len(),
            aliases = metadata.aliases.len(),
            operator = "SchemaCatalog",
            "schema catalog loaded"
        );
        Ok(Self::from_metadata(metadata, config))
    }

    /// Table that stores `field`.
    pub fn resolve(&self, field: &str) -> Option<&str> {
        self.field_table.get(field).map(String::as_str)
    }

    pub fn parent(&self, table: &str) -> Option<&str> {
        self.table_parent.get(table).map(String::as_str)
    }

    /// Internal column backing a public field name, when one is declared.
    pub fn alias(&self, field: &str) -> Option<&str> {
        self.aliases.get(field).map(String::as_str)
    }

    pub fn is_root(&self, table: &str) -> bool {
        self.roots.contains(table)
    }

    /// Ancestors of `table`, nearest first, ending at a root.
    ///
    /// A table without a declared parent ends the chain early.
    ///
    /// # Errors
    /// Returns [`BwqError::Planning`] on a cycle or when the chain exceeds the
    /// configured hop limit.
    pub fn dependency_chain(&self, table: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([table.to_string()]);
        let mut current = table;
        while !self.is_root(current) {
            let Some(parent) = self.parent(current) else {
                break;
            };
            if !seen.insert(parent.to_string()) || chain.len() >= self.max_hops {
                return Err(BwqError::Planning(format!(
                    "table dependency chain from {table} does not reach a root within {} hops",
                    self.max_hops
                )));
            }
            chain.push(parent.to_string());
            current = parent;
        }
        Ok(chain)
    }
}
