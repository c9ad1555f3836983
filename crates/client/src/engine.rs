use std::sync::Arc;

use bwq_common::{BwqError, CompilerConfig, Result};
use bwq_planner::{CompiledQuery, Method, SearchSpec};
use bwq_storage::{RelationalExecutor, ResultSet};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::ratio::compose_ratio;
use crate::response::{render_tsv, BookListing, FieldDescription, Response};
use crate::session::{Session, SharedSession};

const POSSIBLE_FIELDS_SQL: &str = "SELECT name,type,description,tablename,dbname,anchor FROM masterVariableTable WHERE status='public'";

/// Entry point for compiling and running searches against one database.
#[derive(Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    pub fn connect(executor: Arc<dyn RelationalExecutor>, config: CompilerConfig) -> Result<Self> {
        let session = Arc::new(Session::connect(executor, config)?);
        Ok(Self { session })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.session.config
    }

    pub fn parse(&self, request: &JsonValue) -> Result<SearchSpec> {
        SearchSpec::from_json(request, &self.session.config)
    }

    pub fn compile(&self, spec: &SearchSpec) -> Result<CompiledQuery> {
        self.session.planner().plan(spec)
    }

    /// Multiline description of the numerator and denominator plans.
    pub fn explain(&self, spec: &SearchSpec) -> Result<String> {
        self.session.planner().explain_plan(spec)
    }

    /// Compile and run the final statistics query.
    pub fn execute(&self, spec: &SearchSpec) -> Result<ResultSet> {
        let compiled = self.compile(spec)?;
        self.session.executor.execute(&compiled.sql)
    }

    /// Run numerator and denominator separately and compose the statistics
    /// here, for executors that cannot run derived-table joins.
    ///
    /// Group columns come back as stored ids, without display lookups.
    pub fn run_split(&self, spec: &SearchSpec) -> Result<ResultSet> {
        let compiled = self.compile(spec)?;
        let executor = &self.session.executor;
        let numerator = executor.execute(&compiled.numerator_sql)?;
        let denominator = compiled
            .denominator_sql
            .as_deref()
            .map(|sql| executor.execute(sql))
            .transpose()?;
        debug!(
            numerator_rows = numerator.rows.len(),
            denominator_rows = ?denominator.as_ref().map(|d| d.rows.len()),
            operator = "Engine",
            "composing split ratio"
        );
        compose_ratio(
            &numerator,
            denominator.as_ref(),
            &compiled.groupings,
            &spec.counttypes,
        )
    }

    pub fn run_json_str(&self, request: &str) -> Result<Response> {
        let value: JsonValue =
            serde_json::from_str(request).map_err(|e| BwqError::InvalidConfig(e.to_string()))?;
        self.run(&value)
    }

    /// Parse a request and answer it according to its `method`.
    pub fn run(&self, request: &JsonValue) -> Result<Response> {
        let spec = self.parse(request)?;
        if let Some(db) = &spec.database {
            let connected = self.session.executor.database_identity();
            if db != connected {
                debug!(requested = %db, connected = %connected, operator = "Engine", "request names another database");
            }
        }
        info!(method = ?spec.method, operator = "Engine", "running search");
        Ok(match spec.method {
            Method::Nothing => Response::Nothing,
            Method::ReturnTsv => Response::Tsv(self.return_tsv(&spec)?),
            Method::SearchResults | Method::ReturnBooks => {
                Response::Books(self.search_results(&spec)?)
            }
            Method::ReturnPossibleFields => Response::Fields(self.possible_fields()),
            Method::DebugQuery => Response::Debug(self.debug_query(&spec)?),
        })
    }

    /// Tab-separated results with a header line.
    ///
    /// Requests for raw counts only skip the ratio wrapper and read the
    /// numerator counts directly.
    pub fn return_tsv(&self, spec: &SearchSpec) -> Result<String> {
        let compiled = self.compile(spec)?;
        let sql = if spec.counttypes.iter().all(|c| !c.needs_denominator()) {
            &compiled.numerator_sql
        } else {
            &compiled.sql
        };
        let rs = self.session.executor.execute(sql)?;
        Ok(render_tsv(&rs))
    }

    pub fn search_results(&self, spec: &SearchSpec) -> Result<BookListing> {
        let sql = self
            .session
            .planner()
            .listing_query(spec, self.session.config.listing_limit)?;
        let rs = self.session.executor.execute(&sql)?;
        let books: Vec<String> = rs
            .rows
            .iter()
            .filter_map(|r| r.first())
            .map(|v| v.to_string())
            .collect();
        Ok(if books.is_empty() {
            BookListing::Empty
        } else {
            BookListing::Books(books)
        })
    }

    /// Public fields from the metadata tables; empty when they are unreadable.
    pub fn possible_fields(&self) -> Vec<FieldDescription> {
        let rs = match self.session.executor.execute(POSSIBLE_FIELDS_SQL) {
            Ok(rs) => rs,
            Err(e) => {
                debug!(error = %e, operator = "Engine", "field listing unavailable");
                return vec![];
            }
        };
        let cell = |row: &[bwq_storage::Value], name: &str| {
            rs.column_index(name)
                .and_then(|i| row.get(i))
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        rs.rows
            .iter()
            .map(|row| FieldDescription {
                name: cell(row, "name"),
                field_type: cell(row, "type"),
                description: cell(row, "description"),
                tablename: cell(row, "tablename"),
                dbname: cell(row, "dbname"),
                anchor: cell(row, "anchor"),
            })
            .collect()
    }

    /// Grouping columns as a JSON list, followed by the final SQL.
    pub fn debug_query(&self, spec: &SearchSpec) -> Result<String> {
        let compiled = self.compile(spec)?;
        let groups = serde_json::to_string(&compiled.groupings)
            .map_err(|e| BwqError::Execution(e.to_string()))?;
        Ok(format!("{groups}{}", compiled.sql))
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.prometheus_metrics()
    }
}
