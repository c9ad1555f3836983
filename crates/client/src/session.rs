use std::sync::Arc;

use bwq_common::{CompilerConfig, MetricsRegistry, Result};
use bwq_planner::QueryPlanner;
use bwq_storage::{resolve_fallback_tables, DerivedTableCache, RelationalExecutor, SchemaCatalog};
use tracing::info;

pub type SharedSession = Arc<Session>;

/// Everything a compile needs for one database, resolved once at connect.
pub struct Session {
    pub config: CompilerConfig,
    pub catalog: SchemaCatalog,
    pub executor: Arc<dyn RelationalExecutor>,
    pub cache: DerivedTableCache,
    pub metrics: MetricsRegistry,
}

impl Session {
    /// Resolve memory-table fallbacks, then load the schema catalog.
    pub fn connect(executor: Arc<dyn RelationalExecutor>, config: CompilerConfig) -> Result<Self> {
        let config = resolve_fallback_tables(executor.as_ref(), &config);
        let catalog = SchemaCatalog::connect(executor.as_ref(), &config)?;
        let metrics = MetricsRegistry::new();
        let cache = DerivedTableCache::new(config.scratch_database.clone(), metrics.clone());
        info!(
            database = executor.database_identity(),
            fastcat = %config.fastcat,
            fastword = %config.fastword,
            operator = "Session",
            "session connected"
        );
        Ok(Self {
            config,
            catalog,
            executor,
            cache,
            metrics,
        })
    }

    pub fn planner(&self) -> QueryPlanner<'_> {
        QueryPlanner::new(&self.config, &self.catalog, self.executor.as_ref(), &self.cache)
            .with_metrics(&self.metrics)
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.render_prometheus()
    }
}
