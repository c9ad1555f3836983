#![allow(dead_code)]

use std::collections::BTreeMap;

use bwq_common::{CompilerConfig, MetricsRegistry};
use bwq_planner::{QueryPlanner, SearchSpec};
use bwq_storage::{DerivedTableCache, MemoryExecutor, ResultSet, SchemaCatalog, SchemaMetadata, Value};

/// Dictionary rows known to every fixture: (column, surface form, word ids).
const DICTIONARY: &[(&str, &str, &[i64])] = &[
    ("word", "the", &[1]),
    ("word", "dog", &[2]),
    ("word", "cat", &[3]),
    ("casesens", "Dog", &[7, 8]),
    ("stem", "run", &[11]),
];

pub struct Fixture {
    pub config: CompilerConfig,
    pub catalog: SchemaCatalog,
    pub executor: MemoryExecutor,
    pub cache: DerivedTableCache,
    pub metrics: MetricsRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_parents(&[
            ("genres", "fastcat"),
            ("countryLookup", "countryDisk"),
            ("countryDisk", "fastcat"),
            ("stateLookup", "fastcat"),
        ])
    }

    /// Fixture whose table dependencies are exactly `parents`.
    pub fn with_parents(parents: &[(&str, &str)]) -> Self {
        Self::with_schema(&[], parents)
    }

    /// Default fields plus `fields` (field, owning table), with `parents` as
    /// the table dependencies.
    pub fn with_schema(fields: &[(&str, &str)], parents: &[(&str, &str)]) -> Self {
        let config = CompilerConfig::default();
        let mut field_table = BTreeMap::from([
            ("year".to_string(), "fastcat".to_string()),
            ("genre".to_string(), "genres".to_string()),
            ("country".to_string(), "countryLookup".to_string()),
            ("state".to_string(), "stateLookup".to_string()),
        ]);
        field_table.extend(fields.iter().map(|(f, t)| (f.to_string(), t.to_string())));
        let meta = SchemaMetadata {
            field_table,
            table_parent: parents
                .iter()
                .map(|(t, p)| (t.to_string(), p.to_string()))
                .collect(),
            aliases: BTreeMap::from([("state".to_string(), "state__id".to_string())]),
        };
        let catalog = SchemaCatalog::from_metadata(meta, &config);

        let executor = MemoryExecutor::new("presidio");
        for (column, word, ids) in DICTIONARY {
            executor.respond(
                format!("WHERE {column} = '{word}'"),
                ResultSet::new(
                    vec!["wordid".to_string()],
                    ids.iter().map(|id| vec![Value::Int(*id)]).collect(),
                ),
            );
        }

        let metrics = MetricsRegistry::new();
        let cache = DerivedTableCache::new(config.scratch_database.clone(), metrics.clone());
        Self {
            config,
            catalog,
            executor,
            cache,
            metrics,
        }
    }

    pub fn planner(&self) -> QueryPlanner<'_> {
        QueryPlanner::new(&self.config, &self.catalog, &self.executor, &self.cache)
            .with_metrics(&self.metrics)
    }

    pub fn spec(&self, request: serde_json::Value) -> SearchSpec {
        SearchSpec::from_json(&request, &self.config).expect("parse search spec")
    }
}
