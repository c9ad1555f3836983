use std::sync::Arc;

use prometheus::{Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Prometheus counters for compilation, word lookups and the derived-table cache.
///
/// Cloning shares the underlying registry.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    queries_compiled: CounterVec,
    compile_time_seconds: HistogramVec,
    word_lookups: CounterVec,
    cache_lookups: CounterVec,
    cache_rows_inserted: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one compiled search, labelled by the fact table it dispatched to.
    pub fn record_compile(&self, fact_table: &str, secs: f64) {
        self.inner
            .queries_compiled
            .with_label_values(&[fact_table])
            .inc();
        self.inner
            .compile_time_seconds
            .with_label_values(&[fact_table])
            .observe(secs);
    }

    pub fn record_word_lookup(&self, collation: &str, ids_found: usize) {
        let outcome = if ids_found == 0 { "miss" } else { "hit" };
        self.inner
            .word_lookups
            .with_label_values(&[collation, outcome])
            .inc();
    }

    /// `outcome` is one of `hit`, `miss`, `race`.
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.inner
            .cache_lookups
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_cache_insert(&self, rows: u64) {
        self.inner.cache_rows_inserted.inc_by(rows as f64);
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let queries_compiled = counter_vec(
            &registry,
            "bwq_queries_compiled_total",
            "Searches compiled to SQL",
            &["fact_table"],
        );
        let compile_time_seconds = histogram_vec(
            &registry,
            "bwq_compile_time_seconds",
            "Time spent compiling one search, including word lookups",
            &["fact_table"],
        );
        let word_lookups = counter_vec(
            &registry,
            "bwq_word_lookups_total",
            "Dictionary lookups by collation and outcome",
            &["collation", "outcome"],
        );
        let cache_lookups = counter_vec(
            &registry,
            "bwq_cache_lookups_total",
            "Derived-table cache lookups by outcome",
            &["outcome"],
        );
        let cache_rows_inserted = counter(
            &registry,
            "bwq_cache_rows_inserted_total",
            "Rows bulk-inserted into derived tables",
        );

        Self {
            registry,
            queries_compiled,
            compile_time_seconds,
            word_lookups,
            cache_lookups,
            cache_rows_inserted,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn counter(registry: &Registry, name: &str, help: &str) -> Counter {
    let c = Counter::with_opts(Opts::new(name, help)).expect("counter");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_compile("master_bookcounts", 0.002);
        let text = m.render_prometheus();
        assert!(text.contains("bwq_queries_compiled_total"));
        assert!(text.contains("master_bookcounts"));
    }

    #[test]
    fn renders_all_metric_families() {
        let m = MetricsRegistry::new();
        m.record_compile("catalog", 0.001);
        m.record_word_lookup("word", 2);
        m.record_word_lookup("word", 0);
        m.record_cache_lookup("miss");
        m.record_cache_lookup("hit");
        m.record_cache_insert(12);
        let text = m.render_prometheus();
        assert!(text.contains("bwq_cache_rows_inserted_total 12"));
        assert!(!text.contains("tmp"));

        assert!(text.contains("bwq_queries_compiled_total"));
        assert!(text.contains("bwq_compile_time_seconds"));
        assert!(text.contains("bwq_word_lookups_total"));
        assert!(text.contains("bwq_cache_lookups_total"));
        assert!(text.contains("bwq_cache_rows_inserted_total"));
    }

    #[test]
    fn clones_share_registry() {
        let m = MetricsRegistry::new();
        let c = m.clone();
        c.record_cache_lookup("race");
        assert!(m.render_prometheus().contains("race"));
    }
}
