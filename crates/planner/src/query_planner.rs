use std::collections::BTreeSet;
use std::time::Instant;

use bwq_common::{BwqError, CompilerConfig, MetricsRegistry, Result, WordId};
use bwq_storage::{DerivedTableCache, RelationalExecutor, SchemaCatalog};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::explain::explain_compiled;
use crate::grouping::{plan_groups, GroupPlan};
use crate::predicate::{join_group, PredicateCompiler};
use crate::search_spec::{CompareOp, ConstraintNode, OrderType, Scalar, SearchSpec};
use crate::word_resolver::WordResolver;

/// Longest phrase the fact tables can answer.
pub const MAX_PHRASE_WORDS: usize = 2;

/// Fact table a counts query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactTable {
    Bigrams,
    TopicWords,
    Unigrams,
    TopicCounts,
    /// No fact table; counts come from catalog `nwords`.
    CatalogOnly,
}

impl FactTable {
    pub fn label(self) -> &'static str {
        match self {
            FactTable::Bigrams => "bigrams",
            FactTable::TopicWords => "topic_words",
            FactTable::Unigrams => "unigrams",
            FactTable::TopicCounts => "topic_counts",
            FactTable::CatalogOnly => "catalog",
        }
    }
}

/// One grouped aggregate over the catalog and (optionally) a fact table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsQuery {
    pub fact_table: FactTable,
    pub groups: GroupPlan,
    pub operations: Vec<String>,
    /// Catalog join chain, starting at the fast catalog.
    pub catalog: String,
    /// Fact table join, empty for catalog-only counts.
    pub main: String,
    /// Dictionary joins per word position.
    pub words: String,
    pub catalog_where: String,
    pub words_where: String,
    bookid_column: String,
}

impl CountsQuery {
    pub fn from_clause(&self) -> String {
        format!("{}{}{}", self.catalog, self.main, self.words)
    }

    pub fn where_clause(&self) -> String {
        format!("{} AND {}", self.catalog_where, self.words_where)
    }

    pub fn to_sql(&self) -> String {
        format!(
            "SELECT {}, {} FROM {} WHERE {} GROUP BY {}",
            self.groups.inner.join(", "),
            self.operations.join(", "),
            self.from_clause(),
            self.where_clause(),
            self.groups.groupings.join(", ")
        )
    }

    /// Distinct ids of the books matching this query, ungrouped.
    pub fn bookid_sql(&self) -> String {
        format!(
            "SELECT DISTINCT {} AS bookid FROM {} WHERE {}",
            self.bookid_column,
            self.from_clause(),
            self.where_clause()
        )
    }
}

/// Final SQL for a request plus the pieces callers may run separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// Output column names: requested groups, then statistics.
    pub columns: Vec<String>,
    pub group_columns: Vec<String>,
    /// Grouping columns shared by numerator and denominator.
    pub groupings: Vec<String>,
    pub fact_table: FactTable,
    pub numerator_sql: String,
    pub denominator_sql: Option<String>,
}

/// Top-level search limits sorted by role.
#[derive(Debug)]
struct LimitParts {
    catalog: ConstraintNode,
    phrases: Vec<String>,
    has_words: Vec<String>,
}

/// `word`, `hasword`, the gram aliases, and positional forms like `word1`.
fn is_word_key(field: &str) -> bool {
    if matches!(field, "word" | "hasword" | "unigram" | "bigram") {
        return true;
    }
    field
        .strip_prefix("words")
        .or_else(|| field.strip_prefix("word"))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn phrase_values(node: &ConstraintNode) -> Result<Vec<String>> {
    match node {
        ConstraintNode::Leaf { values, .. }
        | ConstraintNode::Comparison {
            op: CompareOp::Eq,
            values,
            ..
        } => Ok(values.iter().map(Scalar::to_string).collect()),
        ConstraintNode::Or(children) => Ok(children
            .iter()
            .map(phrase_values)
            .collect::<Result<Vec<_>>>()?
            .concat()),
        other => Err(BwqError::Unsupported(format!(
            "{}: word terms take plain values",
            other.owning_field().unwrap_or("word")
        ))),
    }
}

fn split_limits(limits: &ConstraintNode) -> Result<LimitParts> {
    let mut catalog = vec![];
    let mut phrases = vec![];
    let mut gram_phrases = vec![];
    let mut has_words = vec![];
    for node in limits.top_level() {
        match node.owning_field() {
            Some("word") => phrases.extend(phrase_values(node)?),
            Some("unigram" | "bigram") => gram_phrases.extend(phrase_values(node)?),
            Some("hasword") => has_words.extend(phrase_values(node)?),
            _ => {
                if let Some(f) = node.fields().into_iter().find(|f| is_word_key(f)) {
                    return Err(BwqError::Unsupported(format!(
                        "{f}: word terms must be top-level word or hasword keys"
                    )));
                }
                catalog.push(node.clone());
            }
        }
    }
    if phrases.is_empty() {
        phrases = gram_phrases;
    }
    Ok(LimitParts {
        catalog: ConstraintNode::And(catalog),
        phrases,
        has_words,
    })
}

/// Compiles [`SearchSpec`]s into SQL for one database.
///
/// Word ids are looked up through the executor while planning, and has-word
/// constraints are materialized through the derived-table cache.
pub struct QueryPlanner<'a> {
    config: &'a CompilerConfig,
    catalog: &'a SchemaCatalog,
    executor: &'a dyn RelationalExecutor,
    cache: &'a DerivedTableCache,
    metrics: Option<&'a MetricsRegistry>,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(
        config: &'a CompilerConfig,
        catalog: &'a SchemaCatalog,
        executor: &'a dyn RelationalExecutor,
        cache: &'a DerivedTableCache,
    ) -> Self {
        Self {
            config,
            catalog,
            executor,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Compile a request into its final statistics query.
    ///
    /// Ratio statistics read a denominator subquery built from the relaxed
    /// request and left-joined onto the numerator by the shared groups.
    pub fn plan(&self, spec: &SearchSpec) -> Result<CompiledQuery> {
        Ok(self.plan_with_counts(spec)?.0)
    }

    fn plan_with_counts(
        &self,
        spec: &SearchSpec,
    ) -> Result<(CompiledQuery, CountsQuery, Option<CountsQuery>)> {
        let started = Instant::now();
        let numerator = self.counts_query(&spec.numerator())?;
        let denominator = if spec.counttypes.iter().any(|c| c.needs_denominator()) {
            let den = self.counts_query(&spec.denominator())?;
            if den.groups.groupings != numerator.groups.groupings {
                return Err(BwqError::Planning(format!(
                    "numerator groups {:?} and denominator groups {:?} differ",
                    numerator.groups.groupings, den.groups.groupings
                )));
            }
            Some(den)
        } else {
            None
        };

        let mut finals: Vec<String> = vec![];
        for ct in &spec.counttypes {
            let op = ct.final_operation();
            if !finals.contains(&op) {
                finals.push(op);
            }
        }
        let groups = &numerator.groups;
        let selections = groups
            .outer
            .iter()
            .chain(finals.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let numerator_sql = numerator.to_sql();
        let groupings = groups.groupings.join(", ");
        let source = match &denominator {
            None => format!("({numerator_sql}) AS numerator"),
            Some(den) => format!(
                "({}) AS denominator LEFT JOIN ({numerator_sql}) AS numerator USING ({groupings})",
                den.to_sql()
            ),
        };
        let merges: String = groups.merge_joins.iter().map(|j| format!(" {j}")).collect();
        let sql = format!("SELECT {selections} FROM {source}{merges} GROUP BY {groupings}");

        let columns = groups
            .output_columns
            .iter()
            .cloned()
            .chain(spec.counttypes.iter().map(|c| c.name().to_string()))
            .collect();
        let elapsed = started.elapsed().as_secs_f64();
        if let Some(m) = self.metrics {
            m.record_compile(numerator.fact_table.label(), elapsed);
        }
        info!(
            fact_table = numerator.fact_table.label(),
            ratio = denominator.is_some(),
            elapsed_ms = elapsed * 1000.0,
            operator = "QueryPlanner",
            "compiled search"
        );
        debug!(sql = %sql, operator = "QueryPlanner", "final query");

        let compiled = CompiledQuery {
            sql,
            columns,
            group_columns: groups.output_columns.clone(),
            groupings: groups.groupings.clone(),
            fact_table: numerator.fact_table,
            numerator_sql,
            denominator_sql: denominator.as_ref().map(CountsQuery::to_sql),
        };
        Ok((compiled, numerator, denominator))
    }

    /// Numerator counts SQL alone, enough for raw-count requests.
    pub fn counts_sql(&self, spec: &SearchSpec) -> Result<String> {
        Ok(self.counts_query(&spec.numerator())?.to_sql())
    }

    /// Multiline description of the numerator and denominator plans.
    pub fn explain_plan(&self, spec: &SearchSpec) -> Result<String> {
        let (compiled, numerator, denominator) = self.plan_with_counts(spec)?;
        Ok(explain_compiled(&compiled, &numerator, denominator.as_ref()))
    }

    /// Grouped counts for `spec` exactly as written (no star stripping).
    pub fn counts_query(&self, spec: &SearchSpec) -> Result<CountsQuery> {
        let parts = split_limits(&spec.limits)?;
        let phrases: Vec<Vec<&str>> = parts
            .phrases
            .iter()
            .map(|p| p.split_whitespace().collect::<Vec<_>>())
            .filter(|words| !words.is_empty())
            .collect();
        if let Some(long) = phrases.iter().find(|w| w.len() > MAX_PHRASE_WORDS) {
            return Err(BwqError::Unsupported(format!(
                "phrase {:?} is longer than {MAX_PHRASE_WORDS} words",
                long.join(" ")
            )));
        }
        let groups = plan_groups(&spec.groups, self.catalog, self.config, spec.collation)?;

        let catalog_where = PredicateCompiler::new(self.executor).compile(&parts.catalog)?;
        let fields: Vec<&str> = parts
            .catalog
            .fields()
            .into_iter()
            .chain(groups.catalog_fields.iter().map(String::as_str))
            .collect();
        let mut catalog = self.catalog_join(&fields)?;
        for term in &parts.has_words {
            let table = self.has_word_table(spec, &parts.catalog, term)?;
            catalog.push_str(&format!(" NATURAL JOIN {table}"));
        }

        let max_len = phrases.iter().map(Vec::len).max().unwrap_or(0);
        let unigrams = max_len == 1 || !groups.word_positions.is_empty();
        let topics = groups.topics || parts.catalog.fields().iter().any(|f| f.contains("topic"));
        let fact_table = if max_len == 2 || groups.bigrams {
            FactTable::Bigrams
        } else if topics && unigrams {
            FactTable::TopicWords
        } else if unigrams {
            FactTable::Unigrams
        } else if topics {
            FactTable::TopicCounts
        } else {
            FactTable::CatalogOnly
        };

        let cfg = self.config;
        let word_join = |pos: usize, column: &str| {
            format!(
                " JOIN {} AS words{pos} ON (main.{column} = words{pos}.wordid)",
                cfg.fastword
            )
        };
        let (main, words) = match fact_table {
            FactTable::Bigrams => (
                format!(
                    " JOIN {} AS main ON ({}.bookid = main.bookid)",
                    cfg.bigram_table, cfg.fastcat
                ),
                format!("{}{}", word_join(1, "word1"), word_join(2, "word2")),
            ),
            FactTable::TopicWords => (
                format!(" NATURAL JOIN {} AS main", cfg.topic_words_table),
                word_join(1, "wordid"),
            ),
            FactTable::Unigrams => (
                format!(" NATURAL JOIN {} AS main", cfg.unigram_table),
                word_join(1, "wordid"),
            ),
            FactTable::TopicCounts => (
                format!(" NATURAL JOIN {} AS main", cfg.topic_counts_table),
                String::new(),
            ),
            FactTable::CatalogOnly => (String::new(), String::new()),
        };
        let words_where = match fact_table {
            FactTable::TopicCounts | FactTable::CatalogOnly => "TRUE".to_string(),
            _ => self.words_where(&phrases, spec)?,
        };

        let mut operations: Vec<String> = vec![];
        for ct in &spec.counttypes {
            let op = match fact_table {
                FactTable::CatalogOnly => ct.catalog_operation(),
                _ => ct.book_operation(&cfg.fastcat),
            };
            if !operations.contains(&op) {
                operations.push(op);
            }
        }
        let bookid_column = match fact_table {
            FactTable::CatalogOnly => format!("{}.bookid", cfg.fastcat),
            _ => "main.bookid".to_string(),
        };

        Ok(CountsQuery {
            fact_table,
            groups,
            operations,
            catalog,
            main,
            words,
            catalog_where,
            words_where,
            bookid_column,
        })
    }

    /// Ranked book listing for `spec`, at most `limit` rows.
    pub fn listing_query(&self, spec: &SearchSpec, limit: usize) -> Result<String> {
        let counts = self.counts_query(&spec.numerator())?;
        let raw_only = spec.counttypes.iter().all(|c| !c.needs_denominator());
        let ordering = match (counts.fact_table, spec.ordertype) {
            (FactTable::CatalogOnly, _) => "RAND()",
            (_, OrderType::Random) if raw_only => "RAND()",
            (_, OrderType::Random) => "LOG(1-RAND())/sum(main.count)",
            (_, OrderType::Relevance) => "sum(main.count*10000/nwords)",
        };
        let fastcat = &self.config.fastcat;
        Ok(format!(
            "SELECT searchstring FROM {} RIGHT JOIN (SELECT {fastcat}.bookid, {ordering} AS ordering FROM {} WHERE {} GROUP BY {fastcat}.bookid ORDER BY {ordering} DESC LIMIT {limit}) AS tmp USING (bookid) ORDER BY ordering DESC",
            self.config.fullcat,
            counts.from_clause(),
            counts.where_clause()
        ))
    }

    /// `fastcat` natural-joined with every table the fields need, ancestors
    /// included, in sorted order.
    fn catalog_join(&self, fields: &[&str]) -> Result<String> {
        let mut needed = BTreeSet::new();
        for field in fields {
            let Some(table) = self.catalog.resolve(field) else {
                debug!(field = %field, operator = "QueryPlanner", "field has no catalog table");
                continue;
            };
            needed.insert(table.to_string());
            needed.extend(self.catalog.dependency_chain(table)?);
        }
        let mut sql = self.config.fastcat.clone();
        for table in needed {
            if self.config.is_base_table(&table) || self.catalog.is_root(&table) {
                continue;
            }
            sql.push_str(&format!(" NATURAL JOIN {table}"));
        }
        Ok(sql)
    }

    fn words_where(&self, phrases: &[Vec<&str>], spec: &SearchSpec) -> Result<String> {
        if phrases.is_empty() {
            return Ok("TRUE".to_string());
        }
        let mut resolver = WordResolver::new(self.executor, &self.config.fastword);
        if let Some(m) = self.metrics {
            resolver = resolver.with_metrics(m);
        }
        let predicates = PredicateCompiler::new(self.executor);
        let mut clauses = vec![];
        'phrases: for words in phrases {
            let mut positions = Vec::with_capacity(words.len());
            for (i, word) in words.iter().enumerate() {
                let ids = resolver.resolve(word, spec.collation)?;
                if ids.is_empty() {
                    debug!(word = %word, operator = "QueryPlanner", "unknown word; dropping phrase");
                    continue 'phrases;
                }
                let values: Vec<Scalar> = ids.iter().map(|id| Scalar::Int(id.0)).collect();
                positions.push(predicates.render_comparison(
                    &format!("words{}.wordid", i + 1),
                    CompareOp::Eq,
                    &values,
                ));
            }
            clauses.push(join_group(positions, " AND "));
        }
        if clauses.is_empty() {
            return Ok(format!("words1.wordid = {}", WordId::MISSING.0));
        }
        Ok(join_group(clauses, " OR "))
    }

    /// Materialize the books containing `term` under the catalog limits and
    /// return the scratch table name.
    fn has_word_table(
        &self,
        spec: &SearchSpec,
        catalog_limits: &ConstraintNode,
        term: &str,
    ) -> Result<String> {
        let mut limits = catalog_limits.top_level().to_vec();
        limits.push(ConstraintNode::leaf("word", vec![Scalar::Str(term.to_string())]));
        let nested = SearchSpec {
            limits: ConstraintNode::And(limits),
            compare_limits: None,
            groups: vec![],
            ..spec.clone()
        };
        let sql = self.counts_query(&nested)?.bookid_sql();
        self.cache
            .materialize(self.executor, &sql, &["bookid".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::{is_word_key, split_limits};
    use crate::search_spec::{ConstraintNode, Scalar};

    #[test]
    fn word_keys() {
        for k in ["word", "hasword", "unigram", "bigram", "word1", "words2"] {
            assert!(is_word_key(k), "{k}");
        }
        for k in ["wordcount", "words", "year", "keyword"] {
            assert!(!is_word_key(k), "{k}");
        }
    }

    #[test]
    fn limits_split_by_role() {
        let limits = ConstraintNode::And(vec![
            ConstraintNode::leaf("word", vec![Scalar::Str("the dog".to_string())]),
            ConstraintNode::leaf("hasword", vec![Scalar::Str("cat".to_string())]),
            ConstraintNode::leaf("year", vec![Scalar::Int(1900)]),
        ]);
        let parts = split_limits(&limits).expect("split");
        assert_eq!(parts.phrases, vec!["the dog".to_string()]);
        assert_eq!(parts.has_words, vec!["cat".to_string()]);
        assert_eq!(parts.catalog.fields(), vec!["year"]);
    }

    #[test]
    fn nested_word_terms_are_rejected() {
        let limits = ConstraintNode::Or(vec![
            ConstraintNode::leaf("word", vec![Scalar::Str("dog".to_string())]),
            ConstraintNode::leaf("year", vec![Scalar::Int(1900)]),
        ]);
        assert!(split_limits(&limits).is_err());
    }
}
