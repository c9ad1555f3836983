use std::collections::BTreeSet;

use bwq_common::{MetricsRegistry, Result, WordId};
use bwq_storage::RelationalExecutor;
use rust_stemmers::{Algorithm, Stemmer};
use tracing::debug;

use crate::search_spec::Collation;

/// Surface form looked up in the dictionary for `word` under `collation`.
///
/// Stemming applies to the term as typed; the stem column carries its own case.
pub fn normalize_word(word: &str, collation: Collation) -> String {
    match collation {
        Collation::CaseSensitive => word.to_string(),
        Collation::CaseInsensitive | Collation::Lowercase => word.to_lowercase(),
        Collation::Stem => Stemmer::create(Algorithm::English).stem(word).into_owned(),
    }
}

/// Maps search terms to dictionary word ids.
pub struct WordResolver<'a> {
    executor: &'a dyn RelationalExecutor,
    dictionary: &'a str,
    metrics: Option<&'a MetricsRegistry>,
}

impl<'a> WordResolver<'a> {
    pub fn new(executor: &'a dyn RelationalExecutor, dictionary: &'a str) -> Self {
        Self {
            executor,
            dictionary,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Every id whose collation column equals the normalized `word`.
    ///
    /// An unknown word resolves to the empty set; lookup failures propagate.
    pub fn resolve(&self, word: &str, collation: Collation) -> Result<BTreeSet<WordId>> {
        let normalized = normalize_word(word, collation);
        let sql = format!(
            "SELECT wordid FROM {} WHERE {} = '{}'",
            self.dictionary,
            collation.column(),
            self.executor.escape_string(&normalized)
        );
        let rs = self.executor.execute(&sql)?;
        let ids: BTreeSet<WordId> = rs
            .rows
            .iter()
            .filter_map(|r| r.first().and_then(|v| v.as_i64()))
            .map(WordId)
            .collect();
        if let Some(m) = self.metrics {
            m.record_word_lookup(collation.column(), ids.len());
        }
        debug!(word = %normalized, ids = ids.len(), operator = "WordResolver", "resolved word");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use bwq_common::WordId;
    use bwq_storage::{MemoryExecutor, ResultSet, Value};

    use super::{normalize_word, WordResolver};
    use crate::search_spec::Collation;

    #[test]
    fn normalization_per_collation() {
        assert_eq!(normalize_word("Dog", Collation::CaseInsensitive), "dog");
        assert_eq!(normalize_word("Dog", Collation::CaseSensitive), "Dog");
        assert_eq!(normalize_word("DOG", Collation::Lowercase), "dog");
        assert_eq!(normalize_word("running", Collation::Stem), "run");
    }

    #[test]
    fn stemming_keeps_the_typed_case() {
        assert_eq!(normalize_word("Dogs", Collation::Stem), "Dog");
        assert_eq!(normalize_word("Dogs", Collation::Lowercase), "dogs");
    }

    #[test]
    fn lookup_uses_collation_column_and_escaping() {
        let ex = MemoryExecutor::new("test");
        ex.respond(
            "WHERE casesens = 'O\\'Neil'",
            ResultSet::new(
                vec!["wordid".to_string()],
                vec![vec![Value::Int(9)], vec![Value::Int(3)]],
            ),
        );
        let ids = WordResolver::new(&ex, "wordsheap")
            .resolve("O'Neil", Collation::CaseSensitive)
            .expect("resolve");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![WordId(3), WordId(9)]);
        assert_eq!(
            ex.executed(),
            vec!["SELECT wordid FROM wordsheap WHERE casesens = 'O\\'Neil'".to_string()]
        );
    }

    #[test]
    fn unknown_word_is_empty_not_error() {
        let ex = MemoryExecutor::new("test");
        let ids = WordResolver::new(&ex, "wordsheap")
            .resolve("zzyzx", Collation::CaseInsensitive)
            .expect("resolve");
        assert!(ids.is_empty());
    }
}
