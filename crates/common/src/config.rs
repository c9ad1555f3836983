use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{BwqError, Result};

/// Table layout and compiler limits for one bookworm database.
///
/// Passed by value into the schema catalog, planner and engine; nothing reads
/// process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Fast (in-memory) per-record catalog table.
    pub fastcat: String,
    /// Fast (in-memory) word dictionary table.
    pub fastword: String,
    /// Full catalog holding display strings.
    pub fullcat: String,
    /// Full word dictionary.
    pub fullword: String,
    pub unigram_table: String,
    pub bigram_table: String,
    pub topic_words_table: String,
    pub topic_counts_table: String,
    /// Database that holds materialized semi-join tables.
    pub scratch_database: String,
    /// Upper bound on table dependency hops before a chain is treated as cyclic.
    pub max_dependency_hops: usize,
    pub default_time_measure: String,
    /// Row limit for book listings.
    pub listing_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            fastcat: "fastcat".to_string(),
            fastword: "wordsheap".to_string(),
            fullcat: "catalog".to_string(),
            fullword: "words".to_string(),
            unigram_table: "master_bookcounts".to_string(),
            bigram_table: "master_bigrams".to_string(),
            topic_words_table: "master_topicWords".to_string(),
            topic_counts_table: "master_topicCounts".to_string(),
            scratch_database: "bookworm_scratch".to_string(),
            max_dependency_hops: 16,
            default_time_measure: "year".to_string(),
            listing_limit: 100,
        }
    }
}

impl CompilerConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| BwqError::InvalidConfig(e.to_string()))
    }

    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    /// Tables that belong to the fact-table side of a query and must never be
    /// natural-joined onto the catalog.
    pub fn is_base_table(&self, table: &str) -> bool {
        let physical = [
            self.fastcat.as_str(),
            self.fastword.as_str(),
            self.fullword.as_str(),
            self.unigram_table.as_str(),
            self.bigram_table.as_str(),
            self.topic_words_table.as_str(),
            self.topic_counts_table.as_str(),
        ];
        physical.contains(&table)
            || matches!(table, "fastcat" | "fastcat_" | "wordsheap" | "wordsheap_")
    }
}
