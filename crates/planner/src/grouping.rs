use std::collections::BTreeSet;

use bwq_common::{BwqError, CompilerConfig, Result};
use bwq_storage::SchemaCatalog;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::search_spec::Collation;

/// Grouping column used when a request asks for no groups.
pub const CONSTANT_GROUP: &str = "In_Library";

/// Group columns of one request, split between the inner counts subquery and
/// the outer query that turns ids back into display values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPlan {
    /// Outer select expressions, one per requested group.
    pub outer: Vec<String>,
    /// Display names, matching `outer`.
    pub output_columns: Vec<String>,
    /// Inner select expressions.
    pub inner: Vec<String>,
    /// Inner result column names; the GROUP BY list on both levels.
    pub groupings: Vec<String>,
    /// Outer joins from group ids to display tables.
    pub merge_joins: Vec<String>,
    /// Catalog fields the inner query must reach.
    pub catalog_fields: Vec<String>,
    /// Word positions grouped on (1 or 2).
    pub word_positions: BTreeSet<usize>,
    /// A bigram element was requested, so counts come from the bigram table.
    pub bigrams: bool,
    pub topics: bool,
}

impl GroupPlan {
    fn push_inner(&mut self, expr: String, name: String) {
        if !self.groupings.contains(&name) {
            self.inner.push(expr);
            self.groupings.push(name);
        }
    }

    fn push_outer(&mut self, expr: String, name: &str) {
        if !self.output_columns.iter().any(|c| c == name) {
            self.outer.push(expr);
            self.output_columns.push(name.to_string());
        }
    }
}

/// Classify `groups` and build their select, group and join fragments.
///
/// `unigram` groups on the single word position. `bigram1`/`bigram2` name the
/// element of a two-word phrase. Trigrams have no fact table.
pub fn plan_groups(
    groups: &[String],
    catalog: &SchemaCatalog,
    config: &CompilerConfig,
    collation: Collation,
) -> Result<GroupPlan> {
    let ngram = Regex::new(r"^(unigram|bigram|trigram)(\d)?$")
        .map_err(|e| BwqError::InvalidConfig(format!("ngram pattern: {e}")))?;
    let mut plan = GroupPlan::default();
    for group in groups {
        if let Some(caps) = ngram.captures(group) {
            let gram = &caps[1];
            let position = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
            let position = match (gram, position) {
                ("trigram", _) => {
                    return Err(BwqError::Unsupported(format!(
                        "{group}: trigram grouping is not supported"
                    )))
                }
                ("unigram", None | Some(1)) => 1,
                ("bigram", Some(p @ (1 | 2))) => p,
                ("bigram", None) => {
                    return Err(BwqError::Planning(format!(
                        "{group}: name the bigram element, bigram1 or bigram2"
                    )))
                }
                _ => {
                    return Err(BwqError::Unsupported(format!(
                        "{group}: word position out of range"
                    )))
                }
            };
            let lookup = format!("{gram}Lookup{position}");
            plan.push_outer(format!("{lookup}.{} as {group}", collation.column()), group);
            plan.merge_joins.push(format!(
                "JOIN {} as {lookup} ON {lookup}.wordid=w{position}",
                config.fastword
            ));
            plan.push_inner(
                format!("words{position}.wordid as w{position}"),
                format!("w{position}"),
            );
            plan.word_positions.insert(position);
            plan.bigrams |= gram == "bigram";
            continue;
        }

        if group.contains("topic") {
            plan.topics = true;
        }
        match (catalog.alias(group), catalog.resolve(group)) {
            (Some(alias), Some(table)) if alias != group.as_str() => {
                plan.push_outer(group.clone(), group);
                plan.merge_joins.push(format!("JOIN {table} USING ({alias})"));
                plan.push_inner(alias.to_string(), alias.to_string());
                plan.catalog_fields.push(alias.to_string());
            }
            _ => {
                plan.push_outer(group.clone(), group);
                plan.push_inner(group.clone(), group.clone());
                plan.catalog_fields.push(group.clone());
            }
        }
    }

    if plan.groupings.is_empty() {
        plan.push_inner(format!("1 as {CONSTANT_GROUP}"), CONSTANT_GROUP.to_string());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bwq_common::{BwqError, CompilerConfig};
    use bwq_storage::{SchemaCatalog, SchemaMetadata};

    use super::{plan_groups, CONSTANT_GROUP};
    use crate::search_spec::Collation;

    fn catalog() -> SchemaCatalog {
        let meta = SchemaMetadata {
            field_table: BTreeMap::from([
                ("state".to_string(), "stateLookup".to_string()),
                ("year".to_string(), "fastcat".to_string()),
            ]),
            table_parent: BTreeMap::new(),
            aliases: BTreeMap::from([("state".to_string(), "state__id".to_string())]),
        };
        SchemaCatalog::from_metadata(meta, &CompilerConfig::default())
    }

    fn plan(groups: &[&str]) -> bwq_common::Result<super::GroupPlan> {
        let groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
        plan_groups(&groups, &catalog(), &CompilerConfig::default(), Collation::CaseInsensitive)
    }

    #[test]
    fn no_groups_uses_constant_column() {
        let p = plan(&[]).expect("plan");
        assert_eq!(p.groupings, vec![CONSTANT_GROUP.to_string()]);
        assert!(p.outer.is_empty());
    }

    #[test]
    fn unigram_maps_to_first_position() {
        let p = plan(&["unigram", "year"]).expect("plan");
        assert_eq!(p.inner, vec!["words1.wordid as w1", "year"]);
        assert_eq!(p.outer, vec!["unigramLookup1.word as unigram", "year"]);
        assert_eq!(
            p.merge_joins,
            vec!["JOIN wordsheap as unigramLookup1 ON unigramLookup1.wordid=w1"]
        );
        assert!(p.word_positions.contains(&1));
    }

    #[test]
    fn aliased_fields_group_on_internal_column() {
        let p = plan(&["state"]).expect("plan");
        assert_eq!(p.inner, vec!["state__id"]);
        assert_eq!(p.outer, vec!["state"]);
        assert_eq!(p.merge_joins, vec!["JOIN stateLookup USING (state__id)"]);
    }

    #[test]
    fn unsupported_word_groups() {
        assert!(matches!(plan(&["trigram"]), Err(BwqError::Unsupported(_))));
        assert!(matches!(plan(&["unigram2"]), Err(BwqError::Unsupported(_))));
        assert!(matches!(plan(&["bigram"]), Err(BwqError::Planning(_))));
        assert!(plan(&["bigram2"]).expect("bigram2").word_positions.contains(&2));
    }
}
