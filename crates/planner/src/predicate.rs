use bwq_common::{BwqError, Result};
use bwq_storage::SqlEscaper;

use crate::search_spec::{CompareOp, ConstraintNode, Scalar};

/// Reject field names that could not be a bare column reference.
///
/// Allowed characters are ASCII letters, digits, `_`, `$` (operator keys) and
/// `*` (comparison markers, stripped before compilation).
pub fn validate_field_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '*'));
    if ok {
        Ok(())
    } else {
        Err(BwqError::Planning(format!("illegal field name: {name:?}")))
    }
}

/// Turns a constraint tree into a SQL boolean expression.
///
/// String literals go through the executor's native escaping. Output is a pure
/// function of the tree: same tree, same text.
pub struct PredicateCompiler<'a, E: SqlEscaper + ?Sized> {
    escaper: &'a E,
}

impl<'a, E: SqlEscaper + ?Sized> PredicateCompiler<'a, E> {
    pub fn new(escaper: &'a E) -> Self {
        Self { escaper }
    }

    /// Compile `node`. An unconstrained tree compiles to `TRUE`.
    pub fn compile(&self, node: &ConstraintNode) -> Result<String> {
        match node {
            ConstraintNode::Leaf { field, values } => {
                validate_field_name(field)?;
                Ok(self.render_comparison(field, CompareOp::Eq, values))
            }
            ConstraintNode::Comparison { field, op, values } => {
                validate_field_name(field)?;
                Ok(self.render_comparison(field, *op, values))
            }
            ConstraintNode::And(children) => {
                let parts = children
                    .iter()
                    .map(|c| self.compile(c))
                    .collect::<Result<Vec<_>>>()?;
                let parts: Vec<String> = parts.into_iter().filter(|p| p != "TRUE").collect();
                Ok(join_group(parts, " AND "))
            }
            ConstraintNode::Or(children) => {
                let parts = children
                    .iter()
                    .map(|c| self.compile(c))
                    .collect::<Result<Vec<_>>>()?;
                if parts.iter().any(|p| p == "TRUE") {
                    return Ok("TRUE".to_string());
                }
                Ok(join_group(parts, " OR "))
            }
        }
    }

    /// Render one comparison against a column the caller vouches for.
    ///
    /// Several values combine with `AND` for `!=` and with `OR` otherwise.
    pub fn render_comparison(&self, column: &str, op: CompareOp, values: &[Scalar]) -> String {
        let parts: Vec<String> = values
            .iter()
            .map(|v| format!("{column} {} {}", op.sql(), self.render_scalar(v)))
            .collect();
        join_group(parts, op.value_joiner())
    }

    pub fn render_scalar(&self, value: &Scalar) -> String {
        match value {
            Scalar::Str(s) => format!("'{}'", self.escaper.escape_string(s)),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

/// Wrap `parts` joined by `joiner` in parentheses when there is more than one.
pub(crate) fn join_group(mut parts: Vec<String>, joiner: &str) -> String {
    match parts.len() {
        0 => "TRUE".to_string(),
        1 => parts.remove(0),
        _ => format!("({})", parts.join(joiner)),
    }
}

#[cfg(test)]
mod tests {
    use bwq_storage::MySqlEscaper;

    use super::{validate_field_name, PredicateCompiler};
    use crate::search_spec::{CompareOp, ConstraintNode, Scalar};

    fn compile(node: &ConstraintNode) -> String {
        PredicateCompiler::new(&MySqlEscaper).compile(node).expect("compile")
    }

    #[test]
    fn empty_tree_is_true() {
        assert_eq!(compile(&ConstraintNode::unconstrained()), "TRUE");
        assert_eq!(compile(&ConstraintNode::Or(vec![])), "TRUE");
    }

    #[test]
    fn single_value_has_no_parentheses() {
        let n = ConstraintNode::leaf("genre", vec![Scalar::Str("fiction".to_string())]);
        assert_eq!(compile(&n), "genre = 'fiction'");
    }

    #[test]
    fn not_equal_lists_are_conjunctions() {
        let n = ConstraintNode::Comparison {
            field: "year".to_string(),
            op: CompareOp::Ne,
            values: vec![Scalar::Int(1900), Scalar::Int(1901)],
        };
        assert_eq!(compile(&n), "(year != 1900 AND year != 1901)");
    }

    #[test]
    fn other_lists_are_disjunctions() {
        let n = ConstraintNode::Comparison {
            field: "year".to_string(),
            op: CompareOp::Gt,
            values: vec![Scalar::Int(1900), Scalar::Float(1950.5)],
        };
        assert_eq!(compile(&n), "(year > 1900 OR year > 1950.5)");
    }

    #[test]
    fn nested_groups_keep_their_connectives() {
        let n = ConstraintNode::And(vec![
            ConstraintNode::leaf("genre", vec![Scalar::Str("fiction".to_string())]),
            ConstraintNode::Or(vec![
                ConstraintNode::leaf("country", vec![Scalar::Str("US".to_string())]),
                ConstraintNode::Comparison {
                    field: "title".to_string(),
                    op: CompareOp::Regex,
                    values: vec![Scalar::Str("^The".to_string())],
                },
            ]),
        ]);
        assert_eq!(
            compile(&n),
            "(genre = 'fiction' AND (country = 'US' OR title REGEXP '^The'))"
        );
    }

    #[test]
    fn strings_are_escaped() {
        let n = ConstraintNode::leaf("author", vec![Scalar::Str("O'Brien".to_string())]);
        assert_eq!(compile(&n), "author = 'O\\'Brien'");
    }

    #[test]
    fn hostile_field_names_are_rejected() {
        assert!(validate_field_name("year").is_ok());
        assert!(validate_field_name("genre*").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("year) OR (1=1").is_err());
        let n = ConstraintNode::leaf("a.b", vec![Scalar::Int(1)]);
        assert!(PredicateCompiler::new(&MySqlEscaper).compile(&n).is_err());
    }
}
