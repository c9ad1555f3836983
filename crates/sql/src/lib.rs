use bwq_common::{BwqError, Result};
use sqlparser::ast::{Expr, SelectItem, SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// Parse MySQL-dialect text into statements.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = MySqlDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| BwqError::Planning(e.to_string()))
}

/// Canonical text for `sql`, stable across whitespace and keyword-case changes.
///
/// Statements the parser understands are re-rendered from the AST. Anything it
/// rejects falls back to whitespace collapsing so that hashing still works on
/// dialect extensions the parser does not cover.
pub fn normalize_sql(sql: &str) -> String {
    match parse_sql(sql) {
        Ok(stmts) if !stmts.is_empty() => stmts
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("; "),
        _ => collapse_whitespace(sql),
    }
}

/// Output column names of a single plain `SELECT`, when every projection item
/// has a derivable name.
pub fn projection_names(sql: &str) -> Option<Vec<String>> {
    let stmts = parse_sql(sql).ok()?;
    let Statement::Query(q) = stmts.first()? else {
        return None;
    };
    let SetExpr::Select(select) = q.body.as_ref() else {
        return None;
    };
    select
        .projection
        .iter()
        .map(|item| match item {
            SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.clone()),
            SelectItem::UnnamedExpr(Expr::Identifier(id)) => Some(id.value.clone()),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                parts.last().map(|i| i.value.clone())
            }
            _ => None,
        })
        .collect()
}

fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{collapse_whitespace, normalize_sql, projection_names};

    #[test]
    fn whitespace_does_not_change_normal_form() {
        let a = normalize_sql("SELECT bookid FROM fastcat WHERE year = 1900");
        let b = normalize_sql("SELECT   bookid\n FROM fastcat\n\tWHERE year = 1900;");
        assert_eq!(a, b);
    }

    #[test]
    fn unparseable_text_falls_back_to_collapsing() {
        assert_eq!(
            collapse_whitespace("NOT  REALLY\n sql ;"),
            "NOT REALLY sql".to_string()
        );
        assert_eq!(normalize_sql("NOT  REALLY\n sql"), "NOT REALLY sql");
    }

    #[test]
    fn projection_names_follow_aliases() {
        assert_eq!(
            projection_names("SELECT main.bookid AS bookid FROM fastcat NATURAL JOIN master_bookcounts AS main"),
            Some(vec!["bookid".to_string()])
        );
        assert_eq!(
            projection_names("SELECT fastcat.year, nwords FROM fastcat"),
            Some(vec!["year".to_string(), "nwords".to_string()])
        );
        assert_eq!(projection_names("SELECT count(*) FROM fastcat"), None);
    }
}
