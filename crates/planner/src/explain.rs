use crate::query_planner::{CompiledQuery, CountsQuery};

/// Render a counts query as human-readable multiline text.
pub fn explain_counts(query: &CountsQuery) -> String {
    let mut s = String::new();
    fmt_counts(query, 0, &mut s);
    s
}

/// Render a compiled request: the final statement, then each subquery.
pub fn explain_compiled(
    compiled: &CompiledQuery,
    numerator: &CountsQuery,
    denominator: Option<&CountsQuery>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Search fact_table={} columns={:?}\n",
        compiled.fact_table.label(),
        compiled.columns
    ));
    out.push_str(&format!("  group_by={:?}\n", compiled.groupings));
    out.push_str("  numerator:\n");
    fmt_counts(numerator, 2, &mut out);
    if let Some(den) = denominator {
        out.push_str("  denominator:\n");
        fmt_counts(den, 2, &mut out);
    }
    out
}

fn fmt_counts(q: &CountsQuery, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    out.push_str(&format!("{pad}Counts fact_table={}\n", q.fact_table.label()));
    out.push_str(&format!("{pad}  select={}\n", q.groups.inner.len()));
    for s in &q.groups.inner {
        out.push_str(&format!("{pad}    {s}\n"));
    }
    out.push_str(&format!("{pad}  aggs={}\n", q.operations.len()));
    for op in &q.operations {
        out.push_str(&format!("{pad}    {op}\n"));
    }
    out.push_str(&format!("{pad}  catalog={}\n", q.catalog));
    if !q.main.is_empty() {
        out.push_str(&format!("{pad}  main={}\n", q.main.trim()));
    }
    if !q.words.is_empty() {
        out.push_str(&format!("{pad}  words={}\n", q.words.trim()));
    }
    out.push_str(&format!("{pad}  catalog_where={}\n", q.catalog_where));
    out.push_str(&format!("{pad}  words_where={}\n", q.words_where));
    out.push_str(&format!("{pad}  group_by={:?}\n", q.groups.groupings));
}
