mod support;

use bwq_client::{BookListing, Engine, Response};
use bwq_common::{BwqError, CompilerConfig};
use bwq_storage::{MemoryExecutor, Value};
use serde_json::json;
use support::{engine, presidio, rows, text};

#[test]
fn connect_falls_back_to_disk_tables_when_memory_tables_are_empty() {
    let ex = MemoryExecutor::new("presidio");
    ex.insert_table("fastcat", &["bookid"], vec![]);
    ex.insert_table("wordsheap", &["wordid"], vec![vec![Value::Int(1)]]);
    let engine = Engine::connect(std::sync::Arc::new(ex), CompilerConfig::default()).expect("connect");
    assert_eq!(engine.config().fastcat, "fastcat_");
    assert_eq!(engine.config().fastword, "wordsheap");
}

#[test]
fn raw_count_tsv_reads_the_counts_query() {
    let ex = presidio();
    ex.respond(
        "words1.wordid = 2 GROUP BY year",
        rows(
            &["year", "WordCount"],
            vec![
                vec![Value::Int(1900), Value::Int(5)],
                vec![Value::Int(1901), Value::Int(7)],
            ],
        ),
    );
    let engine = engine(&ex);
    let response = engine
        .run(&json!({
            "search_limits": {"word": ["dog"]},
            "groups": ["year"],
            "method": "return_tsv"
        }))
        .expect("run");
    assert_eq!(response, Response::Tsv("year\tWordCount\n1900\t5\n1901\t7".to_string()));
    let last = ex.executed().pop().expect("executed");
    assert!(last.starts_with("SELECT year, sum(main.count) as WordCount FROM"));
    assert!(!last.contains("AS numerator"));
}

#[test]
fn ratio_tsv_reads_the_final_query_and_escapes_tabs() {
    let ex = presidio();
    ex.respond(
        "AS numerator USING (genre)",
        rows(
            &["genre", "WordsPerMillion"],
            vec![vec![text("short\tfiction"), Value::Float(12.5)]],
        ),
    );
    let engine = engine(&ex);
    let tsv = engine
        .run(&json!({
            "search_limits": {"word": ["dog"]},
            "groups": ["genre"],
            "counttype": "WordsPerMillion",
            "method": "return_tsv"
        }))
        .expect("run");
    assert_eq!(tsv, Response::Tsv("genre\tWordsPerMillion\nshort<tab>fiction\t12.5".to_string()));
}

#[test]
fn empty_listing_is_marked_empty() {
    let ex = presidio();
    let engine = engine(&ex);
    let response = engine
        .run(&json!({"search_limits": {"word": ["dog"]}, "method": "search_results"}))
        .expect("run");
    assert_eq!(response, Response::Books(BookListing::Empty));
}

#[test]
fn listing_returns_search_strings_in_order() {
    let ex = presidio();
    ex.respond(
        "SELECT searchstring FROM catalog RIGHT JOIN",
        rows(
            &["searchstring"],
            vec![vec![text("<a>Moby Dick</a>")], vec![text("<a>Typee</a>")]],
        ),
    );
    let engine = engine(&ex);
    let spec = engine
        .parse(&json!({"search_limits": {"word": ["dog"]}, "method": "return_books"}))
        .expect("parse");
    assert_eq!(
        engine.search_results(&spec).expect("listing"),
        BookListing::Books(vec!["<a>Moby Dick</a>".to_string(), "<a>Typee</a>".to_string()])
    );
    assert!(ex
        .executed()
        .iter()
        .any(|sql| sql.contains("DESC LIMIT 100) AS tmp USING (bookid)")));
}

#[test]
fn possible_fields_are_empty_when_unreadable() {
    let ex = presidio();
    ex.fail("WHERE status='public'", "Table 'masterVariableTable' doesn't exist");
    let engine = engine(&ex);
    assert_eq!(
        engine.run(&json!({"method": "returnPossibleFields"})).expect("run"),
        Response::Fields(vec![])
    );
}

#[test]
fn possible_fields_list_public_variables() {
    let ex = presidio();
    ex.respond(
        "WHERE status='public'",
        rows(
            &["name", "type", "description", "tablename", "dbname", "anchor"],
            vec![vec![
                text("Genre"),
                text("categorical"),
                text("Library genre"),
                text("genres"),
                text("genre"),
                text("bookid"),
            ]],
        ),
    );
    let engine = engine(&ex);
    let fields = engine.possible_fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].dbname, "genre");
    assert_eq!(fields[0].field_type, "categorical");
}

#[test]
fn debug_query_prefixes_groupings() {
    let ex = presidio();
    let engine = engine(&ex);
    let Response::Debug(text) = engine
        .run(&json!({"search_limits": {"word": ["dog"]}, "method": "debug_query"}))
        .expect("run")
    else {
        panic!("expected debug response");
    };
    assert!(text.starts_with("[\"year\"]SELECT year, IFNULL(numerator.WordCount,0) as WordCount FROM"));
}

#[test]
fn nothing_method_does_not_execute() {
    let ex = presidio();
    let engine = engine(&ex);
    let before = ex.executed().len();
    assert_eq!(
        engine.run(&json!({"search_limits": {"genre": ["fiction"]}})).expect("run"),
        Response::Nothing
    );
    assert_eq!(ex.executed().len(), before);
}

#[test]
fn unknown_method_is_rejected() {
    let ex = presidio();
    let engine = engine(&ex);
    let err = engine.run_json_str(r#"{"method": "drop_everything"}"#).expect_err("method");
    assert!(matches!(err, BwqError::Planning(_)));
}

#[test]
fn split_ratio_guards_zero_denominators() {
    let ex = presidio();
    ex.respond(
        "AND words1.wordid = 2 GROUP BY year",
        rows(
            &["year", "TextCount"],
            vec![
                vec![Value::Int(1900), Value::Int(3)],
                vec![Value::Int(1901), Value::Int(2)],
            ],
        ),
    );
    ex.respond(
        "WHERE genre = 'fiction' AND TRUE GROUP BY year",
        rows(
            &["year", "TextCount"],
            vec![
                vec![Value::Int(1900), Value::Int(0)],
                vec![Value::Int(1901), Value::Int(4)],
            ],
        ),
    );
    let engine = engine(&ex);
    let spec = engine
        .parse(&json!({
            "search_limits": {"word": ["dog"], "genre": ["fiction"]},
            "groups": ["year"],
            "counttype": ["TextPercent"]
        }))
        .expect("parse");
    let rs = engine.run_split(&spec).expect("split");
    assert_eq!(rs.columns, vec!["year", "TextPercent"]);
    assert_eq!(
        rs.rows,
        vec![
            vec![Value::Int(1900), Value::Float(0.0)],
            vec![Value::Int(1901), Value::Float(50.0)],
        ]
    );
}

#[test]
fn has_word_tables_are_shared_across_requests() {
    let ex = presidio();
    let engine = engine(&ex);
    let request = json!({"search_limits": {"hasword": ["cat"]}, "groups": ["year"]});
    let spec = engine.parse(&request).expect("parse");
    let first = engine.compile(&spec).expect("compile");
    let second = engine.compile(&spec).expect("compile");
    assert_eq!(first.sql, second.sql);
    assert_eq!(ex.create_calls(), 1);
    assert_eq!(ex.bulk_insert_calls(), 1);
    assert!(engine.prometheus_metrics().contains("bwq_cache_lookups_total"));
}

#[test]
fn explain_lists_both_sides_of_a_ratio() {
    let ex = presidio();
    let engine = engine(&ex);
    let spec = engine
        .parse(&json!({
            "search_limits": {"word": ["dog"]},
            "counttype": ["WordsPerMillion"]
        }))
        .expect("parse");
    let text = engine.explain(&spec).expect("explain");
    assert!(text.starts_with("Search fact_table=unigrams"));
    assert!(text.contains("  numerator:\n    Counts fact_table=unigrams"));
    assert!(text.contains("  denominator:\n    Counts fact_table=catalog"));
}
