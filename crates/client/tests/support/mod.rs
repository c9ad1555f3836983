#![allow(dead_code)]

use std::sync::Arc;

use bwq_client::Engine;
use bwq_common::CompilerConfig;
use bwq_storage::{MemoryExecutor, ResultSet, Value};

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
    ResultSet::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

/// Executor for a small database: populated memory tables, metadata for
/// `year` and `genre`, and dictionary entries for "dog" (2) and "cat" (3).
pub fn presidio() -> Arc<MemoryExecutor> {
    let ex = MemoryExecutor::new("presidio");
    ex.insert_table("fastcat", &["bookid", "year", "nwords"], vec![vec![
        Value::Int(1),
        Value::Int(1900),
        Value::Int(120),
    ]]);
    ex.insert_table("wordsheap", &["wordid", "word"], vec![vec![Value::Int(2), text("dog")]]);
    ex.respond(
        "FROM masterVariableTable JOIN masterTableTable",
        rows(
            &["dbname", "alias", "tablename", "dependsOn"],
            vec![
                vec![text("year"), text("year"), text("fastcat"), text("fastcat")],
                vec![text("genre"), text("genre"), text("genres"), text("fastcat")],
            ],
        ),
    );
    for (word, id) in [("dog", 2), ("cat", 3)] {
        ex.respond(
            format!("WHERE word = '{word}'"),
            rows(&["wordid"], vec![vec![Value::Int(id)]]),
        );
    }
    Arc::new(ex)
}

pub fn engine(executor: &Arc<MemoryExecutor>) -> Engine {
    Engine::connect(executor.clone(), CompilerConfig::default()).expect("connect")
}
