use bwq_common::{BwqError, Result};
use bwq_storage::ResultSet;
use serde::{Deserialize, Serialize};

/// Books matching a search, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "books", rename_all = "snake_case")]
pub enum BookListing {
    /// The search matched no books.
    Empty,
    Books(Vec<String>),
}

/// One public catalog field, as listed in `masterVariableTable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub description: String,
    pub tablename: String,
    pub dbname: String,
    pub anchor: String,
}

/// Result of running a request through its `method`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "result", rename_all = "snake_case")]
pub enum Response {
    Nothing,
    Tsv(String),
    Books(BookListing),
    Fields(Vec<FieldDescription>),
    Debug(String),
}

impl Response {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BwqError::Execution(e.to_string()))
    }
}

/// Header line plus one tab-separated line per row.
///
/// Tabs inside values are written as `<tab>`; NULL cells are empty.
pub fn render_tsv(rs: &ResultSet) -> String {
    let mut lines = Vec::with_capacity(rs.rows.len() + 1);
    lines.push(rs.columns.join("\t"));
    for row in &rs.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| v.to_string().replace('\t', "<tab>"))
            .collect();
        lines.push(cells.join("\t"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use bwq_storage::{ResultSet, Value};

    use super::{render_tsv, BookListing, Response};

    #[test]
    fn tsv_escapes_embedded_tabs() {
        let rs = ResultSet::new(
            vec!["title".to_string(), "WordCount".to_string()],
            vec![
                vec![Value::Text("a\tb".to_string()), Value::Int(3)],
                vec![Value::Null, Value::Float(1.5)],
            ],
        );
        assert_eq!(render_tsv(&rs), "title\tWordCount\na<tab>b\t3\n\t1.5");
    }

    #[test]
    fn responses_serialize_with_method_tag() {
        let json = Response::Books(BookListing::Empty).to_json().expect("json");
        assert_eq!(json, r#"{"method":"books","result":{"kind":"empty"}}"#);
    }
}
