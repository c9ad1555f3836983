use std::fmt;

use bwq_common::{BwqError, CompilerConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::predicate::validate_field_name;
use crate::statistics::CountType;

/// Literal compared against a field. Only strings and numbers are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn from_json(field: &str, v: &Value) -> Result<Self> {
        match v {
            Value::String(s) => Ok(Scalar::Str(s.clone())),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Scalar::Int(i)),
                (None, Some(f)) => Ok(Scalar::Float(f)),
                _ => Err(BwqError::InvalidConfig(format!(
                    "{field}: number {n} is out of range"
                ))),
            },
            other => Err(BwqError::InvalidConfig(format!(
                "{field}: only string and numeric values are allowed, got {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
}

impl CompareOp {
    /// Operator from its request spelling (`$gt`, `$ne`, `$grep`, ...).
    pub fn from_operator(key: &str) -> Result<Self> {
        Ok(match key {
            "$eq" => CompareOp::Eq,
            "$ne" => CompareOp::Ne,
            "$gt" => CompareOp::Gt,
            "$gte" => CompareOp::Gte,
            "$lt" => CompareOp::Lt,
            "$lte" => CompareOp::Lte,
            "$grep" | "$regex" => CompareOp::Regex,
            other => {
                return Err(BwqError::Planning(format!(
                    "unknown comparison operator: {other}"
                )))
            }
        })
    }

    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Regex => "REGEXP",
        }
    }

    /// How several values for one field combine: a row must differ from every
    /// `$ne` value, and may match any value of the other operators.
    pub fn value_joiner(self) -> &'static str {
        match self {
            CompareOp::Ne => " AND ",
            _ => " OR ",
        }
    }
}

/// Filter tree over catalog fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintNode {
    /// `field` equals any of `values`.
    Leaf { field: String, values: Vec<Scalar> },
    Comparison {
        field: String,
        op: CompareOp,
        values: Vec<Scalar>,
    },
    And(Vec<ConstraintNode>),
    Or(Vec<ConstraintNode>),
}

impl ConstraintNode {
    pub fn unconstrained() -> Self {
        ConstraintNode::And(vec![])
    }

    pub fn leaf(field: impl Into<String>, values: Vec<Scalar>) -> Self {
        ConstraintNode::Leaf {
            field: field.into(),
            values,
        }
    }

    /// Parse a `search_limits` object.
    ///
    /// Keys are field names or `$and`/`$or`. A field maps to a scalar, a list of
    /// scalars, an operator object (`{"$gte": 1900}`) or a list of operator
    /// objects. Empty value lists are dropped.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(parse_object(map)?.prune()),
            Value::Array(items) => match items.first() {
                Some(first) => Self::parse(first),
                None => Ok(Self::unconstrained()),
            },
            Value::Null => Ok(Self::unconstrained()),
            other => Err(BwqError::InvalidConfig(format!(
                "search_limits must be an object, got {other}"
            ))),
        }
    }

    /// Every field referenced anywhere in the tree, in tree order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ConstraintNode::Leaf { field, .. } | ConstraintNode::Comparison { field, .. } => {
                out.push(field)
            }
            ConstraintNode::And(children) | ConstraintNode::Or(children) => {
                for c in children {
                    c.collect_fields(out);
                }
            }
        }
    }

    /// The one field this subtree constrains, if it constrains exactly one.
    pub fn owning_field(&self) -> Option<&str> {
        let fields = self.fields();
        let first = *fields.first()?;
        fields.iter().all(|f| *f == first).then_some(first)
    }

    /// True when the tree holds no leaves at all.
    pub fn is_unconstrained(&self) -> bool {
        self.fields().is_empty()
    }

    /// Children of a top-level conjunction, or the node itself.
    pub fn top_level(&self) -> &[ConstraintNode] {
        match self {
            ConstraintNode::And(children) => children,
            other => std::slice::from_ref(other),
        }
    }

    /// Drop leaves without values. An `Or` with an unconstrained branch is
    /// itself unconstrained.
    pub fn prune(self) -> Self {
        match self {
            ConstraintNode::Leaf { ref values, .. }
            | ConstraintNode::Comparison { ref values, .. }
                if values.is_empty() =>
            {
                Self::unconstrained()
            }
            ConstraintNode::And(children) => ConstraintNode::And(
                children
                    .into_iter()
                    .map(Self::prune)
                    .filter(|c| !c.is_unconstrained())
                    .collect(),
            ),
            ConstraintNode::Or(children) => {
                let children: Vec<_> = children.into_iter().map(Self::prune).collect();
                if children.is_empty() || children.iter().any(Self::is_unconstrained) {
                    Self::unconstrained()
                } else {
                    ConstraintNode::Or(children)
                }
            }
            leaf => leaf,
        }
    }

    /// Rename every field with `f`.
    pub fn map_fields(self, f: &impl Fn(&str) -> String) -> Self {
        match self {
            ConstraintNode::Leaf { field, values } => ConstraintNode::Leaf {
                field: f(&field),
                values,
            },
            ConstraintNode::Comparison { field, op, values } => ConstraintNode::Comparison {
                field: f(&field),
                op,
                values,
            },
            ConstraintNode::And(children) => {
                ConstraintNode::And(children.into_iter().map(|c| c.map_fields(f)).collect())
            }
            ConstraintNode::Or(children) => {
                ConstraintNode::Or(children.into_iter().map(|c| c.map_fields(f)).collect())
            }
        }
    }
}

fn parse_object(map: &Map<String, Value>) -> Result<ConstraintNode> {
    let mut children = Vec::with_capacity(map.len());
    for (key, value) in map {
        validate_field_name(key)?;
        let node = match key.as_str() {
            "$or" | "$OR" => ConstraintNode::Or(parse_branches(key, value)?),
            "$and" | "$AND" => ConstraintNode::And(parse_branches(key, value)?),
            op if op.starts_with('$') => {
                return Err(BwqError::Planning(format!(
                    "operator {op} must be nested under a field"
                )))
            }
            field => parse_field(field, value)?,
        };
        children.push(node);
    }
    Ok(ConstraintNode::And(children))
}

fn parse_branches(key: &str, value: &Value) -> Result<Vec<ConstraintNode>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => parse_object(map),
                other => Err(BwqError::InvalidConfig(format!(
                    "{key} branches must be objects, got {other}"
                ))),
            })
            .collect(),
        Value::Object(map) => Ok(vec![parse_object(map)?]),
        other => Err(BwqError::InvalidConfig(format!(
            "{key} expects a list of objects, got {other}"
        ))),
    }
}

fn parse_field(field: &str, value: &Value) -> Result<ConstraintNode> {
    match value {
        Value::Object(ops) => parse_operators(field, ops),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            let nodes = items
                .iter()
                .filter_map(Value::as_object)
                .map(|ops| parse_operators(field, ops))
                .collect::<Result<Vec<_>>>()?;
            Ok(ConstraintNode::And(nodes))
        }
        other => Ok(ConstraintNode::Leaf {
            field: field.to_string(),
            values: scalar_list(field, other)?,
        }),
    }
}

fn parse_operators(field: &str, ops: &Map<String, Value>) -> Result<ConstraintNode> {
    let mut nodes = Vec::with_capacity(ops.len());
    for (op, v) in ops {
        nodes.push(ConstraintNode::Comparison {
            field: field.to_string(),
            op: CompareOp::from_operator(op)?,
            values: scalar_list(field, v)?,
        });
    }
    Ok(match nodes.len() {
        1 => nodes.remove(0),
        _ => ConstraintNode::And(nodes),
    })
}

fn scalar_list(field: &str, v: &Value) -> Result<Vec<Scalar>> {
    match v {
        Value::Array(items) => items.iter().map(|i| Scalar::from_json(field, i)).collect(),
        single => Ok(vec![Scalar::from_json(field, single)?]),
    }
}

/// Dictionary column and normalization used for word lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collation {
    CaseInsensitive,
    CaseSensitive,
    Lowercase,
    Stem,
}

impl Collation {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Case_Insensitive" | "case_insensitive" => Collation::CaseInsensitive,
            "Case_Sensitive" | "casesens" => Collation::CaseSensitive,
            "lowercase" => Collation::Lowercase,
            "All_Words_with_Same_Stem" | "stem" => Collation::Stem,
            other => {
                return Err(BwqError::Planning(format!(
                    "unknown words_collation: {other}"
                )))
            }
        })
    }

    /// Dictionary column holding the surface form for this collation.
    pub fn column(self) -> &'static str {
        match self {
            Collation::CaseInsensitive => "word",
            Collation::CaseSensitive => "casesens",
            Collation::Lowercase => "lowercase",
            Collation::Stem => "stem",
        }
    }
}

/// Output mode requested alongside a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Nothing,
    ReturnTsv,
    SearchResults,
    ReturnBooks,
    ReturnPossibleFields,
    DebugQuery,
}

impl Method {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Nothing" => Method::Nothing,
            "return_tsv" => Method::ReturnTsv,
            "search_results" => Method::SearchResults,
            "return_books" => Method::ReturnBooks,
            "returnPossibleFields" => Method::ReturnPossibleFields,
            "debug_query" => Method::DebugQuery,
            other => return Err(BwqError::Planning(format!("unknown method: {other}"))),
        })
    }
}

/// Ordering of book listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Highest per-word density first.
    Relevance,
    Random,
}

/// One parsed search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub limits: ConstraintNode,
    /// Explicit denominator constraints for ratio statistics.
    pub compare_limits: Option<ConstraintNode>,
    pub groups: Vec<String>,
    pub counttypes: Vec<CountType>,
    pub collation: Collation,
    pub time_measure: String,
    pub method: Method,
    pub ordertype: OrderType,
    pub database: Option<String>,
}

impl Default for SearchSpec {
    fn default() -> Self {
        Self {
            limits: ConstraintNode::unconstrained(),
            compare_limits: None,
            groups: vec![],
            counttypes: vec![CountType::WordCount],
            collation: Collation::CaseInsensitive,
            time_measure: "year".to_string(),
            method: Method::Nothing,
            ordertype: OrderType::Relevance,
            database: None,
        }
    }
}

impl SearchSpec {
    pub fn from_json_str(s: &str, config: &CompilerConfig) -> Result<Self> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| BwqError::InvalidConfig(e.to_string()))?;
        Self::from_json(&value, config)
    }

    /// Parse a request object, applying the documented defaults.
    pub fn from_json(value: &Value, config: &CompilerConfig) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            BwqError::InvalidConfig("search request must be a JSON object".to_string())
        })?;

        let time_measure = match obj.get("time_measure") {
            Some(v) => string_field("time_measure", v)?,
            None => config.default_time_measure.clone(),
        };
        validate_field_name(&time_measure)?;

        let mut limits = match obj.get("search_limits") {
            Some(v) => ConstraintNode::parse(v)?,
            None => ConstraintNode::unconstrained(),
        };
        if let Some(range) = obj.get("time_limits") {
            limits = with_time_range(limits, &time_measure, range)?;
        }

        let compare_limits = obj
            .get("compare_limits")
            .map(ConstraintNode::parse)
            .transpose()?;

        let groups = match obj.get("groups") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|g| string_field("groups", g))
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Null) | None => vec![time_measure.clone()],
            Some(other) => vec![string_field("groups", other)?],
        };
        for g in &groups {
            validate_field_name(g)?;
        }

        let mut counttypes: Vec<CountType> = vec![];
        let names = match obj.get("counttype") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|c| string_field("counttype", c))
                .collect::<Result<Vec<_>>>()?,
            Some(v) => vec![string_field("counttype", v)?],
            None => vec!["WordCount".to_string()],
        };
        for name in names {
            let ct = CountType::from_name(&name)?;
            if !counttypes.contains(&ct) {
                counttypes.push(ct);
            }
        }
        if counttypes.is_empty() {
            counttypes.push(CountType::WordCount);
        }

        let collation = match obj.get("words_collation") {
            Some(v) => Collation::from_name(&string_field("words_collation", v)?)?,
            None => Collation::CaseInsensitive,
        };
        let method = match obj.get("method") {
            Some(v) => Method::from_name(&string_field("method", v)?)?,
            None => Method::Nothing,
        };
        let ordertype = match obj.get("ordertype").and_then(Value::as_str) {
            Some("random") => OrderType::Random,
            _ => OrderType::Relevance,
        };
        let database = obj
            .get("database")
            .map(|v| string_field("database", v))
            .transpose()?;

        Ok(Self {
            limits,
            compare_limits,
            groups,
            counttypes,
            collation,
            time_measure,
            method,
            ordertype,
            database,
        })
    }

    /// The request as the numerator sees it: `*` comparison markers removed.
    pub fn numerator(&self) -> Self {
        Self {
            limits: self.limits.clone().map_fields(&unstar),
            compare_limits: None,
            ..self.clone()
        }
    }

    /// The relaxed request whose counts divide the numerator's.
    ///
    /// In order of preference: explicit `compare_limits`; the limits minus
    /// `*`-marked keys; the limits minus word keys; the limits minus their
    /// first key. Groups are kept so both sides share grouping columns.
    pub fn denominator(&self) -> Self {
        let limits = match &self.compare_limits {
            Some(explicit) => explicit.clone(),
            None => {
                let top = self.limits.top_level();
                let starred = |n: &ConstraintNode| n.owning_field().is_some_and(|f| f.contains('*'));
                let wordish = |n: &ConstraintNode| n.owning_field().is_some_and(is_comparison_word_key);
                let kept: Vec<ConstraintNode> = if top.iter().any(starred) {
                    top.iter().filter(|n| !starred(n)).cloned().collect()
                } else if top.iter().any(wordish) {
                    top.iter().filter(|n| !wordish(n)).cloned().collect()
                } else {
                    top.iter().skip(1).cloned().collect()
                };
                ConstraintNode::And(kept)
            }
        };
        Self {
            limits: limits.map_fields(&unstar),
            compare_limits: None,
            ..self.clone()
        }
    }
}

fn unstar(field: &str) -> String {
    field.replace('*', "")
}

/// Keys dropped from the denominator when nothing else marks them.
fn is_comparison_word_key(field: &str) -> bool {
    field.starts_with("word") || field.ends_with("gram")
}

fn with_time_range(limits: ConstraintNode, measure: &str, range: &Value) -> Result<ConstraintNode> {
    let bounds = match range {
        Value::Array(items) if items.len() == 2 => items
            .iter()
            .map(|v| Scalar::from_json("time_limits", v))
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(BwqError::InvalidConfig(format!(
                "time_limits must be a [low, high] pair, got {other}"
            )))
        }
    };
    if bounds.iter().any(|b| matches!(b, Scalar::Str(_))) {
        return Err(BwqError::InvalidConfig(
            "time_limits must be numeric".to_string(),
        ));
    }
    let mut children = match limits {
        ConstraintNode::And(children) => children,
        other => vec![other],
    };
    children.push(ConstraintNode::Comparison {
        field: measure.to_string(),
        op: CompareOp::Gte,
        values: vec![bounds[0].clone()],
    });
    children.push(ConstraintNode::Comparison {
        field: measure.to_string(),
        op: CompareOp::Lte,
        values: vec![bounds[1].clone()],
    });
    Ok(ConstraintNode::And(children))
}

fn string_field(name: &str, v: &Value) -> Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| BwqError::InvalidConfig(format!("{name} must be a string, got {v}")))
}
