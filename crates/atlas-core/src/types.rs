//! Domain types shared by the search backends, the row stores and the
//! orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Projected column values of one row, keyed by output name.
pub type Fields = serde_json::Map<String, Value>;

/// Identifier of a dataset row. Datasets key rows either by an integer
/// column or by a string column; both travel through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    /// Reads an id out of a JSON scalar. Integral floats (`7.0`) are accepted
    /// because some stores widen integer columns.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() { return Some(Self::Int(i)); }
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f.abs() >= 9.0e15 { return None; }
                #[allow(clippy::cast_possible_truncation)]
                let i = f as i64;
                Some(Self::Int(i))
            }
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// SQL literal usable inside an `IN (...)` list.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self { Self::Int(value) }
}

impl From<i32> for RowId {
    fn from(value: i32) -> Self { Self::Int(i64::from(value)) }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self { Self::Text(value.to_string()) }
}

impl From<String> for RowId {
    fn from(value: String) -> Self { Self::Text(value) }
}

/// Raw backend output: a row id and an optional distance.
///
/// A distance is always finite and non-negative; anything else coming from a
/// backend is treated as "unscored".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTuple {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl IdTuple {
    pub fn new(id: impl Into<RowId>, distance: Option<f64>) -> Self {
        Self { id: id.into(), distance: distance.filter(|d| d.is_finite() && *d >= 0.0) }
    }

    pub fn unscored(id: impl Into<RowId>) -> Self { Self { id: id.into(), distance: None } }
}

/// Canonical form of the active row filter. `None` at use sites means
/// "unfiltered".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate(String);

impl Predicate {
    /// Trims the filter and collapses whitespace runs outside single-quoted
    /// literals, so two spellings of the same filter share one index snapshot.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        let mut out = String::with_capacity(raw.len());
        let mut in_quote = false;
        let mut pending_space = false;
        for ch in raw.trim().chars() {
            if in_quote {
                out.push(ch);
                if ch == '\'' { in_quote = false; }
                continue;
            }
            if ch.is_whitespace() { pending_space = true; continue; }
            if pending_space { out.push(' '); pending_space = false; }
            if ch == '\'' { in_quote = true; }
            out.push(ch);
        }
        if out.is_empty() { None } else { Some(Self(out)) }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Table holding the dataset plus the column that identifies its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub table: String,
    pub id_column: String,
}

impl DatasetRef {
    pub fn new(table: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self { table: table.into(), id_column: id_column.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Column(String),
    /// SQL expression evaluated by the store, e.g. `age / 10`.
    Expression(String),
}

impl FieldSource {
    pub fn sql(&self) -> &str {
        match self {
            Self::Column(c) | Self::Expression(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedField {
    pub name: String,
    pub source: FieldSource,
}

/// What the row join selects for every matched row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub dataset: DatasetRef,
    pub x: Option<String>,
    pub y: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub fields: Vec<ProjectedField>,
}

impl Projection {
    pub fn new(dataset: DatasetRef) -> Self {
        Self { dataset, x: None, y: None, text: None, fields: Vec::new() }
    }

    pub fn with_coordinates(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x = Some(x.into());
        self.y = Some(y.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.push(ProjectedField { source: FieldSource::Column(name.clone()), name });
        self
    }

    pub fn with_expression(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.fields.push(ProjectedField { name: name.into(), source: FieldSource::Expression(sql.into()) });
        self
    }
}

/// A row as returned by a store scan or point lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RowId,
    pub values: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: RowId,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
}

impl SearchResultItem {
    pub fn new(id: RowId) -> Self {
        Self { id, fields: Fields::new(), distance: None, x: None, y: None, text: None, group_key: None }
    }

    /// Both coordinates, when present and finite.
    pub fn point(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point { x, y }),
            _ => None,
        }
    }
}

/// One committed result list. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultSet {
    pub label: String,
    pub highlight: Option<String>,
    pub items: Vec<SearchResultItem>,
    /// Projected position of an uploaded query, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_point: Option<Point>,
}

impl SearchResultSet {
    pub fn empty(label: impl Into<String>) -> Self {
        Self { label: label.into(), highlight: None, items: Vec::new(), query_point: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub key: String,
    pub label: String,
    pub representative: SearchResultItem,
    pub items: Vec<SearchResultItem>,
    pub count: usize,
    /// Smallest finite distance in the group, `f64::INFINITY` when none.
    pub distance: f64,
}

/// Text form of a scalar for indexing and grouping; null becomes empty.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Null-safe cast of each value to text, joined with a single space.
pub fn coerce_text<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values.into_iter().map(value_as_text).collect::<Vec<_>>().join(" ")
}
