//! Client-side metadata filters applied to fetched neighbors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::types::{value_as_text, Fields};

/// A single column constraint. Serialized with a `type` tag of `"string"`,
/// `"string[]"` or `"number"`.
///
/// A filter without any selected values (or without bounds) places no
/// constraint on the column. Null cells never satisfy a real constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilterSpec {
    #[serde(rename = "string")]
    String { column: String, values: BTreeSet<String> },
    /// Column holds a list; matches when any element is selected.
    #[serde(rename = "string[]")]
    StringList { column: String, values: BTreeSet<String> },
    #[serde(rename = "number")]
    Number {
        column: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

impl FilterSpec {
    pub fn one_of<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::String { column: column.into(), values: values.into_iter().map(Into::into).collect() }
    }

    pub fn any_of<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StringList { column: column.into(), values: values.into_iter().map(Into::into).collect() }
    }

    pub fn range(column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Number { column: column.into(), min, max }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::String { column, .. } | Self::StringList { column, .. } | Self::Number { column, .. } => column,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        match self {
            Self::String { values, .. } | Self::StringList { values, .. } => values.is_empty(),
            Self::Number { min, max, .. } => min.is_none() && max.is_none(),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        if self.is_unconstrained() { return true; }
        match self {
            Self::String { values, .. } => !value.is_null() && values.contains(&value_as_text(value)),
            Self::StringList { values, .. } => match value {
                Value::Array(items) => items.iter().any(|v| !v.is_null() && values.contains(&value_as_text(v))),
                Value::Null => false,
                other => values.contains(&value_as_text(other)),
            },
            Self::Number { min, max, .. } => {
                let Some(v) = as_number(value) else { return false };
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            }
        }
    }

    /// Missing columns count as null.
    pub fn matches_row(&self, fields: &Fields) -> bool {
        self.matches(fields.get(self.column()).unwrap_or(&Value::Null))
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// Columns a filter set needs, deduplicated, in first-use order.
pub fn filter_columns(filters: &[FilterSpec]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for f in filters {
        if !out.iter().any(|c| c == f.column()) { out.push(f.column().to_string()); }
    }
    out
}

pub fn matches_all(filters: &[FilterSpec], fields: &Fields) -> bool {
    filters.iter().all(|f| f.matches_row(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Fields { v.as_object().cloned().unwrap_or_default() }

    #[test]
    fn string_filter_matches_selected_values_only() {
        let f = FilterSpec::one_of("condition", ["eczema"]);
        assert!(f.matches_row(&row(json!({"condition": "eczema"}))));
        assert!(!f.matches_row(&row(json!({"condition": "acne"}))));
        assert!(!f.matches_row(&row(json!({"condition": null}))));
        assert!(!f.matches_row(&row(json!({}))));
    }

    #[test]
    fn list_filter_matches_any_element() {
        let f = FilterSpec::any_of("tags", ["b", "z"]);
        assert!(f.matches(&json!(["a", "b"])));
        assert!(!f.matches(&json!(["a", "c"])));
        assert!(f.matches(&json!("z")));
    }

    #[test]
    fn number_filter_is_inclusive_and_open_ended() {
        let f = FilterSpec::range("age", Some(20.0), Some(40.0));
        assert!(f.matches(&json!(20)));
        assert!(f.matches(&json!(40.0)));
        assert!(!f.matches(&json!(41)));
        assert!(f.matches(&json!("33")));
        assert!(!f.matches(&json!(null)));
        let open = FilterSpec::range("age", None, Some(10.0));
        assert!(open.matches(&json!(-5)));
        assert!(!open.matches(&json!("-inf")));
        assert!(!open.matches(&json!("NaN")));
    }

    #[test]
    fn empty_selection_does_not_constrain() {
        let f = FilterSpec::one_of("condition", Vec::<String>::new());
        assert!(f.matches(&json!(null)));
    }

    #[test]
    fn serde_uses_type_tag() {
        let f: FilterSpec = serde_json::from_value(json!({"type": "string[]", "column": "tags", "values": ["a"]}))
            .expect("deserialize");
        assert_eq!(f, FilterSpec::any_of("tags", ["a"]));
        let n: FilterSpec = serde_json::from_value(json!({"type": "number", "column": "age", "min": 1})).expect("deserialize");
        assert_eq!(n, FilterSpec::range("age", Some(1.0), None));
    }
}
