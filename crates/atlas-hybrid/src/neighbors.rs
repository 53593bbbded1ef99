//! Nearest neighbors read from a column that stores them per row.
//!
//! The column holds `{ "ids": [...], "distances": [...] }`, either as a JSON
//! string or as a struct the store already decoded.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use atlas_core::traits::{NearestNeighbors, RowStore, SearchOptions};
use atlas_core::types::{DatasetRef, IdTuple, RowId};
use atlas_core::Result;

pub struct PrecomputedNeighbors {
    store: Arc<dyn RowStore>,
    dataset: DatasetRef,
    column: String,
}

impl PrecomputedNeighbors {
    pub fn new(store: Arc<dyn RowStore>, dataset: DatasetRef, column: impl Into<String>) -> Self {
        Self { store, dataset, column: column.into() }
    }

    async fn lookup(&self, id: &RowId) -> Result<Option<Value>> {
        let rows = self.store.fetch_rows(&self.dataset, std::slice::from_ref(id), std::slice::from_ref(&self.column), None).await?;
        Ok(rows.into_iter().find(|r| &r.id == id).and_then(|mut r| r.values.remove(&self.column)))
    }
}

/// Zips the stored ids with their distances, skipping `exclude` and null ids,
/// keeping stored order and at most `limit` entries.
pub fn parse_neighbor_column(value: &Value, exclude: &RowId, limit: usize) -> Vec<IdTuple> {
    let decoded;
    let object = match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                decoded = v;
                &decoded
            }
            Err(e) => {
                warn!(error = %e, "neighbor column is not valid JSON");
                return Vec::new();
            }
        },
        other => other,
    };
    let Some(ids) = object.get("ids").and_then(Value::as_array) else { return Vec::new() };
    let distances = object.get("distances").and_then(Value::as_array);
    ids.iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let id = RowId::from_json(raw)?;
            (&id != exclude).then(|| IdTuple::new(id, distances.and_then(|d| d.get(i)).and_then(Value::as_f64)))
        })
        .take(limit)
        .collect()
}

#[async_trait]
impl NearestNeighbors for PrecomputedNeighbors {
    async fn nearest_neighbors(&self, id: &RowId, opts: &SearchOptions) -> Result<Vec<IdTuple>> {
        if opts.limit == 0 { return Ok(Vec::new()); }
        match self.lookup(id).await {
            Ok(Some(value)) => {
                let neighbors = parse_neighbor_column(&value, id, opts.limit);
                debug!(%id, found = neighbors.len(), "precomputed neighbors");
                Ok(neighbors)
            }
            Ok(None) => {
                debug!(%id, column = %self.column, "row has no precomputed neighbors");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(%id, error = %e, "precomputed neighbor lookup failed");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_self_and_null_ids_and_keeps_order() {
        let v = json!({"ids": [42, null, 7, 8], "distances": [0.0, 0.05, 0.1, 0.2]});
        let out = parse_neighbor_column(&v, &RowId::Int(42), 10);
        assert_eq!(out, vec![IdTuple::new(7, Some(0.1)), IdTuple::new(8, Some(0.2))]);
    }

    #[test]
    fn reads_json_strings_and_clamps() {
        let v = json!(r#"{"ids": ["a", "b", "c"], "distances": [0.1]}"#);
        let out = parse_neighbor_column(&v, &RowId::from("z"), 2);
        assert_eq!(out, vec![IdTuple::new("a", Some(0.1)), IdTuple::unscored("b")]);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_neighbor_column(&json!("not json"), &RowId::Int(1), 5).is_empty());
        assert!(parse_neighbor_column(&json!({"distances": [1.0]}), &RowId::Int(1), 5).is_empty());
    }
}
