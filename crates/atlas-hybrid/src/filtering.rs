//! Client-side metadata filters over backend candidates.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use atlas_core::filter::{filter_columns, matches_all, FilterSpec};
use atlas_core::traits::RowStore;
use atlas_core::types::{DatasetRef, Fields, IdTuple, RowId};
use atlas_core::Result;

/// Filters that actually constrain something.
pub fn active_filters(filters: &[FilterSpec]) -> Vec<FilterSpec> {
    filters.iter().filter(|f| !f.is_unconstrained()).cloned().collect()
}

/// Keeps the tuples whose row satisfies every filter, in their original
/// order. Field values for all candidates are read in one lookup; a
/// candidate the store does not know is dropped.
pub async fn apply_filters(
    store: &Arc<dyn RowStore>,
    dataset: &DatasetRef,
    tuples: Vec<IdTuple>,
    filters: &[FilterSpec],
) -> Result<Vec<IdTuple>> {
    if filters.is_empty() || tuples.is_empty() { return Ok(tuples); }
    let ids: Vec<RowId> = tuples.iter().map(|t| t.id.clone()).collect();
    let rows = store.fetch_rows(dataset, &ids, &filter_columns(filters), None).await?;
    let values: HashMap<RowId, Fields> = rows.into_iter().map(|r| (r.id, r.values)).collect();
    let before = tuples.len();
    let kept: Vec<IdTuple> = tuples
        .into_iter()
        .filter(|t| values.get(&t.id).is_some_and(|v| matches_all(filters, v)))
        .collect();
    debug!(before, after = kept.len(), filters = filters.len(), "metadata filters applied");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::memory::MemoryRowStore;
    use serde_json::json;

    #[tokio::test]
    async fn keeps_rows_matching_every_filter_in_order() {
        let memory = Arc::new(MemoryRowStore::new());
        memory.insert_table(
            "cases",
            vec![
                json!({"id": 1, "condition": "eczema", "age": 35}),
                json!({"id": 2, "condition": "eczema", "age": 55}),
                json!({"id": 3, "condition": "acne", "age": 25}),
                json!({"id": 4, "condition": "eczema", "age": 20}),
                json!({"id": 5, "condition": null, "age": 30}),
            ],
        );
        let store: Arc<dyn RowStore> = memory.clone();
        let filters = vec![FilterSpec::one_of("condition", ["eczema"]), FilterSpec::range("age", Some(20.0), Some(40.0))];
        let tuples: Vec<IdTuple> = [5, 4, 3, 2, 1].into_iter().map(|i| IdTuple::new(i, Some(f64::from(i) / 10.0))).collect();

        let kept = apply_filters(&store, &DatasetRef::new("cases", "id"), tuples, &filters).await.expect("filter");
        assert_eq!(kept, vec![IdTuple::new(4, Some(0.4)), IdTuple::new(1, Some(0.1))]);
        assert_eq!(memory.round_trips(), 1);
    }

    #[test]
    fn unconstrained_filters_are_inactive() {
        let filters = vec![FilterSpec::one_of("condition", Vec::<String>::new()), FilterSpec::range("age", None, Some(3.0))];
        assert_eq!(active_filters(&filters), vec![FilterSpec::range("age", None, Some(3.0))]);
    }
}
