use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use atlas_core::traits::RowStore;
use atlas_core::types::{IdTuple, Predicate, Projection, RowId, SearchResultItem};
use atlas_core::Result;

/// Turns ordered `(id, distance)` tuples into projected rows with one store
/// round trip.
///
/// Output follows input order. Ids the store does not return (unknown, or
/// rejected by the predicate) are dropped; a repeated id keeps its first
/// position and distance.
pub struct RowJoinResolver {
    store: Arc<dyn RowStore>,
    projection: Projection,
}

impl RowJoinResolver {
    pub fn new(store: Arc<dyn RowStore>, projection: Projection) -> Self { Self { store, projection } }

    pub fn projection(&self) -> &Projection { &self.projection }

    pub async fn resolve(&self, tuples: &[IdTuple], predicate: Option<&Predicate>) -> Result<Vec<SearchResultItem>> {
        let mut order: Vec<(RowId, Option<f64>)> = Vec::with_capacity(tuples.len());
        let mut seen: HashSet<&RowId> = HashSet::with_capacity(tuples.len());
        for t in tuples {
            if seen.insert(&t.id) { order.push((t.id.clone(), t.distance)); }
        }
        if order.is_empty() { return Ok(Vec::new()); }

        let ids: Vec<RowId> = order.iter().map(|(id, _)| id.clone()).collect();
        let rows = self.store.project_rows(&self.projection, &ids, predicate).await?;
        let mut by_id: HashMap<RowId, SearchResultItem> = HashMap::with_capacity(rows.len());
        for row in rows {
            by_id.entry(row.id.clone()).or_insert(row);
        }

        let items: Vec<SearchResultItem> = order
            .into_iter()
            .filter_map(|(id, distance)| {
                by_id.remove(&id).map(|mut item| {
                    item.distance = distance;
                    item
                })
            })
            .collect();
        debug!(requested = ids.len(), joined = items.len(), "row join");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::memory::MemoryRowStore;
    use atlas_core::types::DatasetRef;
    use serde_json::json;

    fn resolver() -> (Arc<MemoryRowStore>, RowJoinResolver) {
        let store = Arc::new(MemoryRowStore::new());
        store.insert_table("t", (1..=5).map(|i| json!({"id": i, "label": format!("row {i}"), "keep": i % 2})));
        let projection = Projection::new(DatasetRef::new("t", "id")).with_text("label");
        (store.clone(), RowJoinResolver::new(store, projection))
    }

    #[tokio::test]
    async fn keeps_input_order_and_first_duplicate() {
        let (store, join) = resolver();
        let tuples = vec![
            IdTuple::new(4, Some(0.1)),
            IdTuple::new(2, Some(0.2)),
            IdTuple::new(4, Some(0.9)),
            IdTuple::new(77, Some(0.3)),
            IdTuple::unscored(1),
        ];
        let items = join.resolve(&tuples, None).await.expect("join");
        let got: Vec<(RowId, Option<f64>)> = items.iter().map(|i| (i.id.clone(), i.distance)).collect();
        assert_eq!(got, vec![(RowId::Int(4), Some(0.1)), (RowId::Int(2), Some(0.2)), (RowId::Int(1), None)]);
        assert_eq!(items[0].text.as_deref(), Some("row 4"));
        assert_eq!(store.round_trips(), 1);
    }

    #[tokio::test]
    async fn predicate_drops_rows() {
        let (_store, join) = resolver();
        let tuples: Vec<IdTuple> = (1..=5).rev().map(IdTuple::unscored).collect();
        let p = Predicate::canonicalize("keep = 1");
        let items = join.resolve(&tuples, p.as_ref()).await.expect("join");
        let ids: Vec<RowId> = items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec![RowId::Int(5), RowId::Int(3), RowId::Int(1)]);
    }

    #[tokio::test]
    async fn empty_input_skips_the_store() {
        let (store, join) = resolver();
        assert!(join.resolve(&[], None).await.expect("join").is_empty());
        assert_eq!(store.round_trips(), 0);
    }
}
