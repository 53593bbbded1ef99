use std::collections::HashSet;
use std::sync::Arc;

use atlas_core::memory::MemoryRowStore;
use atlas_core::traits::{FullTextSearch, SearchOptions};
use atlas_core::types::{DatasetRef, Predicate, RowId};
use atlas_text::TextIndexManager;
use serde_json::json;

fn clinic_store() -> Arc<MemoryRowStore> {
    let store = MemoryRowStore::new();
    store.insert_table(
        "cases",
        (0..1000).map(|i| {
            let description = if i % 10 == 0 { "red rash on the skin" } else { "mild itching" };
            let region = if i % 20 == 0 { "arm" } else { "leg" };
            let notes = if i == 7 { json!(null) } else { json!(format!("visit {i}")) };
            json!({"id": i, "description": description, "notes": notes, "region": region})
        }),
    );
    Arc::new(store)
}

fn manager(store: Arc<MemoryRowStore>) -> TextIndexManager {
    TextIndexManager::new(store, DatasetRef::new("cases", "id"), &["description".to_string(), "notes".to_string()])
        .expect("manager")
}

fn as_ints(ids: &[RowId]) -> Vec<i64> {
    ids.iter()
        .map(|id| match id {
            RowId::Int(i) => *i,
            RowId::Text(t) => panic!("unexpected text id {t}"),
        })
        .collect()
}

#[tokio::test]
async fn rebuilds_only_when_the_filter_changes() -> anyhow::Result<()> {
    let store = clinic_store();
    let index = manager(store.clone());

    let all = index.query("rash", 1000, None).await?;
    assert_eq!(all.len(), 100);
    assert!(as_ints(&all).iter().all(|i| i % 10 == 0));
    assert_eq!(index.rebuild_count(), 1);

    let arm = Predicate::canonicalize("region = 'arm'");
    let filtered = index.query("rash", 1000, arm.as_ref()).await?;
    assert_eq!(filtered.len(), 50);
    assert!(as_ints(&filtered).iter().all(|i| i % 20 == 0));
    assert_eq!(index.rebuild_count(), 2);

    // same filter, different spelling: no rebuild and no store traffic
    let trips = store.round_trips();
    let respelled = Predicate::canonicalize("  region =   'arm' ");
    let again = index.query("rash", 1000, respelled.as_ref()).await?;
    assert_eq!(again.len(), 50);
    assert_eq!(index.rebuild_count(), 2);
    assert_eq!(store.round_trips(), trips);
    Ok(())
}

#[tokio::test]
async fn null_columns_still_index_the_rest_of_the_row() -> anyhow::Result<()> {
    let index = manager(clinic_store());
    let hits = index.query("itching", 1000, None).await?;
    assert!(as_ints(&hits).contains(&7));
    let visit = index.query("visit", 2000, None).await?;
    assert_eq!(visit.len(), 999);
    Ok(())
}

#[tokio::test]
async fn failed_scan_keeps_the_previous_snapshot() -> anyhow::Result<()> {
    let store = clinic_store();
    let index = manager(store.clone());
    index.build_index_if_needed(None).await?;
    assert_eq!(index.indexed_rows().await, Some(1000));

    let broken = Predicate::canonicalize("region LIKE 'a%'");
    assert!(index.query("rash", 10, broken.as_ref()).await.is_err());
    assert_eq!(index.indexed_rows().await, Some(1000));

    let trips = store.round_trips();
    assert_eq!(index.query("rash", 1000, None).await?.len(), 100);
    assert_eq!(store.round_trips(), trips);
    assert_eq!(index.rebuild_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_see_their_own_filter() -> anyhow::Result<()> {
    let index = Arc::new(manager(clinic_store()));
    let arm = Predicate::canonicalize("region = 'arm'");
    let leg = Predicate::canonicalize("region = 'leg'");

    let mut handles = Vec::new();
    for i in 0..24 {
        let index = index.clone();
        let predicate = if i % 2 == 0 { arm.clone() } else { leg.clone() };
        handles.push(tokio::spawn(async move {
            let opts = SearchOptions::new(1000).with_predicate(predicate.clone());
            let hits = index.full_text_search("rash", &opts).await.expect("search");
            let ids: HashSet<i64> = hits
                .iter()
                .map(|h| match h.id {
                    RowId::Int(i) => i,
                    RowId::Text(_) => -1,
                })
                .collect();
            assert!(hits.iter().all(|h| h.distance.is_none()));
            if predicate.as_ref().is_some_and(|p| p.as_str().contains("arm")) {
                assert_eq!(ids.len(), 50);
                assert!(ids.iter().all(|i| i % 20 == 0));
            } else {
                assert_eq!(ids.len(), 50);
                assert!(ids.iter().all(|i| i % 20 == 10));
            }
        }));
    }
    for h in handles { h.await?; }
    Ok(())
}

#[tokio::test]
async fn requires_a_text_column() {
    let result = TextIndexManager::new(clinic_store(), DatasetRef::new("cases", "id"), &["  ".to_string()]);
    assert!(result.is_err());

    let columns = ["notes", " description", "notes", ""].map(String::from);
    let index = TextIndexManager::new(clinic_store(), DatasetRef::new("cases", "id"), &columns).expect("manager");
    assert_eq!(index.text_columns(), ["notes".to_string(), "description".to_string()]);
}

#[tokio::test]
async fn invalidate_forces_a_rebuild() -> anyhow::Result<()> {
    let store = clinic_store();
    let index = manager(store.clone());
    index.query("rash", 10, None).await?;
    assert_eq!(index.indexed_rows().await, Some(1000));

    index.invalidate().await;
    assert_eq!(index.indexed_rows().await, None);
    let trips = store.round_trips();
    assert_eq!(index.query("rash", 1000, None).await?.len(), 100);
    assert_eq!(index.rebuild_count(), 2);
    assert!(store.round_trips() > trips);
    Ok(())
}
