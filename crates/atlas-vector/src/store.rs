use arrow_array::RecordBatch;
use async_trait::async_trait;
use lancedb::query::Select;
use lancedb::{Connection, Table};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use atlas_core::traits::RowStore;
use atlas_core::types::{value_as_text, DatasetRef, Fields, Predicate, Projection, RowId, SearchResultItem, StoredRow};
use atlas_core::{Error, Result};

use crate::convert::column_value;
use crate::table::{collect, open_table};

const ID_ALIAS: &str = "__atlas_id";
const X_ALIAS: &str = "__atlas_x";
const Y_ALIAS: &str = "__atlas_y";
const TEXT_ALIAS: &str = "__atlas_text";

/// [`RowStore`] over LanceDB tables. Every method issues one query; filters
/// and projection expressions are evaluated by LanceDB's SQL engine.
pub struct LanceRowStore {
    conn: Connection,
    tables: Mutex<HashMap<String, Table>>,
}

impl LanceRowStore {
    pub fn new(conn: Connection) -> Self { Self { conn, tables: Mutex::new(HashMap::new()) } }

    pub async fn open(uri: &str) -> Result<Self> { Ok(Self::new(crate::table::open_db(uri).await?)) }

    async fn table(&self, name: &str) -> Result<Table> {
        if let Some(t) = self.tables.lock().get(name) { return Ok(t.clone()); }
        let t = open_table(&self.conn, name).await?;
        self.tables.lock().insert(name.to_string(), t.clone());
        Ok(t)
    }
}

fn id_filter(id_column: &str, ids: &[RowId], predicate: Option<&Predicate>) -> String {
    let list = ids.iter().map(RowId::to_sql_literal).collect::<Vec<_>>().join(", ");
    match predicate {
        Some(p) => format!("{id_column} IN ({list}) AND ({p})"),
        None => format!("{id_column} IN ({list})"),
    }
}

fn unique_ids(ids: &[RowId]) -> Vec<RowId> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect()
}

fn stored_rows(batches: &[RecordBatch], id_column: &str, columns: &[String]) -> Vec<StoredRow> {
    let mut out = Vec::new();
    for batch in batches {
        for i in 0..batch.num_rows() {
            let Some(id) = RowId::from_json(&column_value(batch, id_column, i)) else { continue };
            let values: Fields = columns.iter().map(|c| (c.clone(), column_value(batch, c, i))).collect();
            out.push(StoredRow { id, values });
        }
    }
    out
}

fn selected_columns(id_column: &str, columns: &[String]) -> Vec<String> {
    let mut out = vec![id_column.to_string()];
    for c in columns {
        if !out.contains(c) { out.push(c.clone()); }
    }
    out
}

#[async_trait]
impl RowStore for LanceRowStore {
    async fn scan_rows(&self, dataset: &DatasetRef, columns: &[String], predicate: Option<&Predicate>) -> Result<Vec<StoredRow>> {
        let table = self.table(&dataset.table).await?;
        let filter = predicate.map(ToString::to_string);
        let total = table.count_rows(filter.clone()).await.map_err(Error::query)?;
        let batches = collect(&table, filter, Select::columns(selected_columns(&dataset.id_column, columns).as_slice()), total).await?;
        let rows = stored_rows(&batches, &dataset.id_column, columns);
        debug!(table = %dataset.table, rows = rows.len(), "scanned rows");
        Ok(rows)
    }

    async fn fetch_rows(
        &self,
        dataset: &DatasetRef,
        ids: &[RowId],
        columns: &[String],
        predicate: Option<&Predicate>,
    ) -> Result<Vec<StoredRow>> {
        let ids = unique_ids(ids);
        if ids.is_empty() { return Ok(Vec::new()); }
        let table = self.table(&dataset.table).await?;
        let filter = id_filter(&dataset.id_column, &ids, predicate);
        let batches = collect(&table, Some(filter), Select::columns(selected_columns(&dataset.id_column, columns).as_slice()), ids.len()).await?;
        Ok(stored_rows(&batches, &dataset.id_column, columns))
    }

    async fn project_rows(&self, projection: &Projection, ids: &[RowId], predicate: Option<&Predicate>) -> Result<Vec<SearchResultItem>> {
        let ids = unique_ids(ids);
        if ids.is_empty() { return Ok(Vec::new()); }
        let dataset = &projection.dataset;
        let table = self.table(&dataset.table).await?;

        let mut select: Vec<(String, String)> = vec![(ID_ALIAS.to_string(), dataset.id_column.clone())];
        if let Some(x) = &projection.x { select.push((X_ALIAS.to_string(), x.clone())); }
        if let Some(y) = &projection.y { select.push((Y_ALIAS.to_string(), y.clone())); }
        if let Some(text) = &projection.text { select.push((TEXT_ALIAS.to_string(), text.clone())); }
        for f in &projection.fields {
            if select.iter().any(|(alias, _)| alias == &f.name) {
                return Err(Error::Query(format!("projected field '{}' is listed twice", f.name)));
            }
            select.push((f.name.clone(), f.source.sql().to_string()));
        }

        let filter = id_filter(&dataset.id_column, &ids, predicate);
        let batches = collect(&table, Some(filter), Select::dynamic(select.as_slice()), ids.len()).await?;
        let mut items = Vec::new();
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let Some(id) = RowId::from_json(&column_value(batch, ID_ALIAS, i)) else { continue };
                let mut item = SearchResultItem::new(id);
                item.x = column_value(batch, X_ALIAS, i).as_f64();
                item.y = column_value(batch, Y_ALIAS, i).as_f64();
                item.text = match column_value(batch, TEXT_ALIAS, i) {
                    Value::Null => None,
                    v => Some(value_as_text(&v)),
                };
                for f in &projection.fields {
                    item.fields.insert(f.name.clone(), column_value(batch, &f.name, i));
                }
                items.push(item);
            }
        }
        Ok(items)
    }
}
