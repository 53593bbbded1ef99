use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type};
use arrow_array::Array;
use arrow_schema::DataType;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Table;
use std::sync::Arc;
use tracing::debug;

use atlas_core::traits::{Embedder, SearchOptions, VectorSearch};
use atlas_core::types::{IdTuple, RowId};
use atlas_core::{Error, Result};

use crate::convert::column_value;

const DISTANCE_COLUMN: &str = "_distance";

fn distance_at(array: &dyn Array, i: usize) -> Option<f64> {
    if array.is_null(i) { return None; }
    match array.data_type() {
        DataType::Float32 => array.as_primitive_opt::<Float32Type>().map(|a| f64::from(a.value(i))),
        DataType::Float64 => array.as_primitive_opt::<Float64Type>().map(|a| a.value(i)),
        _ => None,
    }
}

/// Embeds the query text and runs an ANN query over a vector column,
/// pre-filtered by the active predicate.
pub struct LanceVectorSearch {
    table: Table,
    id_column: String,
    vector_column: String,
    embedder: Arc<dyn Embedder>,
}

impl LanceVectorSearch {
    pub fn new(table: Table, id_column: impl Into<String>, vector_column: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self { table, id_column: id_column.into(), vector_column: vector_column.into(), embedder }
    }
}

#[async_trait]
impl VectorSearch for LanceVectorSearch {
    async fn vector_search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<IdTuple>> {
        if query.trim().is_empty() || opts.limit == 0 { return Ok(Vec::new()); }
        let embedding = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .pop()
            .ok_or_else(|| Error::Operation("embedder returned no vector".into()))?;

        let mut search = self
            .table
            .vector_search(embedding)
            .map_err(Error::query)?
            .column(&self.vector_column)
            .select(Select::columns(&[self.id_column.as_str()]))
            .limit(opts.limit);
        if let Some(p) = &opts.predicate { search = search.only_if(p.as_str()); }
        let mut stream = search.execute().await.map_err(Error::query)?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::query)? {
            let distances = batch.column_by_name(DISTANCE_COLUMN);
            for i in 0..batch.num_rows() {
                let Some(id) = RowId::from_json(&column_value(&batch, &self.id_column, i)) else { continue };
                hits.push(IdTuple::new(id, distances.and_then(|d| distance_at(d.as_ref(), i))));
            }
        }
        debug!(query, hits = hits.len(), "vector search");
        Ok(hits)
    }
}
