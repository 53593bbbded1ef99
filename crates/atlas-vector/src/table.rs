//! LanceDB connection and table helpers.
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator};
use arrow_schema::DataType;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};

use atlas_core::traits::Embedder;
use atlas_core::{Error, Result};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::query)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(Error::query)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    if !table_exists(conn, name).await? { return Err(Error::NotFound(format!("table '{name}'"))); }
    conn.open_table(name).execute().await.map_err(Error::query)
}

/// Width of a fixed-size-list vector column.
pub async fn vector_dimension(table: &Table, column: &str) -> Result<usize> {
    let schema = table.schema().await.map_err(Error::query)?;
    let field = schema.field_with_name(column).map_err(|_| Error::NotFound(format!("vector column '{column}'")))?;
    match field.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).map_err(|_| Error::InvalidConfig(format!("column '{column}' has width {n}"))),
        other => Err(Error::InvalidConfig(format!("column '{column}' is {other}, not a vector"))),
    }
}

/// Creates `name` from one batch, or appends to it when it already exists.
pub async fn write_batch(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    if table_exists(conn, name).await? {
        conn.open_table(name).execute().await.map_err(Error::query)?.add(reader).execute().await.map_err(Error::query)?;
    } else {
        conn.create_table(name, reader).execute().await.map_err(Error::query)?;
    }
    Ok(())
}

/// Runs a plain (non-vector) query and collects every batch.
pub async fn collect(table: &Table, filter: Option<String>, select: Select, limit: usize) -> Result<Vec<RecordBatch>> {
    if limit == 0 { return Ok(Vec::new()); }
    let mut query = table.query().select(select).limit(limit);
    if let Some(f) = filter { query = query.only_if(f); }
    let stream = query.execute().await.map_err(Error::query)?;
    stream.try_collect::<Vec<_>>().await.map_err(Error::query)
}

/// Embeds `texts` into a vector column ready for a record batch.
pub fn embed_column(embedder: &dyn Embedder, texts: &[String]) -> Result<FixedSizeListArray> {
    let dim = i32::try_from(embedder.dim()).map_err(|_| Error::InvalidConfig("embedding dimension too large".into()))?;
    let vectors = embedder.embed_batch(texts)?;
    if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dim()) {
        return Err(Error::Operation(format!("embedder returned {} values, expected {}", v.len(), embedder.dim())));
    }
    let values = vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>()));
    Ok(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(values, dim))
}
