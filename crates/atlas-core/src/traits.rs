use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{DatasetRef, IdTuple, Predicate, Projection, RowId, SearchResultItem, StoredRow};

/// Receives transient status text from a backend: `Some` sets, `None` clears.
pub type StatusSink = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Options shared by every capability call.
#[derive(Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub predicate: Option<Predicate>,
    pub status: Option<StatusSink>,
}

impl SearchOptions {
    pub fn new(limit: usize) -> Self { Self { limit, predicate: None, status: None } }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_status(mut self, status: StatusSink) -> Self {
        self.status = Some(status);
        self
    }

    pub fn report_status(&self, text: Option<&str>) {
        if let Some(sink) = &self.status { sink(text.map(str::to_string)); }
    }
}

impl fmt::Debug for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOptions")
            .field("limit", &self.limit)
            .field("predicate", &self.predicate)
            .field("status", &self.status.is_some())
            .finish()
    }
}

#[async_trait]
pub trait FullTextSearch: Send + Sync {
    async fn full_text_search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<IdTuple>>;
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn vector_search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<IdTuple>>;
}

#[async_trait]
pub trait NearestNeighbors: Send + Sync {
    /// Neighbors of an existing row, closest first. The row itself is never
    /// part of the answer.
    async fn nearest_neighbors(&self, id: &RowId, opts: &SearchOptions) -> Result<Vec<IdTuple>>;
}

/// Which similarity operations are available for the current configuration.
/// Built once per configuration and never mutated afterwards.
#[derive(Clone, Default)]
pub struct SearchCapabilities {
    pub full_text: Option<Arc<dyn FullTextSearch>>,
    pub vector: Option<Arc<dyn VectorSearch>>,
    pub neighbors: Option<Arc<dyn NearestNeighbors>>,
}

impl SearchCapabilities {
    pub fn is_empty(&self) -> bool {
        self.full_text.is_none() && self.vector.is_none() && self.neighbors.is_none()
    }
}

impl fmt::Debug for SearchCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchCapabilities")
            .field("full_text", &self.full_text.is_some())
            .field("vector", &self.vector.is_some())
            .field("neighbors", &self.neighbors.is_some())
            .finish()
    }
}

/// The live relational store the engine joins against.
///
/// Every method is a single round trip to the store.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows matching `predicate` (every row when `None`), with `columns`.
    async fn scan_rows(&self, dataset: &DatasetRef, columns: &[String], predicate: Option<&Predicate>) -> Result<Vec<StoredRow>>;

    /// Rows whose id is in `ids` and that match `predicate`, in store order.
    async fn fetch_rows(
        &self,
        dataset: &DatasetRef,
        ids: &[RowId],
        columns: &[String],
        predicate: Option<&Predicate>,
    ) -> Result<Vec<StoredRow>>;

    /// Evaluates `projection` for rows with `id IN ids AND predicate`, in store
    /// order and without distances.
    async fn project_rows(&self, projection: &Projection, ids: &[RowId], predicate: Option<&Predicate>) -> Result<Vec<SearchResultItem>>;
}

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
