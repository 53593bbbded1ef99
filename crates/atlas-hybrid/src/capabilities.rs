use std::sync::Arc;
use tracing::info;

use atlas_core::config::Settings;
use atlas_core::traits::{NearestNeighbors, RowStore, SearchCapabilities, VectorSearch};
use atlas_core::types::DatasetRef;
use atlas_core::Result;
use atlas_text::TextIndexManager;

use crate::neighbors::PrecomputedNeighbors;
use crate::remote::RemoteNeighbors;

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Builds the [`SearchCapabilities`] record for one dataset configuration.
///
/// An operation supplied through [`with_overrides`](Self::with_overrides)
/// always wins over the built-in one. Built-ins: full-text search when text
/// columns are configured; nearest neighbors from a precomputed column, else
/// from a remote endpoint; vector search when a vector backend is supplied.
pub struct SearchCapabilityResolver {
    store: Arc<dyn RowStore>,
    dataset: DatasetRef,
    text_columns: Vec<String>,
    neighbors_column: Option<String>,
    neighbors_endpoint: Option<String>,
    vector: Option<Arc<dyn VectorSearch>>,
    overrides: SearchCapabilities,
}

impl SearchCapabilityResolver {
    pub fn new(store: Arc<dyn RowStore>, dataset: DatasetRef) -> Self {
        Self {
            store,
            dataset,
            text_columns: Vec::new(),
            neighbors_column: None,
            neighbors_endpoint: None,
            vector: None,
            overrides: SearchCapabilities::default(),
        }
    }

    /// Resolver for the dataset described by `settings`.
    pub fn from_settings(store: Arc<dyn RowStore>, settings: &Settings) -> Self {
        Self::new(store, settings.dataset())
            .with_text_columns(&settings.columns.search_text)
            .with_neighbors_column(settings.columns.neighbors.as_deref())
            .with_neighbors_endpoint(settings.endpoints.neighbors.as_deref())
    }

    pub fn with_text_columns(mut self, columns: &[String]) -> Self {
        self.text_columns.clear();
        for c in columns.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            if !self.text_columns.iter().any(|seen| seen == c) { self.text_columns.push(c.to_string()); }
        }
        self
    }

    pub fn with_neighbors_column(mut self, column: Option<&str>) -> Self {
        self.neighbors_column = non_blank(column);
        self
    }

    pub fn with_neighbors_endpoint(mut self, endpoint: Option<&str>) -> Self {
        self.neighbors_endpoint = non_blank(endpoint);
        self
    }

    pub fn with_vector(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_overrides(mut self, overrides: SearchCapabilities) -> Self {
        self.overrides = overrides;
        self
    }

    fn builtin_neighbors(&self) -> Result<Option<Arc<dyn NearestNeighbors>>> {
        if let Some(column) = &self.neighbors_column {
            return Ok(Some(Arc::new(PrecomputedNeighbors::new(self.store.clone(), self.dataset.clone(), column.clone()))));
        }
        if let Some(endpoint) = &self.neighbors_endpoint {
            return Ok(Some(Arc::new(RemoteNeighbors::new(endpoint)?)));
        }
        Ok(None)
    }

    /// Must run inside a tokio runtime when full-text search gets built.
    pub fn resolve(self) -> Result<SearchCapabilities> {
        let full_text = match self.overrides.full_text.clone() {
            Some(op) => Some(op),
            None if !self.text_columns.is_empty() => {
                let manager = TextIndexManager::new(self.store.clone(), self.dataset.clone(), &self.text_columns)?;
                Some(Arc::new(manager) as _)
            }
            None => None,
        };
        let neighbors = match self.overrides.neighbors.clone() {
            Some(op) => Some(op),
            None => self.builtin_neighbors()?,
        };
        let vector = self.overrides.vector.clone().or_else(|| self.vector.clone());

        let capabilities = SearchCapabilities { full_text, vector, neighbors };
        info!(
            table = %self.dataset.table,
            full_text = capabilities.full_text.is_some(),
            vector = capabilities.vector.is_some(),
            neighbors = capabilities.neighbors.is_some(),
            "search capabilities resolved"
        );
        Ok(capabilities)
    }
}
