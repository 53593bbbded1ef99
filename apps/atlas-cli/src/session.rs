//! Wires the configured dataset into a [`SearchOrchestrator`].

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use atlas_core::config::Settings;
use atlas_core::embed::HashingEmbedder;
use atlas_hybrid::{OrchestratorSettings, SearchCapabilityResolver, SearchOrchestrator, UploadNeighborsClient};
use atlas_vector::table::{open_db, open_table, vector_dimension};
use atlas_vector::{LanceRowStore, LanceVectorSearch};

/// Configured session settings, grouped by `group_by` when given.
fn orchestrator_settings(settings: &Settings, group_by: Option<String>) -> OrchestratorSettings {
    let base = OrchestratorSettings::from_settings(settings);
    match group_by {
        Some(column) => base.with_group_by(column),
        None => base,
    }
}

pub async fn open(settings: &Settings, base: &Path, group_by: Option<String>) -> Result<SearchOrchestrator> {
    let uri = settings.db_path(base).to_string_lossy().into_owned();
    info!(%uri, table = %settings.data.table, "opening dataset");
    let store = Arc::new(LanceRowStore::open(&uri).await.with_context(|| format!("opening {uri}"))?);

    let mut resolver = SearchCapabilityResolver::from_settings(store.clone(), settings);
    if let Some(column) = &settings.columns.vector {
        let conn = open_db(&uri).await?;
        let table = open_table(&conn, &settings.data.table).await?;
        let dim = vector_dimension(&table, column).await?;
        let embedder = Arc::new(HashingEmbedder::new(dim)?);
        resolver = resolver.with_vector(Arc::new(LanceVectorSearch::new(table, &settings.columns.id, column, embedder)));
    }
    let capabilities = resolver.resolve()?;

    let orchestrator = SearchOrchestrator::new(store, capabilities, orchestrator_settings(settings, group_by));
    if let Some(endpoint) = &settings.endpoints.upload {
        orchestrator.set_upload(Some(Arc::new(UploadNeighborsClient::new(endpoint)?)));
    }
    Ok(orchestrator)
}
