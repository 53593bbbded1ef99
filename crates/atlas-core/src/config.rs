//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` +
//! `ATLAS_*` env vars. Provides helpers to expand `~` and `${VAR}` and to
//! resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{DatasetRef, Projection};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    /// Merges `config.toml`, `config.<env>.toml` and `ATLAS_*` variables found
    /// relative to `dir`. Nested keys use a double underscore in env names,
    /// e.g. `ATLAS_SEARCH__PAGE_SIZE=50`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("ATLAS_").split("__"));

        let config = Self { figment, env_name };
        config.settings()?.validate_for_env(&config.env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment), env_name: "test".to_string() }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn env_name(&self) -> &str { &self.env_name }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub columns: ColumnSettings,
    pub search: SearchSettings,
    pub endpoints: EndpointSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub db_uri: String,
    pub table: String,
}

impl Default for DataSettings {
    fn default() -> Self { Self { db_uri: "~/.atlas/lancedb".to_string(), table: "dataset".to_string() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSettings {
    pub id: String,
    pub x: Option<String>,
    pub y: Option<String>,
    /// Column shown as the result's text.
    pub text: Option<String>,
    /// Columns concatenated into the full-text index.
    pub search_text: Vec<String>,
    /// Column holding precomputed `{ids, distances}` neighbor lists.
    pub neighbors: Option<String>,
    pub vector: Option<String>,
    pub group_by: Option<String>,
    /// Extra columns carried on every result item.
    pub fields: Vec<String>,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            x: Some("x".to_string()),
            y: Some("y".to_string()),
            text: None,
            search_text: Vec::new(),
            neighbors: None,
            vector: None,
            group_by: None,
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    #[default]
    FullText,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub debounce_ms: u64,
    pub page_size: usize,
    /// First limit requested by a text or vector search.
    pub text_limit: usize,
    /// Neighbors wanted for a row or upload lookup.
    pub neighbor_k: usize,
    /// Largest limit "load more" may request from a paged backend.
    pub paged_ceiling: usize,
    /// Largest K the filter backfill may request.
    pub backfill_ceiling: usize,
    pub text_mode: TextMode,
    pub unknown_group_label: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            page_size: 20,
            text_limit: 100,
            neighbor_k: 16,
            paged_ceiling: 500,
            backfill_ceiling: 5000,
            text_mode: TextMode::FullText,
            unknown_group_label: "unknown".to_string(),
        }
    }
}

impl SearchSettings {
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EndpointSettings {
    /// GET endpoint answering `?id=&k=` with a neighbor list.
    pub neighbors: Option<String>,
    /// POST endpoint accepting an uploaded file.
    pub upload: Option<String>,
}

impl Settings {
    pub fn validate_for_env(&self, env: &str) -> Result<()> {
        let s = &self.search;
        if s.page_size == 0 { return Err(Error::InvalidConfig("search.page_size must be > 0".into())); }
        if s.text_limit == 0 || s.neighbor_k == 0 { return Err(Error::InvalidConfig("search limits must be > 0".into())); }
        if s.paged_ceiling < s.text_limit {
            return Err(Error::InvalidConfig(format!("search.paged_ceiling ({}) is below search.text_limit ({})", s.paged_ceiling, s.text_limit)));
        }
        if s.backfill_ceiling < s.neighbor_k {
            return Err(Error::InvalidConfig(format!("search.backfill_ceiling ({}) is below search.neighbor_k ({})", s.backfill_ceiling, s.neighbor_k)));
        }
        if self.columns.id.trim().is_empty() { return Err(Error::InvalidConfig("columns.id is empty".into())); }
        if matches!(env, "prod" | "production") && s.debounce_ms < 100 {
            return Err(Error::InvalidConfig(format!("search.debounce_ms {} is too low for production", s.debounce_ms)));
        }
        Ok(())
    }

    pub fn dataset(&self) -> DatasetRef { DatasetRef::new(&self.data.table, &self.columns.id) }

    /// Projection used by the row join for every result item.
    pub fn projection(&self) -> Projection {
        let mut projection = Projection::new(self.dataset());
        if let (Some(x), Some(y)) = (&self.columns.x, &self.columns.y) { projection = projection.with_coordinates(x, y); }
        if let Some(text) = &self.columns.text { projection = projection.with_text(text); }
        let mut extra: Vec<&String> = self.columns.fields.iter().collect();
        if let Some(g) = &self.columns.group_by { extra.push(g); }
        for column in extra {
            if !projection.fields.iter().any(|f| &f.name == column) { projection = projection.with_column(column); }
        }
        projection
    }

    pub fn db_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.data.db_uri) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
