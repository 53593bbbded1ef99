use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// Fetch rejection or non-2xx status from a remote backend.
    #[error("Network failure: {0}")]
    Network(String),

    /// Malformed projection, bad predicate or a store rejecting the query.
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Index worker is no longer running")]
    WorkerClosed,
}

impl Error {
    pub fn query(e: impl std::fmt::Display) -> Self { Self::Query(e.to_string()) }

    pub fn network(e: impl std::fmt::Display) -> Self { Self::Network(e.to_string()) }

    pub fn index_build(e: impl std::fmt::Display) -> Self { Self::IndexBuild(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
