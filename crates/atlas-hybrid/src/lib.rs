//! atlas-hybrid
//!
//! Composes the search backends into one capability record and turns their
//! raw `(id, distance)` answers into ordered, filtered, paginated result sets.
pub mod capabilities;
pub mod filtering;
pub mod focus;
pub mod group;
pub mod join;
pub mod neighbors;
pub mod orchestrator;
pub mod pagination;
pub mod remote;

pub use capabilities::SearchCapabilityResolver;
pub use group::NeighborGroupAggregator;
pub use join::RowJoinResolver;
pub use orchestrator::{OrchestratorSettings, SearchOrchestrator, SearchRequest, SearchView, SessionPhase};
pub use remote::{NeighborList, RemoteNeighbors, UploadFile, UploadNeighbors, UploadNeighborsClient};
