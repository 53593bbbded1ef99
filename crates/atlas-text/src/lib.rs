//! atlas-text
//!
//! In-memory tantivy index over the rows matching the active filter. The
//! index lives on a dedicated worker thread; [`TextIndexManager`] decides
//! when to rebuild it and implements [`atlas_core::traits::FullTextSearch`].
pub mod manager;
pub mod tantivy_utils;
pub mod worker;

pub use manager::TextIndexManager;
