//! atlas-vector
//!
//! LanceDB-backed row store and vector search. See `store` for the
//! [`atlas_core::traits::RowStore`] implementation used by the row join.
pub mod convert;
pub mod search;
pub mod store;
pub mod table;

pub use search::LanceVectorSearch;
pub use store::LanceRowStore;
