pub mod config;
pub mod embed;
pub mod error;
pub mod filter;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
