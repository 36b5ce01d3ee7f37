//! Local persistence for offline access.
//!
//! `LocalStore` keeps catalog entities (partitioned by source kind) and the
//! ranked top-grossing and top-free lists in a single versioned JSON
//! document under the cache directory.

pub mod schema;
pub mod store;

use thiserror::Error;

pub use schema::{CachedData, SCHEMA_VERSION};
pub use store::{LocalStore, TOP_GROSSING_SLOTS};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Incompatible store: {0}")]
    Incompatible(String),
}
