//! Remote catalog access.
//!
//! - `CatalogClient`: HTTPS client for the ranked feeds and batch lookup
//! - `CatalogSource`: the fetch seam the repository is written against
//! - `ReachabilityMonitor`: background watch on the catalog host
//!
//! The catalog needs no authentication.

pub mod client;
pub mod error;
pub mod reachability;
pub mod source;

pub use client::{CatalogClient, Ranking, CATALOG_HOST, DEFAULT_REGION};
pub use error::ApiError;
pub use reachability::{Reachability, ReachabilityMonitor};
pub use source::CatalogSource;
