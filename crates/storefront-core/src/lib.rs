//! Storefront core library.
//!
//! Fetches ranked app lists and per-app details from the public catalog,
//! normalizes both response shapes into `AppEntry`, keeps a local copy for
//! offline use, and pages through long id lists in fixed-size batches.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use storefront_core::{CatalogClient, CatalogRepository, EventBus, IncrementalLoader, LocalStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let events = EventBus::default();
//! let store = Arc::new(LocalStore::open("/tmp/storefront")?);
//! let repository = CatalogRepository::new(CatalogClient::new("hk")?, store, events);
//!
//! let free = repository.top_free().await.into_inner();
//! let mut loader = IncrementalLoader::new(10);
//! loader.reset(free.iter().map(|app| app.app_id.clone()).collect());
//! loader.load_more(&repository).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod events;
pub mod loader;
pub mod models;
pub mod repository;

pub use api::{ApiError, CatalogClient, CatalogSource, Reachability, ReachabilityMonitor};
pub use cache::{LocalStore, StoreError};
pub use config::Config;
pub use events::{CatalogEvent, EventBus};
pub use loader::{IncrementalLoader, LoadMore, LoadOutcome, LoadStep};
pub use models::{AppEntry, RankEntry, SourceKind};
pub use repository::{CatalogRepository, Fetched, Origin};
