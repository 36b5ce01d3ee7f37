//! Live-then-cache fetching.
//!
//! `CatalogRepository` makes exactly one remote attempt per call. On success
//! the result is written through to the `LocalStore` and returned. On
//! failure the cached copy for the same query is returned instead, and a
//! `ConnectivityLost` event is published when the failure was a connectivity
//! problem. Public operations never fail; the worst case is an empty list.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::client::{DEFAULT_TOP_FREE_LIMIT, DEFAULT_TOP_GROSSING_LIMIT};
use crate::api::{ApiError, CatalogSource};
use crate::cache::LocalStore;
use crate::events::{CatalogEvent, EventBus};
use crate::models::AppEntry;

/// Where a returned result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Remote,
    /// Served from the local store after the remote attempt failed.
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    fn remote(data: T) -> Self {
        Self {
            data,
            origin: Origin::Remote,
        }
    }

    fn cached(data: T) -> Self {
        Self {
            data,
            origin: Origin::Cache,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.origin == Origin::Cache
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

pub struct CatalogRepository<S> {
    source: S,
    store: Arc<LocalStore>,
    events: EventBus,
    top_grossing_limit: usize,
    top_free_limit: usize,
}

impl<S: CatalogSource> CatalogRepository<S> {
    pub fn new(source: S, store: Arc<LocalStore>, events: EventBus) -> Self {
        Self {
            source,
            store,
            events,
            top_grossing_limit: DEFAULT_TOP_GROSSING_LIMIT,
            top_free_limit: DEFAULT_TOP_FREE_LIMIT,
        }
    }

    pub fn with_limits(mut self, top_grossing: usize, top_free: usize) -> Self {
        self.top_grossing_limit = top_grossing;
        self.top_free_limit = top_free;
        self
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn report_failure(&self, operation: &str, err: &ApiError) {
        if err.is_connectivity() {
            warn!(operation, error = %err, "Catalog unreachable, serving cached data");
            self.events.emit(CatalogEvent::ConnectivityLost);
        } else {
            warn!(operation, error = %err, "Catalog fetch failed, serving cached data");
        }
    }

    /// Top-grossing apps in rank order.
    pub async fn top_grossing(&self) -> Fetched<Vec<AppEntry>> {
        match self.source.top_grossing(self.top_grossing_limit).await {
            Ok(apps) => {
                info!(count = apps.len(), "Top grossing fetched");
                self.store.save_top_grossing(&apps);
                Fetched::remote(apps)
            }
            Err(e) => {
                self.report_failure("top_grossing", &e);
                Fetched::cached(self.store.top_grossing_apps())
            }
        }
    }

    /// Top-free apps in rank order.
    pub async fn top_free(&self) -> Fetched<Vec<AppEntry>> {
        match self.source.top_free(self.top_free_limit).await {
            Ok(apps) => {
                info!(count = apps.len(), "Top free fetched");
                self.store.save_top_free(&apps);
                Fetched::remote(apps)
            }
            Err(e) => {
                self.report_failure("top_free", &e);
                Fetched::cached(self.store.top_free_apps(self.top_free_limit))
            }
        }
    }

    /// Both ranked lists, fetched concurrently.
    pub async fn home(&self) -> (Fetched<Vec<AppEntry>>, Fetched<Vec<AppEntry>>) {
        futures::future::join(self.top_grossing(), self.top_free()).await
    }

    /// Full records for `ids`, same length and order, `None` for ids that
    /// could not be resolved.
    pub async fn details(&self, ids: &[String]) -> Fetched<Vec<Option<AppEntry>>> {
        if ids.is_empty() {
            return Fetched::remote(Vec::new());
        }

        match self.source.details(ids).await {
            Ok(apps) => {
                let resolved: Vec<AppEntry> = apps.iter().flatten().cloned().collect();
                debug!(requested = ids.len(), resolved = resolved.len(), "Details fetched");
                self.store.save_entities(&resolved);
                Fetched::remote(apps)
            }
            Err(e) => {
                self.report_failure("details", &e);
                Fetched::cached(self.store.entity_details(ids))
            }
        }
    }
}
