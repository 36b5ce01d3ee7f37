//! On-disk layout of the local store.
//!
//! The whole store is one JSON document. Entities are partitioned by
//! `SourceKind`, each partition keyed by app id; ranked lists are keyed by
//! position.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AppEntry, RankEntry, SourceKind};

use super::StoreError;

/// Bump when the document layout changes incompatibly. Older documents are
/// discarded on open.
pub const SCHEMA_VERSION: u64 = 1;

/// A persisted value plus the time the store wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub schema_version: u64,
    #[serde(default)]
    pub feed_entries: BTreeMap<String, CachedData<AppEntry>>,
    #[serde(default)]
    pub lookup_results: BTreeMap<String, CachedData<AppEntry>>,
    #[serde(default)]
    pub top_grossing: BTreeMap<usize, RankEntry>,
    #[serde(default)]
    pub top_free: BTreeMap<usize, RankEntry>,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            feed_entries: BTreeMap::new(),
            lookup_results: BTreeMap::new(),
            top_grossing: BTreeMap::new(),
            top_free: BTreeMap::new(),
        }
    }

    /// Entity partition for a source kind. `Unknown` records are never stored.
    pub fn partition(&self, source: SourceKind) -> Option<&BTreeMap<String, CachedData<AppEntry>>> {
        match source {
            SourceKind::FeedEntry => Some(&self.feed_entries),
            SourceKind::LookupResult => Some(&self.lookup_results),
            SourceKind::Unknown => None,
        }
    }

    pub fn partition_mut(
        &mut self,
        source: SourceKind,
    ) -> Option<&mut BTreeMap<String, CachedData<AppEntry>>> {
        match source {
            SourceKind::FeedEntry => Some(&mut self.feed_entries),
            SourceKind::LookupResult => Some(&mut self.lookup_results),
            SourceKind::Unknown => None,
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

/// Bring a decoded document up to the current schema.
///
/// Only the current version is understood; anything else is reported as
/// incompatible and the caller recreates the store empty.
pub fn migrate(raw: Value) -> Result<Tables, StoreError> {
    let version = raw.get("schema_version").and_then(Value::as_u64);
    match version {
        Some(SCHEMA_VERSION) => {
            serde_json::from_value(raw).map_err(|e| StoreError::Incompatible(e.to_string()))
        }
        Some(other) => Err(StoreError::Incompatible(format!(
            "schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
        None => Err(StoreError::Incompatible("missing schema version".to_string())),
    }
}
