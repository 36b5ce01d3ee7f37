//! Durable local store for catalog entities and ranked lists.
//!
//! Every mutating call runs as one transaction: the tables are cloned, the
//! change is applied to the clone, the clone is written to a temp file and
//! renamed over the store file, and only then does it replace the in-memory
//! tables. Readers never observe a half-applied save.
//!
//! Failures stop at this boundary. They are logged and reads fall back to
//! empty results, so callers always get data or nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{AppEntry, RankEntry, SourceKind};

use super::schema::{migrate, CachedData, Tables};
use super::StoreError;

/// Store file name inside the cache directory
const STORE_FILE: &str = "catalog-store.json";

/// Number of ranked positions served for the top-grossing list.
pub const TOP_GROSSING_SLOTS: usize = 10;

/// Which ranked list an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RankedList {
    TopGrossing,
    TopFree,
}

pub struct LocalStore {
    /// `None` for a memory-only store
    path: Option<PathBuf>,
    tables: Mutex<Tables>,
}

impl LocalStore {
    /// Open (or create) the store in `dir`.
    ///
    /// A document from another schema version, or one that cannot be decoded,
    /// is deleted and the store starts empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);

        let tables = match Self::load(&path) {
            Ok(Some(tables)) => tables,
            Ok(None) => Tables::new(),
            Err(StoreError::Io(e)) => return Err(StoreError::Io(e)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding incompatible store");
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(error = %e, "Failed to remove incompatible store file");
                }
                Tables::new()
            }
        };

        info!(
            path = %path.display(),
            feed_entries = tables.feed_entries.len(),
            lookup_results = tables.lookup_results.len(),
            "Local store opened"
        );

        Ok(Self {
            path: Some(path),
            tables: Mutex::new(tables),
        })
    }

    /// A store that keeps everything in memory and never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            tables: Mutex::new(Tables::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(path: &Path) -> Result<Option<Tables>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Incompatible(format!("undecodable store: {}", e)))?;
        migrate(raw).map(Some)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // a panic mid-read leaves the tables intact; writes only swap whole copies
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec(tables)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Run `apply` as one all-or-nothing write.
    fn transaction<F>(&self, name: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables),
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next;
        debug!(transaction = name, "Store transaction committed");
        Ok(())
    }

    fn commit<F>(&self, name: &str, apply: F)
    where
        F: FnOnce(&mut Tables),
    {
        if let Err(e) = self.transaction(name, apply) {
            warn!(transaction = name, error = %e, "Store transaction failed, nothing saved");
        }
    }

    // ===== Ranked lists =====

    fn ranked(&self, list: RankedList, limit: usize) -> Vec<RankEntry> {
        ranked_table(&self.lock(), list)
            .range(..limit)
            .map(|(_, rank)| rank.clone())
            .collect()
    }

    /// Resolve ranked ids to entities, preferring the feed partition.
    /// Ranks whose entity is missing are skipped. Ranks and entities are read
    /// under one lock so they always come from the same save.
    fn ranked_apps(&self, list: RankedList, limit: usize) -> Vec<AppEntry> {
        let tables = self.lock();
        ranked_table(&tables, list)
            .range(..limit)
            .filter_map(|(_, rank)| {
                tables
                    .feed_entries
                    .get(&rank.app_id)
                    .or_else(|| tables.lookup_results.get(&rank.app_id))
                    .map(|cached| cached.data.clone())
            })
            .collect()
    }

    fn save_ranked(&self, list: RankedList, apps: &[AppEntry]) {
        let name = match list {
            RankedList::TopGrossing => "save_top_grossing",
            RankedList::TopFree => "save_top_free",
        };
        self.commit(name, |tables| {
            for app in apps {
                insert_if_absent(tables, app);
            }

            let table = match list {
                RankedList::TopGrossing => &mut tables.top_grossing,
                RankedList::TopFree => &mut tables.top_free,
            };
            for (position, app) in apps.iter().enumerate() {
                table.insert(position, RankEntry::new(position, app.app_id.clone()));
            }
            // positions past the new list would otherwise point at the old ranking
            table.retain(|position, _| *position < apps.len());
        });
    }

    /// Ranked top-grossing slots, positions 0..10 ascending.
    pub fn top_grossing(&self) -> Vec<RankEntry> {
        self.ranked(RankedList::TopGrossing, TOP_GROSSING_SLOTS)
    }

    /// Top-grossing slots resolved to entities, in rank order.
    pub fn top_grossing_apps(&self) -> Vec<AppEntry> {
        self.ranked_apps(RankedList::TopGrossing, TOP_GROSSING_SLOTS)
    }

    /// Store a freshly fetched top-grossing list.
    ///
    /// Entities are inserted only when absent from their partition; an
    /// existing record is never replaced by a feed copy. The ranked table is
    /// rewritten with one slot per app at its index.
    pub fn save_top_grossing(&self, apps: &[AppEntry]) {
        self.save_ranked(RankedList::TopGrossing, apps);
    }

    pub fn top_free(&self, limit: usize) -> Vec<RankEntry> {
        self.ranked(RankedList::TopFree, limit)
    }

    pub fn top_free_apps(&self, limit: usize) -> Vec<AppEntry> {
        self.ranked_apps(RankedList::TopFree, limit)
    }

    /// Same rules as `save_top_grossing`, for the top-free list.
    pub fn save_top_free(&self, apps: &[AppEntry]) {
        self.save_ranked(RankedList::TopFree, apps);
    }

    // ===== Entities =====

    /// Cached lookup records for `ids`, same length and order, `None` where
    /// nothing is stored.
    pub fn entity_details(&self, ids: &[String]) -> Vec<Option<AppEntry>> {
        if ids.is_empty() {
            return Vec::new();
        }
        let tables = self.lock();
        ids.iter()
            .map(|id| tables.lookup_results.get(id).map(|cached| cached.data.clone()))
            .collect()
    }

    /// Upsert entities. Lookup results overwrite existing records; records
    /// from any other source are only inserted when absent.
    pub fn save_entities(&self, apps: &[AppEntry]) {
        if apps.is_empty() {
            return;
        }
        self.commit("save_entities", |tables| {
            for app in apps {
                if app.source.is_authoritative() {
                    if let Some(partition) = tables.partition_mut(app.source) {
                        partition.insert(app.app_id.clone(), CachedData::new(app.clone()));
                    }
                } else {
                    insert_if_absent(tables, app);
                }
            }
        });
    }

    /// A single stored entity with its store metadata.
    pub fn entity(&self, source: SourceKind, app_id: &str) -> Option<CachedData<AppEntry>> {
        self.lock()
            .partition(source)
            .and_then(|partition| partition.get(app_id).cloned())
    }
}

fn ranked_table(tables: &Tables, list: RankedList) -> &BTreeMap<usize, RankEntry> {
    match list {
        RankedList::TopGrossing => &tables.top_grossing,
        RankedList::TopFree => &tables.top_free,
    }
}

fn insert_if_absent(tables: &mut Tables, app: &AppEntry) {
    match tables.partition_mut(app.source) {
        Some(partition) => {
            partition
                .entry(app.app_id.clone())
                .or_insert_with(|| CachedData::new(app.clone()));
        }
        None => debug!(app_id = %app.app_id, "Skipping entity with unknown source"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema::SCHEMA_VERSION;
    use tempfile::TempDir;

    fn feed(id: &str, title: &str) -> AppEntry {
        let mut app = AppEntry::new(SourceKind::FeedEntry, id);
        app.title = Some(title.to_string());
        app
    }

    fn lookup(id: &str, title: &str) -> AppEntry {
        let mut app = AppEntry::new(SourceKind::LookupResult, id);
        app.title = Some(title.to_string());
        app
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.top_grossing().is_empty());
        assert!(store.top_grossing_apps().is_empty());
        assert!(store.entity_details(&[]).is_empty());
        assert_eq!(store.entity_details(&ids(&["1"])), vec![None]);
    }

    #[test]
    fn test_save_top_grossing_positions() {
        let store = LocalStore::ephemeral();
        store.save_top_grossing(&[feed("a", "A"), feed("b", "B"), feed("c", "C")]);

        let ranks = store.top_grossing();
        assert_eq!(
            ranks,
            vec![RankEntry::new(0, "a"), RankEntry::new(1, "b"), RankEntry::new(2, "c")]
        );

        let titles: Vec<String> = store
            .top_grossing_apps()
            .iter()
            .map(|a| a.display_title().to_string())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_top_grossing_caps_at_ten_slots() {
        let store = LocalStore::ephemeral();
        let apps: Vec<AppEntry> = (0..15).map(|i| feed(&i.to_string(), "x")).collect();
        store.save_top_grossing(&apps);

        let ranks = store.top_grossing();
        assert_eq!(ranks.len(), TOP_GROSSING_SLOTS);
        assert_eq!(ranks.first().unwrap().position, 0);
        assert_eq!(ranks.last().unwrap().position, 9);
    }

    #[test]
    fn test_shorter_ranking_drops_stale_positions() {
        let store = LocalStore::ephemeral();
        store.save_top_grossing(&[feed("a", "A"), feed("b", "B"), feed("c", "C")]);
        store.save_top_grossing(&[feed("z", "Z")]);

        assert_eq!(store.top_grossing(), vec![RankEntry::new(0, "z")]);
    }

    #[test]
    fn test_grossing_save_never_overwrites_entities() {
        let store = LocalStore::ephemeral();
        store.save_top_grossing(&[feed("a", "Original")]);
        store.save_top_grossing(&[feed("a", "Changed")]);

        let stored = store.entity(SourceKind::FeedEntry, "a").unwrap();
        assert_eq!(stored.data.title.as_deref(), Some("Original"));
    }

    #[test]
    fn test_lookup_overwrites_but_feed_does_not() {
        let store = LocalStore::ephemeral();

        store.save_entities(&[lookup("1", "First")]);
        store.save_entities(&[lookup("1", "Second")]);
        assert_eq!(
            store.entity(SourceKind::LookupResult, "1").unwrap().data.title.as_deref(),
            Some("Second")
        );

        store.save_entities(&[feed("2", "First")]);
        store.save_entities(&[feed("2", "Second")]);
        assert_eq!(
            store.entity(SourceKind::FeedEntry, "2").unwrap().data.title.as_deref(),
            Some("First")
        );
    }

    #[test]
    fn test_partitions_are_independent() {
        let store = LocalStore::ephemeral();
        store.save_entities(&[feed("1", "Feed copy"), lookup("1", "Lookup copy")]);

        assert_eq!(
            store.entity(SourceKind::FeedEntry, "1").unwrap().data.title.as_deref(),
            Some("Feed copy")
        );
        assert_eq!(
            store.entity(SourceKind::LookupResult, "1").unwrap().data.title.as_deref(),
            Some("Lookup copy")
        );
    }

    #[test]
    fn test_entity_details_only_reads_lookup_partition() {
        let store = LocalStore::ephemeral();
        store.save_entities(&[feed("1", "Feed"), lookup("2", "Lookup")]);

        let details = store.entity_details(&ids(&["2", "1", "3"]));
        assert_eq!(details.len(), 3);
        assert_eq!(details[0].as_ref().unwrap().app_id, "2");
        assert!(details[1].is_none());
        assert!(details[2].is_none());
    }

    #[test]
    fn test_unknown_source_is_not_stored() {
        let store = LocalStore::ephemeral();
        store.save_entities(&[AppEntry::new(SourceKind::Unknown, "1")]);
        assert!(store.entity(SourceKind::Unknown, "1").is_none());
        assert!(store.entity(SourceKind::FeedEntry, "1").is_none());
    }

    #[test]
    fn test_top_free_is_separate_from_grossing() {
        let store = LocalStore::ephemeral();
        store.save_top_grossing(&[feed("g", "G")]);
        store.save_top_free(&[feed("f1", "F1"), feed("f2", "F2")]);

        assert_eq!(store.top_grossing(), vec![RankEntry::new(0, "g")]);
        assert_eq!(store.top_free(100).len(), 2);
        assert_eq!(store.top_free(1), vec![RankEntry::new(0, "f1")]);
        assert_eq!(store.top_free_apps(100)[1].app_id, "f2");
    }

    #[test]
    fn test_ranked_apps_fall_back_to_lookup_partition() {
        let store = LocalStore::ephemeral();
        store.save_entities(&[lookup("x", "Lookup only")]);
        store.commit("seed", |tables| {
            tables.top_grossing.insert(0, RankEntry::new(0, "x"));
            tables.top_grossing.insert(1, RankEntry::new(1, "missing"));
        });

        let apps = store.top_grossing_apps();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].source, SourceKind::LookupResult);
    }

    #[test]
    fn test_ranked_reads_see_whole_saves() {
        let store = LocalStore::ephemeral();
        let first: Vec<AppEntry> = (0..10).map(|i| feed(&format!("a{}", i), "A")).collect();
        let second: Vec<AppEntry> = (0..10).map(|i| feed(&format!("b{}", i), "B")).collect();
        store.save_top_grossing(&first);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..200 {
                    let apps = if round % 2 == 0 { &second } else { &first };
                    store.save_top_grossing(apps);
                }
            });
            for _ in 0..200 {
                let apps = store.top_grossing_apps();
                assert_eq!(apps.len(), TOP_GROSSING_SLOTS);
                let titles: Vec<&str> = apps.iter().map(|a| a.display_title()).collect();
                assert!(titles.iter().all(|t| *t == titles[0]), "mixed saves: {:?}", titles);
            }
        });
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            store.save_top_grossing(&[feed("a", "A")]);
            store.save_entities(&[lookup("b", "B")]);
        }

        let store = LocalStore::open(dir.path()).unwrap();
        assert_eq!(store.top_grossing(), vec![RankEntry::new(0, "a")]);
        assert_eq!(store.entity_details(&ids(&["b"]))[0].as_ref().unwrap().app_id, "b");
    }

    #[test]
    fn test_incompatible_store_is_recreated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STORE_FILE);
        std::fs::write(&path, r#"{"schema_version": 999, "top_grossing": {}}"#).unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.top_grossing().is_empty());
        assert!(!path.exists());

        store.save_entities(&[lookup("1", "One")]);
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_store_is_recreated() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "{ not json").unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.top_grossing().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.save_entities(&[lookup("1", "Kept")]);

        // a directory where the temp file should go makes the write fail
        std::fs::create_dir(dir.path().join("catalog-store.json.tmp")).unwrap();
        store.save_entities(&[lookup("1", "Lost"), lookup("2", "Lost")]);

        assert_eq!(
            store.entity(SourceKind::LookupResult, "1").unwrap().data.title.as_deref(),
            Some("Kept")
        );
        assert!(store.entity(SourceKind::LookupResult, "2").is_none());
    }
}
