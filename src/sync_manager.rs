//! Cache staleness detection and repair against the authoritative library.
//!
//! One sync pass evaluates each entity type independently: a listing failure
//! for one type is logged and skipped while the remaining types still sync,
//! and previously cached values for the failed type are retained. The
//! persisted file is written at most once per pass, after all types.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rand::RngExt;

use crate::cache_store::{CacheStore, CodeCache, EntityCodes};
use crate::char_map::CharMap;
use crate::code_generator::generate_codes;
use crate::library_source::{LibraryQueryError, LibrarySource};
use crate::protocol::{EntityType, LibraryEntry};

/// Reconciles the code cache against the library listing.
///
/// Safe to invoke from multiple callers concurrently (eager warm-up plus a
/// lazy first search): a global lock serializes passes, and the file write is
/// atomic, so concurrent passes degrade to last-writer-wins.
pub struct SyncManager {
    store: Arc<CacheStore>,
    source: Arc<dyn LibrarySource>,
    char_map: Arc<CharMap>,
    sync_lock: Mutex<()>,
    synced_once: AtomicBool,
}

impl SyncManager {
    pub fn new(
        store: Arc<CacheStore>,
        source: Arc<dyn LibrarySource>,
        char_map: Arc<CharMap>,
    ) -> Self {
        Self {
            store,
            source,
            char_map,
            sync_lock: Mutex::new(()),
            synced_once: AtomicBool::new(false),
        }
    }

    /// First-use gate: the first caller runs a full pass, later callers are a
    /// cheap atomic load. A search racing the first pass proceeds against the
    /// current (possibly empty) snapshot, which is the documented best-effort
    /// behavior.
    pub fn ensure_fresh_once(&self) {
        if !self.synced_once.swap(true, Ordering::SeqCst) {
            self.ensure_fresh();
        }
    }

    /// Runs one full staleness-evaluation-and-repair pass over all types.
    pub fn ensure_fresh(&self) {
        let _guard = self.sync_lock.lock().expect("sync lock poisoned");

        let baseline = self.store.load_once();
        let mut cache = (*baseline).clone();
        // A missing file forces a save even when nothing else changed, so a
        // fresh install persists its first pass.
        let mut dirty = !self.store.file_exists();

        for entity_type in EntityType::ALL {
            match self.sync_entity(&mut cache, entity_type, false) {
                Ok(true) => dirty = true,
                Ok(false) => {}
                Err(err) => warn!("Skipping {} sync this pass: {}", entity_type, err),
            }
        }

        self.store.replace(cache.clone());
        if dirty {
            self.persist(&cache);
        }
    }

    /// Administrative force rebuild: deletes the persisted file, drops the
    /// in-memory snapshot, and rebuilds every type from a fresh listing.
    pub fn rebuild_cache(&self) {
        let _guard = self.sync_lock.lock().expect("sync lock poisoned");
        info!("Force rebuild requested; discarding cache state");

        self.store.remove_file();
        self.store.clear();

        let mut cache = CodeCache::empty();
        for entity_type in EntityType::ALL {
            if let Err(err) = self.sync_entity(&mut cache, entity_type, true) {
                warn!("Force rebuild failed for {}: {}", entity_type, err);
            }
        }

        self.store.replace(cache.clone());
        self.persist(&cache);
    }

    /// Syncs one type. Returns whether the cache changed.
    fn sync_entity(
        &self,
        cache: &mut CodeCache,
        entity_type: EntityType,
        force: bool,
    ) -> Result<bool, LibraryQueryError> {
        let remote = self.source.list_entries(entity_type)?;

        if !force && !self.is_stale(cache.entries(entity_type), &remote, entity_type) {
            return Ok(false);
        }

        info!(
            "Rebuilding {} codes for {} remote entr{}",
            entity_type,
            remote.len(),
            if remote.len() == 1 { "y" } else { "ies" }
        );
        *cache.entries_mut(entity_type) = rebuild_entries(&remote, &self.char_map);
        Ok(true)
    }

    /// Staleness checks in cost order: count, exact id-set equality, then a
    /// single-sample title spot-check.
    ///
    /// The spot-check is probabilistic: one pass can miss a rename, but the
    /// detection probability grows across repeated passes. It is a cheap
    /// proxy, never a consistency proof.
    fn is_stale(
        &self,
        cached: &EntityCodes,
        remote: &[LibraryEntry],
        entity_type: EntityType,
    ) -> bool {
        if remote.len() != cached.len() {
            debug!(
                "{} count changed ({} cached, {} remote)",
                entity_type,
                cached.len(),
                remote.len()
            );
            return true;
        }

        let remote_ids: BTreeSet<i64> = remote.iter().map(|entry| entry.id).collect();
        let cached_ids: BTreeSet<i64> = cached.keys().copied().collect();
        if remote_ids != cached_ids {
            debug!("{} id set changed at equal count", entity_type);
            return true;
        }

        if cached.is_empty() {
            return false;
        }

        let sample_index = rand::rng().random_range(0..cached.len());
        let (sample_id, cached_codes) = cached
            .iter()
            .nth(sample_index)
            .expect("sample index within cached range");
        let Some(entry) = remote.iter().find(|entry| entry.id == *sample_id) else {
            return true;
        };
        let regenerated = generate_codes(&entry.title, &self.char_map);
        if regenerated != *cached_codes {
            debug!(
                "{} spot-check mismatch for id {} (title changed)",
                entity_type, sample_id
            );
            return true;
        }

        false
    }

    fn persist(&self, cache: &CodeCache) {
        if let Err(err) = self.store.persist(cache) {
            warn!("Failed to persist code cache: {}", err);
        }
    }
}

/// Full replacement listing for one type. Entries with empty titles carry no
/// searchable text and are skipped.
fn rebuild_entries(remote: &[LibraryEntry], map: &CharMap) -> EntityCodes {
    let mut rebuilt = EntityCodes::new();
    for entry in remote {
        if entry.title.is_empty() {
            continue;
        }
        rebuilt.insert(entry.id, generate_codes(&entry.title, map));
    }
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::SyncManager;
    use crate::cache_store::{CacheStore, CodeCache};
    use crate::char_map::CharMap;
    use crate::code_generator::generate_codes;
    use crate::library_source::testing::StaticLibrarySource;
    use crate::protocol::{EntityType, LibraryEntry};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static TEST_FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_cache_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "t9search-sync-{}-{}-{}.json",
            std::process::id(),
            name,
            TEST_FILE_SEQ.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn manager(name: &str) -> (SyncManager, Arc<StaticLibrarySource>, Arc<CacheStore>, PathBuf) {
        let path = temp_cache_path(name);
        let store = Arc::new(CacheStore::new(path.clone()));
        let source = Arc::new(StaticLibrarySource::new());
        let sync = SyncManager::new(
            Arc::clone(&store),
            Arc::clone(&source) as Arc<dyn crate::library_source::LibrarySource>,
            Arc::new(CharMap::empty()),
        );
        (sync, source, store, path)
    }

    #[test]
    fn test_first_pass_populates_and_persists() {
        let (sync, source, store, path) = manager("populate");
        source.set_entries(
            EntityType::Movie,
            vec![
                LibraryEntry::new(1, "Alien"),
                LibraryEntry::new(2, "Brazil"),
            ],
        );

        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.movies.len(), 2);
        assert!(snapshot.movies[&1].contains("25436"));
        assert!(path.exists(), "first pass should write the cache file");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_count_change_is_stale_and_rebuild_includes_new_id() {
        let (sync, source, store, path) = manager("count");
        source.set_entries(
            EntityType::Movie,
            vec![LibraryEntry::new(1, "Aa"), LibraryEntry::new(2, "Bb")],
        );
        sync.ensure_fresh();
        assert_eq!(store.snapshot().movies.len(), 2);

        source.set_entries(
            EntityType::Movie,
            vec![
                LibraryEntry::new(1, "Aa"),
                LibraryEntry::new(2, "Bb"),
                LibraryEntry::new(3, "Cc"),
            ],
        );
        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.movies.len(), 3);
        assert!(snapshot.movies.contains_key(&3));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_id_set_change_at_equal_count_is_stale() {
        let (sync, source, store, path) = manager("idset");
        source.set_entries(
            EntityType::Movie,
            vec![LibraryEntry::new(1, "Aa"), LibraryEntry::new(2, "Bb")],
        );
        sync.ensure_fresh();

        source.set_entries(
            EntityType::Movie,
            vec![LibraryEntry::new(1, "Aa"), LibraryEntry::new(3, "Cc")],
        );
        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.movies.len(), 2);
        assert!(snapshot.movies.contains_key(&3));
        assert!(!snapshot.movies.contains_key(&2));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_spot_check_detects_rename_with_single_entry() {
        // With one cached entry the sample is deterministic.
        let (sync, source, store, path) = manager("rename");
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Aa")]);
        sync.ensure_fresh();
        assert!(store.snapshot().movies[&1].contains("22"));

        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Zz")]);
        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.movies[&1],
            generate_codes("Zz", &CharMap::empty())
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_unchanged_listing_is_not_rebuilt() {
        let (sync, source, store, path) = manager("unchanged");
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Aa")]);
        sync.ensure_fresh();
        let first = store.snapshot();

        sync.ensure_fresh();
        let second = store.snapshot();
        assert_eq!(*first, *second);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_failed_type_is_skipped_and_others_still_sync() {
        let (sync, source, store, path) = manager("failures");
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Aa")]);
        source.set_entries(EntityType::TvShow, vec![LibraryEntry::new(9, "Bb")]);
        sync.ensure_fresh();
        assert_eq!(store.snapshot().tvshows.len(), 1);

        // Movies now fail; tvshows gain an entry. The pass must keep the old
        // movie codes and still pick up the tvshow change.
        source.fail_type(EntityType::Movie);
        source.set_entries(
            EntityType::TvShow,
            vec![LibraryEntry::new(9, "Bb"), LibraryEntry::new(10, "Cc")],
        );
        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.movies.len(), 1);
        assert_eq!(snapshot.tvshows.len(), 2);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_empty_titles_are_skipped() {
        let (sync, source, store, path) = manager("empty-title");
        source.set_entries(
            EntityType::Set,
            vec![LibraryEntry::new(1, ""), LibraryEntry::new(2, "Ok")],
        );
        sync.ensure_fresh();

        let snapshot = store.snapshot();
        assert!(!snapshot.sets.contains_key(&1));
        assert!(snapshot.sets.contains_key(&2));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_force_rebuild_discards_file_and_memory() {
        let (sync, source, store, path) = manager("force");
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Aa")]);
        sync.ensure_fresh();
        assert!(path.exists());
        let calls_before = source.list_call_count();

        sync.rebuild_cache();

        // Every type is re-listed unconditionally.
        assert_eq!(source.list_call_count(), calls_before + 3);
        assert!(path.exists(), "force rebuild should persist a fresh file");
        assert_eq!(store.snapshot().movies.len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_all_types_failing_keeps_empty_skeleton() {
        let (sync, source, store, path) = manager("all-fail");
        source.fail_type(EntityType::Movie);
        source.fail_type(EntityType::TvShow);
        source.fail_type(EntityType::Set);

        sync.ensure_fresh();
        assert_eq!(*store.snapshot(), CodeCache::empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_concurrent_passes_leave_consistent_state() {
        let (sync, source, store, path) = manager("concurrent");
        source.set_entries(
            EntityType::Movie,
            vec![LibraryEntry::new(1, "Aa"), LibraryEntry::new(2, "Bb")],
        );

        let sync = Arc::new(sync);
        let mut handles = Vec::new();
        for _ in 0..2 {
            let sync = Arc::clone(&sync);
            handles.push(std::thread::spawn(move || sync.ensure_fresh()));
        }
        {
            let sync = Arc::clone(&sync);
            handles.push(std::thread::spawn(move || sync.rebuild_cache()));
        }
        for handle in handles {
            handle.join().expect("sync thread should not panic");
        }

        // Passes serialize on the sync lock, so whichever finished last left
        // the snapshot and the file agreeing on one fully formed cache.
        let snapshot = store.snapshot();
        assert_eq!(snapshot.movies.len(), 2);
        let on_disk: CodeCache = serde_json::from_str(
            &std::fs::read_to_string(&path).expect("cache file should exist"),
        )
        .expect("cache file should parse");
        assert_eq!(*snapshot, on_disk);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_ensure_fresh_once_runs_single_pass() {
        let (sync, source, _store, path) = manager("once");
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(1, "Aa")]);

        sync.ensure_fresh_once();
        let calls_after_first = source.list_call_count();
        sync.ensure_fresh_once();
        assert_eq!(source.list_call_count(), calls_after_first);
        let _ = std::fs::remove_file(path);
    }
}
