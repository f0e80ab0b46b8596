//! Prefix queries over the current cache snapshot.

use std::sync::Arc;

use log::debug;

use crate::cache_store::CacheStore;
use crate::protocol::{EntityType, SearchMatch};
use crate::sync_manager::SyncManager;

/// Answers digit-prefix queries against the code cache.
pub struct SearchIndex {
    store: Arc<CacheStore>,
    sync: Arc<SyncManager>,
}

impl SearchIndex {
    pub fn new(store: Arc<CacheStore>, sync: Arc<SyncManager>) -> Self {
        Self { store, sync }
    }

    /// Returns every entity with at least one code starting with `prefix`.
    ///
    /// An id contributes at most one match. Enforcing a minimum prefix length
    /// is the caller's responsibility. The first call triggers a sync pass,
    /// which can block for a library round trip; latency-sensitive callers
    /// should dispatch off their hot thread.
    pub fn search(&self, prefix: &str) -> Vec<SearchMatch> {
        self.sync.ensure_fresh_once();

        let snapshot = self.store.snapshot();
        let mut matches = Vec::new();
        for entity_type in EntityType::ALL {
            for (id, codes) in snapshot.entries(entity_type) {
                if codes.iter().any(|code| code.starts_with(prefix)) {
                    matches.push(SearchMatch {
                        id: *id,
                        entity_type,
                    });
                }
            }
        }

        debug!("Search for '{}' matched {} entit(ies)", prefix, matches.len());
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::SearchIndex;
    use crate::cache_store::CacheStore;
    use crate::char_map::CharMap;
    use crate::library_source::testing::StaticLibrarySource;
    use crate::library_source::LibrarySource;
    use crate::protocol::{EntityType, LibraryEntry};
    use crate::sync_manager::SyncManager;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static TEST_FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_cache_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "t9search-index-{}-{}-{}.json",
            std::process::id(),
            name,
            TEST_FILE_SEQ.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn index_with_source(name: &str) -> (SearchIndex, Arc<StaticLibrarySource>, PathBuf) {
        let path = temp_cache_path(name);
        let store = Arc::new(CacheStore::new(path.clone()));
        let source = Arc::new(StaticLibrarySource::new());
        let map = CharMap::from_readings([("重", vec!["zhong".to_string(), "chong".to_string()])]);
        let sync = Arc::new(SyncManager::new(
            Arc::clone(&store),
            Arc::clone(&source) as Arc<dyn LibrarySource>,
            Arc::new(map),
        ));
        (SearchIndex::new(store, sync), source, path)
    }

    #[test]
    fn test_prefix_match_includes_and_excludes_correctly() {
        let (index, source, path) = index_with_source("prefix");
        source.set_entries(
            EntityType::Movie,
            vec![
                LibraryEntry::new(1, "123GO"), // code 12346
                LibraryEntry::new(2, "Zebra"), // code 93272
            ],
        );
        source.set_entries(EntityType::TvShow, vec![LibraryEntry::new(1, "1234")]);

        let matches = index.search("123");
        assert_eq!(matches.len(), 2);
        assert!(matches
            .iter()
            .any(|m| m.id == 1 && m.entity_type == EntityType::Movie));
        // Same numeric id under a different type is an independent result.
        assert!(matches
            .iter()
            .any(|m| m.id == 1 && m.entity_type == EntityType::TvShow));
        assert!(!matches.iter().any(|m| m.id == 2));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_multi_code_entity_matches_once() {
        let (index, source, path) = index_with_source("dedupe");
        // Both readings of 重 start with different digits; query each side.
        source.set_entries(EntityType::Movie, vec![LibraryEntry::new(7, "重")]);

        assert_eq!(index.search("94").len(), 1);
        assert_eq!(index.search("24").len(), 1);
        // A prefix shared by no codes matches nothing.
        assert!(index.search("55").is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_first_search_triggers_lazy_sync() {
        let (index, source, path) = index_with_source("lazy");
        source.set_entries(EntityType::Set, vec![LibraryEntry::new(4, "24")]);
        assert_eq!(source.list_call_count(), 0);

        let matches = index.search("2");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entity_type, EntityType::Set);
        assert_eq!(source.list_call_count(), 3);

        // Subsequent searches reuse the snapshot without re-listing.
        let _ = index.search("2");
        assert_eq!(source.list_call_count(), 3);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_empty_cache_yields_empty_result() {
        let (index, _source, path) = index_with_source("empty");
        assert!(index.search("123").is_empty());
        let _ = std::fs::remove_file(path);
    }
}
