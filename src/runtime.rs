//! Component wiring for embedding the search subsystem in a host.

use std::sync::Arc;
use std::thread;

use log::info;

use crate::cache_store::CacheStore;
use crate::char_map::CharMap;
use crate::config::Config;
use crate::input_pipeline::InputPipeline;
use crate::library_source::LibrarySource;
use crate::protocol::SearchMatch;
use crate::search_index::SearchIndex;
use crate::sync_manager::SyncManager;

/// Constructed once per hosting session; hands out per-session input
/// pipelines and answers queries. All shared state is explicit and dies with
/// this value.
pub struct SearchRuntime {
    config: Config,
    sync: Arc<SyncManager>,
    index: SearchIndex,
}

impl SearchRuntime {
    /// Wires char map, store, synchronizer, and index from configuration.
    /// A missing or corrupt char map degrades to Latin/digit-only coding.
    pub fn new(config: Config, source: Arc<dyn LibrarySource>) -> Self {
        let char_map = Arc::new(CharMap::load_or_empty(&config.char_map_file));
        let store = Arc::new(CacheStore::new(config.cache_file.clone()));
        let sync = Arc::new(SyncManager::new(Arc::clone(&store), source, char_map));
        let index = SearchIndex::new(store, Arc::clone(&sync));
        Self {
            config,
            sync,
            index,
        }
    }

    /// Kicks off the first sync pass on a background thread so session start
    /// does not block on a library round trip.
    pub fn warm_up(&self) {
        let sync = Arc::clone(&self.sync);
        thread::spawn(move || {
            info!("Warm-up sync pass starting");
            sync.ensure_fresh_once();
        });
    }

    /// Prefix query; see [`SearchIndex::search`].
    pub fn search(&self, prefix: &str) -> Vec<SearchMatch> {
        self.index.search(prefix)
    }

    /// Opens one input session bound to this runtime's cache.
    pub fn open_input(&self) -> InputPipeline {
        InputPipeline::new(&self.config, Arc::clone(&self.sync))
    }

    /// Administrative force rebuild, also reachable through the input
    /// pipeline's reserved digit sequence.
    pub fn rebuild_cache(&self) {
        self.sync.rebuild_cache();
    }
}
