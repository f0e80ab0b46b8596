//! Versioned two-tier (memory + file) storage for generated code sets.
//!
//! File format, one JSON object per cache:
//!
//! `{"version": 4, "movies": {"<id>": ["<code>", ...]}, "tvshows": {...},
//! "sets": {...}}`
//!
//! Missing per-type maps default to empty; a version mismatch invalidates the
//! whole file. Reads never fail the caller: any unreadable state collapses to
//! an empty skeleton.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::code_generator::CodeSet;
use crate::protocol::EntityType;

/// Bumped whenever the code-generation scheme changes; older files are
/// discarded wholesale rather than partially trusted.
pub const CACHE_VERSION: u32 = 4;

/// Per-type map of entity id to its generated code set.
pub type EntityCodes = BTreeMap<i64, CodeSet>;

/// Cache file write failure. Logged and swallowed by the sync layer; the
/// in-memory snapshot stays authoritative for the session.
#[derive(Debug, Error)]
pub enum CacheFileError {
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted cache schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCache {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub movies: EntityCodes,
    #[serde(default)]
    pub tvshows: EntityCodes,
    #[serde(default)]
    pub sets: EntityCodes,
}

impl CodeCache {
    /// Empty skeleton at the current version.
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            movies: EntityCodes::new(),
            tvshows: EntityCodes::new(),
            sets: EntityCodes::new(),
        }
    }

    pub fn entries(&self, entity_type: EntityType) -> &EntityCodes {
        match entity_type {
            EntityType::Movie => &self.movies,
            EntityType::TvShow => &self.tvshows,
            EntityType::Set => &self.sets,
        }
    }

    pub fn entries_mut(&mut self, entity_type: EntityType) -> &mut EntityCodes {
        match entity_type {
            EntityType::Movie => &mut self.movies,
            EntityType::TvShow => &mut self.tvshows,
            EntityType::Set => &mut self.sets,
        }
    }

    pub fn total_entries(&self) -> usize {
        self.movies.len() + self.tvshows.len() + self.sets.len()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::empty()
    }
}

/// Holds the current in-memory snapshot and owns the persisted file.
///
/// Readers receive an `Arc` to an immutable snapshot, so a search can iterate
/// while the synchronizer swaps in a replacement.
pub struct CacheStore {
    path: PathBuf,
    state: RwLock<Arc<CodeCache>>,
    loaded_from_disk: AtomicBool,
}

impl CacheStore {
    /// Starts from an empty skeleton; the file is only consulted via
    /// [`load_once`](CacheStore::load_once).
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: RwLock::new(Arc::new(CodeCache::empty())),
            loaded_from_disk: AtomicBool::new(false),
        }
    }

    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<CodeCache> {
        Arc::clone(&self.state.read().expect("cache state lock poisoned"))
    }

    /// Publishes a replacement snapshot.
    pub fn replace(&self, cache: CodeCache) {
        *self.state.write().expect("cache state lock poisoned") = Arc::new(cache);
    }

    /// Drops the in-memory snapshot back to the empty skeleton.
    pub fn clear(&self) {
        self.replace(CodeCache::empty());
    }

    /// First access loads the persisted file into memory; later calls return
    /// the current snapshot unchanged.
    pub fn load_once(&self) -> Arc<CodeCache> {
        if !self.loaded_from_disk.swap(true, Ordering::SeqCst) {
            self.replace(read_cache_file(&self.path));
        }
        self.snapshot()
    }

    /// Whole-structure rewrite of the persisted file.
    ///
    /// Writes to a sibling temp file and renames it into place, so a reader
    /// never observes a half-written cache.
    pub fn persist(&self, cache: &CodeCache) -> Result<(), CacheFileError> {
        let serialized = serde_json::to_string(cache)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| CacheFileError::Write {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, serialized).map_err(|source| CacheFileError::Write {
            path: temp_path.display().to_string(),
            source,
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|source| CacheFileError::Write {
            path: self.path.display().to_string(),
            source,
        })?;

        info!(
            "Persisted code cache with {} entries to {}",
            cache.total_entries(),
            self.path.display()
        );
        Ok(())
    }

    /// Deletes the persisted file as part of an administrative force rebuild.
    pub fn remove_file(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Deleted cache file {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "Failed to delete cache file {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

fn read_cache_file(path: &Path) -> CodeCache {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            debug!(
                "No usable cache file at {} ({}). Starting empty.",
                path.display(),
                err
            );
            return CodeCache::empty();
        }
    };

    match serde_json::from_str::<CodeCache>(&content) {
        Ok(cache) if cache.version == CACHE_VERSION => {
            info!(
                "Loaded cache with {} movies, {} tvshows, {} sets",
                cache.movies.len(),
                cache.tvshows.len(),
                cache.sets.len()
            );
            cache
        }
        Ok(cache) => {
            warn!(
                "Cache version mismatch in {} (found {}, expected {}). Starting empty.",
                path.display(),
                cache.version,
                CACHE_VERSION
            );
            CodeCache::empty()
        }
        Err(err) => {
            warn!(
                "Failed to parse cache file {} ({}). Starting empty.",
                path.display(),
                err
            );
            CodeCache::empty()
        }
    }
}
