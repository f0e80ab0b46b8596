//! Shared value types and bus messages for the search subsystem.
//!
//! This module defines the payloads exchanged between the input pipeline,
//! the cache synchronizer, the search index, and the hosting UI controller.

use std::fmt;

/// Category of searchable library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Movie,
    TvShow,
    Set,
}

impl EntityType {
    /// Fixed evaluation order used by sync passes and search iteration.
    pub const ALL: [EntityType; 3] = [EntityType::Movie, EntityType::TvShow, EntityType::Set];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Movie => "movie",
            EntityType::TvShow => "tvshow",
            EntityType::Set => "set",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(id, title)` row from the authoritative library listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub id: i64,
    pub title: String,
}

impl LibraryEntry {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

/// One prefix-search hit. An id contributes at most one match per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub id: i64,
    pub entity_type: EntityType,
}

/// Raw keypad events fed into an input pipeline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// One digit key, 0-9.
    Digit(u8),
    /// Remove the last character of the query. No-op on an empty query.
    Delete,
    /// Reset the query to empty.
    Clear,
    /// Terminate the worker loop.
    Close,
}

/// Notifications published by the input pipeline for the hosting controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMessage {
    /// The coalesced query changed enough to warrant re-running the filter.
    RefreshRequested,
    /// An administrative cache rebuild completed; show an acknowledgment.
    CacheRebuilt,
}
