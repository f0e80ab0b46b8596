//! Boundary to the authoritative media library.
//!
//! The hosting application supplies the implementation (in the original
//! deployment this is a JSON-RPC call into the media center); this crate only
//! relies on the listing contract below.

use thiserror::Error;

use crate::protocol::{EntityType, LibraryEntry};

/// Listing failure for one entity type.
///
/// An error is distinguishable from an empty library: `Ok(vec![])` means the
/// library genuinely has no items of that type.
#[derive(Debug, Error)]
#[error("library listing failed for {entity_type}: {message}")]
pub struct LibraryQueryError {
    pub entity_type: EntityType,
    pub message: String,
}

impl LibraryQueryError {
    pub fn new(entity_type: EntityType, message: impl Into<String>) -> Self {
        Self {
            entity_type,
            message: message.into(),
        }
    }
}

/// Authoritative source of `(id, title)` listings per entity type.
///
/// The reported count of a type is the length of the returned list. Calls may
/// block for a round trip to the library backend.
pub trait LibrarySource: Send + Sync {
    fn list_entries(&self, entity_type: EntityType) -> Result<Vec<LibraryEntry>, LibraryQueryError>;
}
