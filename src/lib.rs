//! Predictive numeric-keypad ("T9") search over a media library.
//!
//! Free-text titles mixing ideographic and Latin/numeric characters are
//! expanded into every digit sequence a user could type for them on a phone
//! keypad. The generated codes are cached against the authoritative library,
//! kept fresh by a staleness-detecting synchronizer, queried by digit prefix,
//! and fed from a debounced keystroke pipeline so rapid typing coalesces into
//! few refreshes.
//!
//! The hosting application supplies a [`library_source::LibrarySource`]
//! implementation and consumes [`protocol::SearchMessage`] notifications;
//! everything else is wired by [`runtime::SearchRuntime`].

pub mod cache_store;
pub mod char_map;
pub mod code_generator;
pub mod config;
pub mod input_pipeline;
pub mod library_source;
pub mod protocol;
pub mod runtime;
pub mod search_index;
pub mod sync_manager;
