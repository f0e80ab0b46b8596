//! Character-to-readings lookup table.
//!
//! The map file is a single JSON object where each key is one character and
//! each value is either one reading or a list of alternative readings for
//! multi-pronunciation characters:
//!
//! `{"北": "bei", "重": ["zhong", "chong"]}`
//!
//! The table is loaded once at construction and read-only afterwards.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

/// Character map load failure. Callers degrade to an empty map, which keeps
/// Latin/digit-only coding working.
#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error("failed to read character map {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse character map {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// One map file value: a single reading or a list of alternatives.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReadingEntry {
    Single(String),
    Multiple(Vec<String>),
}

impl ReadingEntry {
    fn into_readings(self) -> Vec<String> {
        match self {
            ReadingEntry::Single(reading) => vec![reading],
            ReadingEntry::Multiple(readings) => readings,
        }
    }
}

/// Static lookup from a single character to its phonetic readings.
#[derive(Debug, Default)]
pub struct CharMap {
    readings: HashMap<String, Vec<String>>,
}

impl CharMap {
    /// An empty map: every lookup misses and coding falls back to the keypad
    /// table alone.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a map directly from `(character, readings)` pairs.
    pub fn from_readings<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        Self {
            readings: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }

    /// Parses the map file. Fails hard; most callers want [`load_or_empty`].
    ///
    /// [`load_or_empty`]: CharMap::load_or_empty
    pub fn load(path: &Path) -> Result<CharMap, MapLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| MapLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let entries: HashMap<String, ReadingEntry> =
            serde_json::from_str(&content).map_err(|source| MapLoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let readings = entries
            .into_iter()
            .map(|(key, entry)| (key, entry.into_readings()))
            .collect::<HashMap<_, _>>();
        info!("Loaded character map with {} entries", readings.len());
        Ok(CharMap { readings })
    }

    /// Loads the map file, degrading to an empty map on any failure.
    pub fn load_or_empty(path: &Path) -> CharMap {
        match Self::load(path) {
            Ok(map) => map,
            Err(err) => {
                warn!("{}. Continuing with Latin/digit coding only.", err);
                CharMap::empty()
            }
        }
    }

    /// Readings for one character, trying the exact character first and its
    /// uppercased form as a fallback key.
    pub fn readings(&self, ch: char) -> Option<&[String]> {
        let exact = ch.to_string();
        if let Some(readings) = self.readings.get(&exact) {
            return Some(readings.as_slice());
        }
        let upper: String = ch.to_uppercase().collect();
        if upper != exact {
            if let Some(readings) = self.readings.get(&upper) {
                return Some(readings.as_slice());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::CharMap;
    use std::path::PathBuf;

    fn write_temp_map(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "t9search-charmap-{}-{}.json",
            std::process::id(),
            name
        ));
        std::fs::write(&path, content).expect("temp map should be writable");
        path
    }

    #[test]
    fn test_parses_single_and_list_readings() {
        let path = write_temp_map("mixed", r#"{"北": "bei", "重": ["zhong", "chong"]}"#);
        let map = CharMap::load(&path).expect("map should parse");
        assert_eq!(map.len(), 2);
        assert_eq!(map.readings('北'), Some(&["bei".to_string()][..]));
        assert_eq!(
            map.readings('重'),
            Some(&["zhong".to_string(), "chong".to_string()][..])
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_uppercase_fallback_key() {
        let map = CharMap::from_readings([("A", vec!["alpha".to_string()])]);
        assert_eq!(map.readings('a'), Some(&["alpha".to_string()][..]));
        assert_eq!(map.readings('A'), Some(&["alpha".to_string()][..]));
        assert_eq!(map.readings('b'), None);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let map = CharMap::load_or_empty(&PathBuf::from("/nonexistent/char_map.json"));
        assert!(map.is_empty());
        assert_eq!(map.readings('北'), None);
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let path = write_temp_map("corrupt", "{not json");
        let map = CharMap::load_or_empty(&path);
        assert!(map.is_empty());
        let _ = std::fs::remove_file(path);
    }
}
