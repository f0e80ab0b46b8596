//! Title to T9 digit-code generation.
//!
//! A title is converted into every numeric sequence a user could type for it
//! on a phone keypad: ideographs expand through their readings (including
//! multi-pronunciation alternatives), Latin letters and digits map directly
//! through the keypad table, and the final codes are the Cartesian product of
//! the per-character alternatives.

use std::collections::BTreeSet;

use crate::char_map::CharMap;

/// Only this many leading characters participate in code generation. Bounds
/// the combinatorial cost of multi-pronunciation expansion.
pub const MAX_TITLE_CHARS: usize = 10;

/// Deduplicated set of digit codes for one title.
pub type CodeSet = BTreeSet<String>;

/// Keypad digit for one letter or digit, or `None` for unmappable characters.
fn keypad_digit(ch: char) -> Option<char> {
    match ch.to_ascii_uppercase() {
        'A'..='C' => Some('2'),
        'D'..='F' => Some('3'),
        'G'..='I' => Some('4'),
        'J'..='L' => Some('5'),
        'M'..='O' => Some('6'),
        'P'..='S' => Some('7'),
        'T'..='V' => Some('8'),
        'W'..='Z' => Some('9'),
        digit @ '0'..='9' => Some(digit),
        _ => None,
    }
}

/// Maps a phonetic reading letter-by-letter; unmappable letters are skipped.
fn reading_to_digits(reading: &str) -> String {
    reading.chars().filter_map(keypad_digit).collect()
}

/// Generates every T9 code for a title.
///
/// A character that yields no digit string at all (not in the map and not a
/// keypad character, e.g. punctuation) contributes no position slot: the
/// surrounding characters join up as if it were not there. This matches the
/// shipped cache format and is intentional, not a gap.
pub fn generate_codes(title: &str, map: &CharMap) -> CodeSet {
    let mut position_options: Vec<Vec<String>> = Vec::new();

    for ch in title.chars().take(MAX_TITLE_CHARS) {
        let mut alternatives = BTreeSet::new();
        if let Some(readings) = map.readings(ch) {
            for reading in readings {
                let digits = reading_to_digits(reading);
                if !digits.is_empty() {
                    alternatives.insert(digits);
                }
            }
        } else if let Some(digit) = keypad_digit(ch) {
            alternatives.insert(digit.to_string());
        }

        if !alternatives.is_empty() {
            position_options.push(alternatives.into_iter().collect());
        }
    }

    let mut codes = CodeSet::new();
    if position_options.is_empty() {
        return codes;
    }

    let mut partial: Vec<String> = vec![String::new()];
    for options in &position_options {
        let mut expanded = Vec::with_capacity(partial.len() * options.len());
        for prefix in &partial {
            for option in options {
                let mut combined = String::with_capacity(prefix.len() + option.len());
                combined.push_str(prefix);
                combined.push_str(option);
                expanded.push(combined);
            }
        }
        partial = expanded;
    }

    codes.extend(partial);
    codes
}
