//! Header and string-value normalization.

use cmspipe_types::{ParseError, Value};

use crate::frame::Frame;
use crate::hash::HASH_SEPARATOR;

/// Normalize a raw column header: strip stray BOM characters, trim,
/// collapse internal whitespace runs to single spaces, lowercase
/// ASCII. A header that normalizes to nothing is an error: it means
/// the file carried a bare BOM or whitespace where a name belongs.
pub fn normalize_header(raw: &str, filename: &str) -> Result<String, ParseError> {
    let stripped: String = raw.chars().filter(|&c| c != '\u{feff}').collect();
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        }
    }
    if out.is_empty() {
        return Err(ParseError::Malformed {
            filename: filename.to_string(),
            reason: format!("column header {raw:?} normalizes to an empty name"),
        });
    }
    Ok(out)
}

/// Normalize one string value: non-breaking spaces and tabs become
/// spaces, the reserved hash separator is stripped, and surrounding
/// whitespace is trimmed.
#[must_use]
pub fn normalize_string_value(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{a0}' | '\t' => ' ',
            other => other,
        })
        .filter(|&c| c != HASH_SEPARATOR)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Apply string normalization to every string cell in the frame,
/// optionally converting empty strings to null. Runs before any
/// validation so domains and patterns see clean values.
pub fn normalize_string_columns(frame: &mut Frame, empty_to_null: bool) {
    frame.map_rows(|row| {
        for cell in row.iter_mut() {
            if let Value::Str(s) = cell {
                let normalized = normalize_string_value(s);
                if empty_to_null && normalized.is_empty() {
                    *cell = Value::Null;
                } else {
                    *cell = Value::Str(normalized);
                }
            }
        }
    });
}
