//! Delimited and fixed-width body readers.

use cmspipe_kit::frame::Frame;
use cmspipe_kit::normalize::normalize_header;
use cmspipe_schema::LayoutSpec;
use cmspipe_types::{ParseError, Value};

/// Candidate delimiters for sniffing, in preference order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b'|', b';'];

/// Sniff the delimiter from the first non-empty line.
#[must_use]
pub fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    DELIMITERS
        .into_iter()
        .max_by_key(|d| first_line.matches(*d as char).count())
        .filter(|d| first_line.contains(*d as char))
        .unwrap_or(b',')
}

/// True when the first data line carries none of the common
/// delimiters, which is how CMS fixed-width TXT presents.
#[must_use]
pub fn looks_fixed_width(text: &str) -> bool {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    !first_line.contains(',') && !first_line.contains('\t') && !first_line.contains('|')
}

/// Read a delimited body into a string frame with normalized headers.
///
/// Short records are padded with empty cells and long ones truncated
/// so every row matches the header arity; the caller's casting pass
/// decides whether an empty cell is acceptable.
pub fn read_delimited(text: &str, filename: &str) -> Result<Frame, ParseError> {
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Malformed {
            filename: filename.to_string(),
            reason: format!("unreadable header row: {e}"),
        })?
        .iter()
        .map(|h| normalize_header(h, filename))
        .collect::<Result<_, _>>()?;

    let arity = headers.len();
    let mut frame = Frame::new(headers);
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Malformed {
            filename: filename.to_string(),
            reason: format!("unreadable record: {e}"),
        })?;
        let mut row: Vec<Value> = record
            .iter()
            .take(arity)
            .map(|cell| Value::Str(cell.to_string()))
            .collect();
        row.resize(arity, Value::Str(String::new()));
        frame
            .push_row(row)
            .map_err(|e| ParseError::Malformed {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;
    }
    Ok(frame)
}

/// Result of a fixed-width read: the frame plus the count of lines
/// skipped for being shorter than the layout's mandatory minimum.
pub struct FixedWidthRead {
    pub frame: Frame,
    pub skipped_short: usize,
}

/// Slice a fixed-width body through a layout.
///
/// Lines shorter than the mandatory minimum are skipped, not fatal:
/// CMS files open with banner and header lines that no layout can
/// slice. `row_filter` lets a parser drop non-data lines (for
/// example, rows whose leading field is not a procedure code).
pub fn read_fixed_width(
    text: &str,
    layout: &LayoutSpec,
    mut row_filter: impl FnMut(&str) -> bool,
) -> FixedWidthRead {
    let columns: Vec<String> = layout.columns.iter().map(|c| c.name.clone()).collect();
    let mut frame = Frame::new(columns);
    let mut skipped_short = 0usize;

    for line in text.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let Some(cells) = layout.slice(line) else {
            skipped_short += 1;
            continue;
        };
        if !row_filter(line) {
            skipped_short += 1;
            continue;
        }
        let row: Vec<Value> = cells
            .into_iter()
            .map(|cell| Value::Str(cell.unwrap_or("").trim().to_string()))
            .collect();
        // Arity matches the layout by construction.
        let _ = frame.push_row(row);
    }

    FixedWidthRead {
        frame,
        skipped_short,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::{ColumnType, LayoutColumn};

    #[test]
    fn sniffs_tab_over_comma() {
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b,c\n"), b',');
    }

    #[test]
    fn fixed_width_detection() {
        assert!(looks_fixed_width("0111226CALIFORNIA\n"));
        assert!(!looks_fixed_width("mac,locality\n"));
    }

    #[test]
    fn delimited_pads_short_records() {
        let f = read_delimited("a,b,c\n1,2\n", "t.csv").unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.value(0, "c"), Some(&Value::Str(String::new())));
    }

    #[test]
    fn delimited_normalizes_headers() {
        let f = read_delimited("CF Type, Effective  Date\nphysician,2025-01-01\n", "t.csv").unwrap();
        assert_eq!(f.columns(), ["cf type", "effective date"]);
    }

    #[test]
    fn fixed_width_skips_short_banner() {
        let layout = LayoutSpec::new(
            2025,
            1,
            0,
            vec![
                LayoutColumn::new("mac", 0, 5, ColumnType::String),
                LayoutColumn::new("loc", 5, 7, ColumnType::String),
            ],
        );
        let read = read_fixed_width("HDR\n0111226\n", &layout, |_| true);
        assert_eq!(read.frame.len(), 1);
        assert_eq!(read.skipped_short, 1);
    }
}
