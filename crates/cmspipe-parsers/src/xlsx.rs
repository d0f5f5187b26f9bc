//! Minimal XLSX reading, strings only.
//!
//! CMS workbooks are read with every cell as text so Excel's numeric
//! coercion can never corrupt a value like `32.3465`; the kit's
//! casting pass is the only place types are assigned. Only the first
//! worksheet is read, which matches how CMS publishes these files.

use quick_xml::events::Event;
use quick_xml::Reader;

use cmspipe_types::ParseError;

use crate::archive::{extract_member, list_members};

/// Read the first worksheet of an XLSX workbook into rows of strings.
///
/// Missing cells yield empty strings so every row spans the full
/// width seen anywhere in the sheet.
pub fn read_first_sheet(bytes: &[u8], filename: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let to_parse_err = |reason: String| ParseError::Malformed {
        filename: filename.to_string(),
        reason,
    };

    let members = list_members(bytes).map_err(|e| to_parse_err(e.to_string()))?;

    let shared = if members.iter().any(|m| m == "xl/sharedStrings.xml") {
        let raw = extract_member(bytes, filename, "xl/sharedStrings.xml")
            .map_err(|e| to_parse_err(e.to_string()))?;
        parse_shared_strings(&String::from_utf8_lossy(&raw))?
    } else {
        Vec::new()
    };

    let sheet_member = pick_first_sheet(&members)
        .ok_or_else(|| to_parse_err("workbook has no worksheets".to_string()))?;
    let raw = extract_member(bytes, filename, &sheet_member)
        .map_err(|e| to_parse_err(e.to_string()))?;
    parse_sheet(&String::from_utf8_lossy(&raw), &shared, filename)
}

fn pick_first_sheet(members: &[String]) -> Option<String> {
    if members.iter().any(|m| m == "xl/worksheets/sheet1.xml") {
        return Some("xl/worksheets/sheet1.xml".to_string());
    }
    let mut sheets: Vec<&String> = members
        .iter()
        .filter(|m| m.starts_with("xl/worksheets/") && m.ends_with(".xml"))
        .collect();
    sheets.sort();
    sheets.first().map(|s| (*s).to_string())
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut in_si = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_t => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(current.clone());
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Malformed {
                    filename: "xl/sharedStrings.xml".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
    }
    Ok(strings)
}

/// Convert the letter part of a cell reference (`"BC12"` → 54).
fn column_of_ref(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for c in cell_ref.chars().take_while(char::is_ascii_alphabetic) {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    col.saturating_sub(1)
}

fn parse_sheet(
    xml: &str,
    shared: &[String],
    filename: &str,
) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_col = 0usize;
    let mut cell_type = String::new();
    let mut capture = false;
    let mut text = String::new();
    let mut width = 0usize;

    let mut handle_cell_start = |e: &quick_xml::events::BytesStart<'_>,
                                 row: &Vec<String>|
     -> (usize, String) {
        let mut col = row.len();
        let mut ty = String::new();
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"r" => col = column_of_ref(&String::from_utf8_lossy(&attr.value)),
                b"t" => ty = String::from_utf8_lossy(&attr.value).into_owned(),
                _ => {}
            }
        }
        (col, ty)
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"row" => row = Vec::new(),
                b"c" => {
                    let (col, ty) = handle_cell_start(&e, &row);
                    cell_col = col;
                    cell_type = ty;
                    text.clear();
                }
                b"v" | b"t" => capture = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"c" {
                    let (col, _) = handle_cell_start(&e, &row);
                    place(&mut row, col, String::new());
                }
            }
            Ok(Event::Text(t)) if capture => {
                text.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let value = if cell_type == "s" {
                        shared
                            .get(text.trim().parse::<usize>().unwrap_or(usize::MAX))
                            .cloned()
                            .unwrap_or_default()
                    } else {
                        text.clone()
                    };
                    place(&mut row, cell_col, value);
                    text.clear();
                }
                b"row" => {
                    width = width.max(row.len());
                    rows.push(std::mem::take(&mut row));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Malformed {
                    filename: filename.to_string(),
                    reason: format!("worksheet XML error: {e}"),
                })
            }
            _ => {}
        }
    }

    for row in &mut rows {
        row.resize(width, String::new());
    }
    Ok(rows)
}

fn place(row: &mut Vec<String>, col: usize, value: String) {
    if row.len() <= col {
        row.resize(col + 1, String::new());
    }
    row[col] = value;
}
