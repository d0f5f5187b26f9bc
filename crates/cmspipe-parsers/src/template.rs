//! Shared steps of the eleven-step parser template.

use cmspipe_kit::frame::Frame;
use cmspipe_kit::metadata::MetadataContext;
use cmspipe_schema::SchemaContract;
use cmspipe_types::{ParseError, Value};

/// Rename alias headers to their canonical contract names. Aliases
/// are matched against already-normalized (lowercased, collapsed)
/// headers.
pub fn apply_aliases(frame: &mut Frame, aliases: &[(&str, &str)]) {
    for (alias, canonical) in aliases {
        frame.rename_column(alias, canonical);
    }
}

/// Make the frame congruent with the contract: missing nullable
/// columns are injected as null, missing mandatory columns are a
/// schema regression, and columns the contract does not know are
/// dropped.
///
/// Returns the number of extra columns dropped.
pub fn conform_to_contract(
    frame: &mut Frame,
    contract: &SchemaContract,
) -> Result<usize, ParseError> {
    let mut missing_mandatory = Vec::new();
    for spec in &contract.columns {
        if frame.column_index(&spec.name).is_some() {
            continue;
        }
        if spec.nullable {
            frame.add_constant_column(&spec.name, Value::Null);
        } else {
            missing_mandatory.push(spec.name.clone());
        }
    }
    if !missing_mandatory.is_empty() {
        return Err(ParseError::SchemaRegression {
            schema_id: contract.schema_id(),
            missing: missing_mandatory,
            unexpected: Vec::new(),
        });
    }

    let extras: Vec<String> = frame
        .columns()
        .iter()
        .filter(|c| contract.column(c).is_none())
        .cloned()
        .collect();
    if extras.is_empty() {
        return Ok(0);
    }

    // Rebuild in contract order, dropping the extras.
    let indices: Vec<usize> = contract
        .column_order
        .iter()
        .filter_map(|name| frame.column_index(name))
        .collect();
    let mut projected = Frame::new(contract.column_order.clone());
    for row in frame.rows() {
        let new_row: Vec<Value> = indices.iter().map(|&i| row[i].clone()).collect();
        let _ = projected.push_row(new_row);
    }
    *frame = projected;
    Ok(extras.len())
}

/// Split a quarter vintage like `2025Q1` into year and quarter.
#[must_use]
pub fn parse_quarter_vintage(quarter_vintage: &str, fallback_year: i64) -> (u16, u8) {
    let upper = quarter_vintage.trim().to_ascii_uppercase();
    if let Some((year, quarter)) = upper.split_once('Q') {
        if let (Ok(y), Ok(q)) = (year.parse::<u16>(), quarter.parse::<u8>()) {
            if (1..=4).contains(&q) {
                return (y, q);
            }
        }
    }
    (fallback_year.clamp(1900, 9999) as u16, 1)
}

/// Inject `effective_from` from the vintage date when the source file
/// does not carry one.
pub fn default_effective_from(frame: &mut Frame, ctx: &MetadataContext) {
    if frame.column_index("effective_from").is_none() {
        frame.add_constant_column("effective_from", Value::Str(ctx.vintage_date.clone()));
    }
}
