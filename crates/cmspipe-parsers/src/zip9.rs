//! ZIP9 override parser.
//!
//! Selects the plus-four rows from the CMS ZIP bundle (PlusFourFlag
//! set and a non-zero extension), constructs inclusive
//! `[zip9_low, zip9_high]` ranges, and refuses to publish a vintage
//! whose ranges overlap.

use cmspipe_kit::cast::cast_frame;
use cmspipe_kit::categorical::enforce_domains;
use cmspipe_kit::finalize::finalize;
use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_kit::metadata::{inject_metadata, MetadataContext};
use cmspipe_kit::metrics::ParseMetrics;
use cmspipe_kit::normalize::normalize_string_columns;
use cmspipe_kit::uniqueness::check_natural_keys;
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{ParseError, PipelineError, Severity, Value};

use crate::layouts::LayoutRegistry;
use crate::template::conform_to_contract;
use crate::zip_locality::read_zip_records;

pub const PARSER_VERSION: &str = "1.1.0";

/// Parse ZIP9 override ranges from the CMS ZIP bundle.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("zip9_override")
        .ok_or_else(|| PipelineError::Internal("zip9_override contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let raw = read_zip_records(bytes, ctx, layouts, &mut metrics)?;

    let idx = |name: &str| raw.column_index(name).unwrap_or(usize::MAX);
    let (zip5_i, state_i, loc_i, rural_i, flag_i, p4_i, p4h_i) = (
        idx("zip5"),
        idx("state"),
        idx("locality"),
        idx("rural"),
        idx("plus_four_flag"),
        idx("plus_four"),
        idx("plus_four_high"),
    );

    let mut frame = Frame::new(contract.column_order.clone());
    for row in raw.rows() {
        let flag = str_cell(row.get(flag_i));
        let plus_four = str_cell(row.get(p4_i));
        // Only records flagged as requiring the +4 extension, with a
        // real extension, become overrides.
        if flag != "1" || plus_four.is_empty() || plus_four == "0000" {
            continue;
        }
        let zip5 = str_cell(row.get(zip5_i));
        let plus_four_high = {
            let high = str_cell(row.get(p4h_i));
            if high.len() == 4 && high.chars().all(|c| c.is_ascii_digit()) && high != "0000" {
                high
            } else {
                plus_four.clone()
            }
        };
        frame.push_row(vec![
            Value::Str(format!("{zip5}{plus_four}")),
            Value::Str(format!("{zip5}{plus_four_high}")),
            Value::Str(str_cell(row.get(state_i))),
            Value::Str(str_cell(row.get(loc_i))),
            Value::Str(str_cell(row.get(rural_i))),
            Value::Str(ctx.vintage_date.clone()),
            Value::Null,
        ])?;
    }
    metrics.total_rows = frame.len();
    metrics.record("rows_scanned", serde_json::json!(raw.len()));

    normalize_string_columns(&mut frame, true);
    conform_to_contract(&mut frame, contract).map_err(PipelineError::Parse)?;

    let mut rejects = RejectFrame::new(frame.columns().to_vec());
    reject_inverted_ranges(&mut frame, &mut rejects);
    enforce_domains(&mut frame, contract, &mut rejects, &mut metrics);
    cast_frame(&mut frame, contract, &mut rejects);
    check_range_overlaps(&frame, ctx).map_err(PipelineError::Parse)?;
    check_natural_keys(&mut frame, contract, Severity::Block, &mut rejects)
        .map_err(PipelineError::Parse)?;

    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

fn str_cell(cell: Option<&Value>) -> String {
    match cell {
        Some(Value::Str(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// A range must satisfy `zip9_low <= zip9_high`.
fn reject_inverted_ranges(frame: &mut Frame, rejects: &mut RejectFrame) {
    let (Some(low_i), Some(high_i)) = (
        frame.column_index("zip9_low"),
        frame.column_index("zip9_high"),
    ) else {
        return;
    };
    let removed = frame.drain_failing(|_, row| match (&row[low_i], &row[high_i]) {
        (Value::Str(low), Value::Str(high)) => low <= high,
        _ => true,
    });
    for (row_id, row) in removed {
        let low = row[low_i].to_string();
        let high = row[high_i].to_string();
        rejects.push(
            row,
            row_id,
            "ZIP9_RANGE_ORDER",
            Severity::Block,
            format!("range [{low}, {high}] is inverted"),
        );
    }
}

/// Overlapping override ranges within one vintage make locality
/// assignment ambiguous; the whole file is refused.
fn check_range_overlaps(frame: &Frame, ctx: &MetadataContext) -> Result<(), ParseError> {
    let (Some(low_i), Some(high_i)) = (
        frame.column_index("zip9_low"),
        frame.column_index("zip9_high"),
    ) else {
        return Ok(());
    };
    let mut ranges: Vec<(String, String)> = frame
        .rows()
        .iter()
        .filter_map(|row| match (&row[low_i], &row[high_i]) {
            (Value::Str(low), Value::Str(high)) => Some((low.clone(), high.clone())),
            _ => None,
        })
        .collect();
    ranges.sort();

    for pair in ranges.windows(2) {
        let (_, prev_high) = &pair[0];
        let (next_low, _) = &pair[1];
        // Inclusive bounds: touching at an endpoint is an overlap.
        if next_low <= prev_high {
            return Err(ParseError::Malformed {
                filename: ctx.source_filename.clone(),
                reason: format!(
                    "ZIP9 override ranges overlap within vintage {}: [..{prev_high}] and [{next_low}..]",
                    ctx.vintage_date
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MetadataContext {
        MetadataContext {
            release_id: "zip_oct2025".into(),
            vintage_date: "2025-10-01".into(),
            product_year: 2025,
            quarter_vintage: "2025Q4".into(),
            source_filename: "ZIP9_OCT2025.txt".into(),
            source_file_sha256: "cc".repeat(32),
        }
    }

    fn record(
        state: &str,
        zip5: &str,
        locality: &str,
        flag: &str,
        plus_four: &str,
        plus_four_high: &str,
    ) -> String {
        format!(
            "{state}{zip5}01112{locality:<2}      {flag:<1}{plus_four:<4}{plus_four_high:<4}",
        )
    }

    #[test]
    fn selects_only_flagged_nonzero_rows() {
        let text = format!(
            "{}\n{}\n{}\n",
            record("CA", "94107", "05", " ", "    ", "    "),
            record("CA", "94107", "02", "1", "0000", "    "),
            record("CA", "94107", "02", "1", "1000", "1999"),
        );
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(
            result.data.value(0, "zip9_low"),
            Some(&Value::Str("941071000".into()))
        );
        assert_eq!(
            result.data.value(0, "zip9_high"),
            Some(&Value::Str("941071999".into()))
        );
    }

    #[test]
    fn missing_high_collapses_to_point_range() {
        let text = record("CA", "94107", "02", "1", "1234", "    ");
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(
            result.data.value(0, "zip9_low"),
            Some(&Value::Str("941071234".into()))
        );
        assert_eq!(
            result.data.value(0, "zip9_high"),
            Some(&Value::Str("941071234".into()))
        );
    }

    #[test]
    fn overlapping_ranges_are_fatal() {
        let text = format!(
            "{}\n{}\n",
            record("CA", "94107", "02", "1", "1000", "1999"),
            record("CA", "94107", "05", "1", "1500", "2500"),
        );
        let err = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn inverted_range_rejects_row() {
        let text = record("CA", "94107", "02", "1", "2000", "1000");
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 0);
        assert_eq!(result.rejects.rejects[0].rule_id, "ZIP9_RANGE_ORDER");
    }
}
