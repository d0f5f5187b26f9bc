//! ZIP5 locality parser.
//!
//! The CMS ZIP bundle carries one fixed-width record per ZIP, with
//! plus-four override rows interleaved. This parser selects the base
//! rows (no plus-four extension) and publishes the ZIP5 → state and
//! locality mapping the resolver starts from.

use cmspipe_kit::cast::cast_frame;
use cmspipe_kit::categorical::enforce_domains;
use cmspipe_kit::encoding::decode_with_cascade;
use cmspipe_kit::finalize::finalize;
use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_kit::metadata::{inject_metadata, MetadataContext};
use cmspipe_kit::metrics::ParseMetrics;
use cmspipe_kit::normalize::normalize_string_columns;
use cmspipe_kit::uniqueness::check_natural_keys;
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{ParseError, PipelineError, Severity, Value};

use crate::archive::{extract_by_suffix, is_zip};
use crate::layouts::{LayoutKey, LayoutRegistry};
use crate::readers::read_fixed_width;
use crate::template::{conform_to_contract, parse_quarter_vintage};

pub const PARSER_VERSION: &str = "1.1.0";

/// Parse ZIP5 locality rows from the CMS ZIP bundle.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("zip5_locality")
        .ok_or_else(|| PipelineError::Internal("zip5_locality contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let raw = read_zip_records(bytes, ctx, layouts, &mut metrics)?;

    // Base rows only; plus-four rows belong to the override dataset.
    let mut frame = Frame::new(contract.column_order.clone());
    let flag_idx = raw.column_index("plus_four_flag").unwrap_or(usize::MAX);
    for row in raw.rows() {
        let is_override = matches!(row.get(flag_idx), Some(Value::Str(f)) if f == "1");
        if is_override {
            continue;
        }
        frame.push_row(vec![
            row[raw.column_index("zip5").unwrap_or(0)].clone(),
            row[raw.column_index("state").unwrap_or(0)].clone(),
            row[raw.column_index("locality").unwrap_or(0)].clone(),
            row[raw.column_index("carrier").unwrap_or(0)].clone(),
            row[raw.column_index("rural").unwrap_or(0)].clone(),
            Value::Str(ctx.vintage_date.clone()),
            Value::Null,
        ])?;
    }
    metrics.total_rows = frame.len();
    metrics.record("rows_scanned", serde_json::json!(raw.len()));

    normalize_string_columns(&mut frame, true);
    conform_to_contract(&mut frame, contract).map_err(PipelineError::Parse)?;

    let mut rejects = RejectFrame::new(frame.columns().to_vec());
    enforce_domains(&mut frame, contract, &mut rejects, &mut metrics);
    cast_frame(&mut frame, contract, &mut rejects);
    check_natural_keys(&mut frame, contract, Severity::Block, &mut rejects)
        .map_err(PipelineError::Parse)?;

    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

/// Shared reader for the fixed-width ZIP record file, used by both
/// this parser and the ZIP9 override parser.
pub(crate) fn read_zip_records(
    bytes: &[u8],
    ctx: &MetadataContext,
    layouts: &LayoutRegistry,
    metrics: &mut ParseMetrics,
) -> Result<Frame, PipelineError> {
    let body = if is_zip(bytes) {
        let (member, content) = extract_by_suffix(bytes, &ctx.source_filename, &[".txt", ".csv"])
            .map_err(PipelineError::Source)?;
        metrics.record("zip_member", serde_json::json!(member));
        content
    } else {
        bytes.to_vec()
    };

    let decoded = decode_with_cascade(&body);
    metrics.encoding_detected = decoded.encoding.to_string();
    metrics.encoding_fallback = decoded.fallback;

    let (year, quarter) = parse_quarter_vintage(&ctx.quarter_vintage, ctx.product_year);
    let layout = layouts
        .get(LayoutKey::ZipRecord, year, quarter)
        .ok_or_else(|| {
            PipelineError::Parse(ParseError::Malformed {
                filename: ctx.source_filename.clone(),
                reason: format!("no ZIP record layout registered at or before {year}.{quarter}"),
            })
        })?;
    metrics.layout_version = Some(layout.version.clone());

    // Data rows carry a five-digit ZIP at offsets 2..7.
    let read = read_fixed_width(&decoded.text, layout, |line| {
        line.len() >= 7 && line[2..7].chars().all(|c| c.is_ascii_digit())
    });
    metrics.skiprows_dynamic = read.skipped_short;
    Ok(read.frame)
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
            source_filename: "ZIP5_OCT2025.txt".into(),
            source_file_sha256: "bb".repeat(32),
        }
    }

    /// Build one fixed-width record per the registered layout:
    /// state 0..2, zip5 2..7, carrier 7..12, locality 12..14,
    /// rural 14..15, plus-four flag 20..21, plus-four 21..25.
    fn record(
        state: &str,
        zip5: &str,
        carrier: &str,
        locality: &str,
        rural: &str,
        flag: &str,
        plus_four: &str,
    ) -> String {
        format!(
            "{state}{zip5}{carrier:<5}{locality:<2}{rural:<1}     {flag:<1}{plus_four:<4}",
        )
    }

    #[test]
    fn base_rows_parse_and_override_rows_are_excluded() {
        let text = format!(
            "{}\n{}\n",
            record("CA", "94107", "01112", "05", " ", " ", "    "),
            record("CA", "94107", "01112", "02", " ", "1", "1234"),
        );
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data.value(0, "zip5"), Some(&Value::Str("94107".into())));
        assert_eq!(result.data.value(0, "state"), Some(&Value::Str("CA".into())));
        assert_eq!(
            result.data.value(0, "locality"),
            Some(&Value::Str("05".into()))
        );
    }

    #[test]
    fn bad_state_code_rejects() {
        let text = record("XX", "94107", "01112", "05", " ", " ", "    ");
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 0);
        assert_eq!(result.rejects.len(), 1);
        assert_eq!(result.rejects.rejects[0].rule_id, "CATEGORY_STATE_DOMAIN");
    }

    #[test]
    fn effective_from_comes_from_vintage() {
        let text = record("NV", "89448", "01112", "01", " ", " ", "    ");
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(
            result.data.value(0, "effective_from").unwrap().to_string(),
            "2025-10-01"
        );
    }
}
