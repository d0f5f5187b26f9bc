//! Conversion factor parser (CSV/TSV/XLSX/ZIP).
//!
//! CMS publishes the physician and anesthesia conversion factors in
//! whatever container the year's release happens to use, sometimes
//! with mid-year adjustments as extra effective-dated rows. Values
//! are canonicalized to four decimal places and checked against the
//! published Federal Register values; a deviation beyond a cent
//! warns, values outside (0, 200] reject.

use std::str::FromStr;

use rust_decimal::Decimal;

use cmspipe_kit::cast::cast_frame;
use cmspipe_kit::categorical::enforce_domains;
use cmspipe_kit::encoding::decode_with_cascade;
use cmspipe_kit::finalize::finalize;
use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_kit::metadata::{inject_metadata, MetadataContext};
use cmspipe_kit::metrics::ParseMetrics;
use cmspipe_kit::normalize::{normalize_header, normalize_string_columns};
use cmspipe_kit::range::{enforce_range, Bound};
use cmspipe_kit::uniqueness::check_natural_keys;
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{ParseError, PipelineError, Severity, Value};

use crate::archive::{extract_by_suffix, is_xlsx, is_zip};
use crate::readers::read_delimited;
use crate::template::{apply_aliases, conform_to_contract, default_effective_from};
use crate::xlsx::read_first_sheet;

pub const PARSER_VERSION: &str = "1.2.0";

/// Header aliases seen across CF publications.
const ALIASES: &[(&str, &str)] = &[
    ("type", "cf_type"),
    ("cf type", "cf_type"),
    ("factor type", "cf_type"),
    ("conversion factor", "cf_value"),
    ("cf value", "cf_value"),
    ("cf", "cf_value"),
    ("value", "cf_value"),
    ("amount", "cf_value"),
    ("effective date", "effective_from"),
    ("effective from", "effective_from"),
    ("start date", "effective_from"),
    ("effective to", "effective_to"),
    ("end date", "effective_to"),
];

/// Published CMS values by (cf_type, product_year). Parsed values
/// deviating more than ±0.01 from these warn but do not reject.
const KNOWN_CMS_VALUES: &[(&str, i64, &str)] = &[
    ("physician", 2025, "32.3465"),
    ("anesthesia", 2025, "20.3178"),
    ("physician", 2024, "32.7442"),
    ("anesthesia", 2024, "20.4349"),
];

const DEVIATION_TOLERANCE: &str = "0.01";

/// Parse a conversion factor publication.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("conversion_factor")
        .ok_or_else(|| PipelineError::Internal("conversion_factor contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let mut frame = read_body(bytes, ctx, &mut metrics)?;
    metrics.total_rows = frame.len();

    apply_aliases(&mut frame, ALIASES);
    normalize_string_columns(&mut frame, true);

    if frame.column_index("cf_type").is_none() {
        frame.add_constant_column("cf_type", Value::Str(infer_cf_type(&ctx.source_filename)));
        metrics.record("cf_type_inferred", serde_json::json!(true));
    }
    default_effective_from(&mut frame, ctx);
    conform_to_contract(&mut frame, contract).map_err(PipelineError::Parse)?;

    let mut rejects = RejectFrame::new(frame.columns().to_vec());
    enforce_domains(&mut frame, contract, &mut rejects, &mut metrics);
    cast_frame(&mut frame, contract, &mut rejects);
    enforce_range(
        &mut frame,
        &mut rejects,
        &mut metrics,
        "cf_value",
        Some(Bound::Exclusive(Decimal::ZERO)),
        Some(Bound::Inclusive(Decimal::from(200))),
        Severity::Block,
        "CF_VALUE_BOUNDS",
    );
    check_known_value_deviation(&frame, ctx.product_year, &mut metrics);
    check_natural_keys(&mut frame, contract, Severity::Block, &mut rejects)
        .map_err(PipelineError::Parse)?;

    record_counts_by_type(&frame, &mut metrics);
    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

fn read_body(
    bytes: &[u8],
    ctx: &MetadataContext,
    metrics: &mut ParseMetrics,
) -> Result<Frame, PipelineError> {
    if is_xlsx(bytes) {
        metrics.encoding_detected = "binary-xlsx".to_string();
        return frame_from_rows(
            read_first_sheet(bytes, &ctx.source_filename).map_err(PipelineError::Parse)?,
            &ctx.source_filename,
        );
    }
    if is_zip(bytes) {
        let (member, content) =
            extract_by_suffix(bytes, &ctx.source_filename, &[".csv", ".txt", ".xlsx"])
                .map_err(PipelineError::Source)?;
        metrics.record("zip_member", serde_json::json!(member));
        if is_xlsx(&content) {
            metrics.encoding_detected = "binary-xlsx".to_string();
            return frame_from_rows(
                read_first_sheet(&content, &member).map_err(PipelineError::Parse)?,
                &member,
            );
        }
        let decoded = decode_with_cascade(&content);
        metrics.encoding_detected = decoded.encoding.to_string();
        metrics.encoding_fallback = decoded.fallback;
        return read_delimited(&decoded.text, &member).map_err(PipelineError::Parse);
    }

    let decoded = decode_with_cascade(bytes);
    metrics.encoding_detected = decoded.encoding.to_string();
    metrics.encoding_fallback = decoded.fallback;
    read_delimited(&decoded.text, &ctx.source_filename).map_err(PipelineError::Parse)
}

fn frame_from_rows(rows: Vec<Vec<String>>, filename: &str) -> Result<Frame, PipelineError> {
    let mut iter = rows.into_iter();
    let headers = iter.next().ok_or_else(|| {
        PipelineError::Parse(ParseError::Malformed {
            filename: filename.to_string(),
            reason: "workbook sheet is empty".to_string(),
        })
    })?;
    let columns: Vec<String> = headers
        .iter()
        .map(|h| normalize_header(h, filename))
        .collect::<Result<_, _>>()
        .map_err(PipelineError::Parse)?;
    let arity = columns.len();
    let mut frame = Frame::new(columns);
    for row in iter {
        let mut cells: Vec<Value> = row.into_iter().take(arity).map(Value::Str).collect();
        cells.resize(arity, Value::Str(String::new()));
        frame.push_row(cells)?;
    }
    Ok(frame)
}

/// Infer the factor type from the filename when the column is absent.
/// Anesthesia publications always carry the word; everything else is
/// the physician fee schedule factor.
fn infer_cf_type(filename: &str) -> String {
    if filename.to_lowercase().contains("anes") {
        "anesthesia".to_string()
    } else {
        "physician".to_string()
    }
}

fn check_known_value_deviation(frame: &Frame, product_year: i64, metrics: &mut ParseMetrics) {
    let tolerance = Decimal::from_str(DEVIATION_TOLERANCE).unwrap_or_default();
    let Some(type_idx) = frame.column_index("cf_type") else {
        return;
    };
    let Some(value_idx) = frame.column_index("cf_value") else {
        return;
    };

    let mut deviations: Vec<String> = Vec::new();
    for row in frame.rows() {
        let (Value::Str(cf_type), Value::Dec(cf_value)) = (&row[type_idx], &row[value_idx]) else {
            continue;
        };
        let Some(known) = KNOWN_CMS_VALUES
            .iter()
            .find(|(t, y, _)| t == cf_type && *y == product_year)
            .and_then(|(_, _, v)| Decimal::from_str(v).ok())
        else {
            continue;
        };
        let diff = (*cf_value - known).abs();
        if diff > tolerance {
            deviations.push(format!("{cf_type}: {cf_value} vs published {known}"));
        }
    }
    if !deviations.is_empty() {
        metrics.record("cf_deviation_warn", serde_json::json!(deviations));
    }
}

fn record_counts_by_type(frame: &Frame, metrics: &mut ParseMetrics) {
    let Some(idx) = frame.column_index("cf_type") else {
        return;
    };
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for row in frame.rows() {
        if let Value::Str(t) = &row[idx] {
            *counts.entry(t.clone()).or_default() += 1;
        }
    }
    metrics.record(
        "row_count_by_cf_type",
        serde_json::to_value(counts).unwrap_or_default(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MetadataContext {
        MetadataContext {
            release_id: "mpfs_cf_2025".into(),
            vintage_date: "2025-01-01".into(),
            product_year: 2025,
            quarter_vintage: "2025Q1".into(),
            source_filename: "CF2025.csv".into(),
            source_file_sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn golden_two_row_csv() {
        let csv = "cf_type,cf_value,effective_from\nphysician,32.3465,2025-01-01\nanesthesia,20.3178,2025-01-01\n";
        let result = parse(csv.as_bytes(), &ctx(), &SchemaRegistry::builtin()).unwrap();
        assert_eq!(result.data.len(), 2);
        assert!(result.rejects.is_empty());
        // Natural-key sort places anesthesia first.
        assert_eq!(
            result.data.value(0, "cf_type"),
            Some(&Value::Str("anesthesia".into()))
        );
        let rendered: Vec<String> = result
            .data
            .rows()
            .iter()
            .map(|r| {
                r[result.data.column_index("cf_value").unwrap()]
                    .canonical_render(Some(4), cmspipe_types::RoundingMode::HalfUp)
            })
            .collect();
        assert_eq!(rendered, vec!["20.3178", "32.3465"]);
        assert_eq!(result.metrics.total_rows, 2);
    }

    #[test]
    fn mid_year_adjustment_rows_are_first_class() {
        let csv = "cf_type,cf_value,effective_from,effective_to\n\
                   physician,33.0607,2024-01-01,2024-03-08\n\
                   physician,32.7442,2024-03-09,2024-12-31\n\
                   anesthesia,20.0000,2024-01-01,\n";
        let mut c = ctx();
        c.product_year = 2024;
        c.vintage_date = "2024-01-01".into();
        let result = parse(csv.as_bytes(), &c, &SchemaRegistry::builtin()).unwrap();
        assert_eq!(result.data.len(), 3);
        assert!(result.rejects.is_empty());
        // Both physician rows survive, ordered by effective_from.
        let types: Vec<String> = result
            .data
            .rows()
            .iter()
            .map(|r| r[result.data.column_index("cf_type").unwrap()].to_string())
            .collect();
        assert_eq!(types, vec!["anesthesia", "physician", "physician"]);
        let froms: Vec<String> = result
            .data
            .rows()
            .iter()
            .skip(1)
            .map(|r| r[result.data.column_index("effective_from").unwrap()].to_string())
            .collect();
        assert_eq!(froms, vec!["2024-01-01", "2024-03-09"]);
    }

    #[test]
    fn unknown_cf_type_is_rejected_not_fatal() {
        let csv = "cf_type,cf_value,effective_from\nphysician,32.3465,2025-01-01\ndental,1.0000,2025-01-01\n";
        let result = parse(csv.as_bytes(), &ctx(), &SchemaRegistry::builtin()).unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.rejects.len(), 1);
        assert_eq!(result.rejects.rejects[0].rule_id, "CATEGORY_CF_TYPE_DOMAIN");
    }

    #[test]
    fn out_of_bounds_values_reject() {
        let csv = "cf_type,cf_value,effective_from\nphysician,0,2025-01-01\nanesthesia,250,2025-01-01\n";
        let result = parse(csv.as_bytes(), &ctx(), &SchemaRegistry::builtin()).unwrap();
        assert_eq!(result.data.len(), 0);
        assert_eq!(result.rejects.len(), 2);
        assert_eq!(result.metrics.range_reject_count, 2);
    }

    #[test]
    fn cf_type_inferred_from_filename() {
        let csv = "cf_value,effective_from\n20.3178,2025-01-01\n";
        let mut c = ctx();
        c.source_filename = "ANES2025.csv".into();
        let result = parse(csv.as_bytes(), &c, &SchemaRegistry::builtin()).unwrap();
        assert_eq!(
            result.data.value(0, "cf_type"),
            Some(&Value::Str("anesthesia".into()))
        );
    }

    #[test]
    fn deviation_from_published_value_warns() {
        let csv = "cf_type,cf_value,effective_from\nphysician,31.0000,2025-01-01\n";
        let result = parse(csv.as_bytes(), &ctx(), &SchemaRegistry::builtin()).unwrap();
        assert_eq!(result.data.len(), 1);
        assert!(result.metrics.extra.contains_key("cf_deviation_warn"));
    }

    #[test]
    fn duplicate_natural_key_is_fatal() {
        let csv = "cf_type,cf_value,effective_from\nphysician,32.3465,2025-01-01\nphysician,32.3465,2025-01-01\n";
        let err = parse(csv.as_bytes(), &ctx(), &SchemaRegistry::builtin()).unwrap_err();
        assert_eq!(err.error_type(), "duplicate_key_error");
    }
}
