//! GPCI parser (fixed-width TXT via the layout registry, or CSV/XLSX).

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
use crate::layouts::{LayoutKey, LayoutRegistry};
use crate::readers::{looks_fixed_width, read_delimited, read_fixed_width};
use crate::template::{apply_aliases, conform_to_contract, default_effective_from, parse_quarter_vintage};
use crate::xlsx::read_first_sheet;

pub const PARSER_VERSION: &str = "1.1.0";

/// Medicare publishes roughly this many localities; a count far off
/// the mark is worth a warning metric.
const EXPECTED_LOCALITY_RANGE: (usize, usize) = (100, 120);

const ALIASES: &[(&str, &str)] = &[
    ("medicare administrative contractor", "mac"),
    ("carrier", "mac"),
    ("contractor", "mac"),
    ("locality", "locality_code"),
    ("locality number", "locality_code"),
    ("locality name", "locality_name"),
    ("work", "work_gpci"),
    ("pw gpci", "work_gpci"),
    ("work gpci", "work_gpci"),
    ("pe gpci", "pe_gpci"),
    ("practice expense gpci", "pe_gpci"),
    ("mp gpci", "mp_gpci"),
    ("malpractice gpci", "mp_gpci"),
];

/// Parse a GPCI publication.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("gpci")
        .ok_or_else(|| PipelineError::Internal("gpci contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let mut frame = read_body(bytes, ctx, layouts, &mut metrics)?;
    metrics.total_rows = frame.len();

    apply_aliases(&mut frame, ALIASES);
    normalize_string_columns(&mut frame, true);
    default_effective_from(&mut frame, ctx);
    conform_to_contract(&mut frame, contract).map_err(PipelineError::Parse)?;

    let mut rejects = RejectFrame::new(frame.columns().to_vec());
    enforce_domains(&mut frame, contract, &mut rejects, &mut metrics);
    cast_frame(&mut frame, contract, &mut rejects);

    // Guardrail, not a hard bound: indices this far out have always
    // been data problems, but CMS owns the numbers.
    enforce_range(
        &mut frame,
        &mut rejects,
        &mut metrics,
        "work_gpci",
        Some(Bound::Inclusive(Decimal::from_str("0.5").unwrap_or_default())),
        Some(Bound::Inclusive(Decimal::from_str("2.0").unwrap_or_default())),
        Severity::Warn,
        "WORK_GPCI_GUARDRAIL",
    );

    check_natural_keys(&mut frame, contract, Severity::Block, &mut rejects)
        .map_err(PipelineError::Parse)?;

    let locality_count = frame.len();
    metrics.record("locality_count", serde_json::json!(locality_count));
    if locality_count < EXPECTED_LOCALITY_RANGE.0 || locality_count > EXPECTED_LOCALITY_RANGE.1 {
        metrics.record(
            "locality_count_warn",
            serde_json::json!(format!(
                "{locality_count} localities outside expected {}..{}",
                EXPECTED_LOCALITY_RANGE.0, EXPECTED_LOCALITY_RANGE.1
            )),
        );
    }

    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

fn read_body(
    bytes: &[u8],
    ctx: &MetadataContext,
    layouts: &LayoutRegistry,
    metrics: &mut ParseMetrics,
) -> Result<Frame, PipelineError> {
    if is_xlsx(bytes) {
        metrics.encoding_detected = "binary-xlsx".to_string();
        let rows = read_first_sheet(bytes, &ctx.source_filename).map_err(PipelineError::Parse)?;
        return frame_from_string_rows(rows, &ctx.source_filename);
    }
    if is_zip(bytes) {
        let (member, content) =
            extract_by_suffix(bytes, &ctx.source_filename, &[".txt", ".csv", ".xlsx"])
                .map_err(PipelineError::Source)?;
        metrics.record("zip_member", serde_json::json!(member));
        if is_xlsx(&content) {
            metrics.encoding_detected = "binary-xlsx".to_string();
            let rows = read_first_sheet(&content, &member).map_err(PipelineError::Parse)?;
            return frame_from_string_rows(rows, &member);
        }
        return read_text_body(&content, ctx, layouts, metrics);
    }
    read_text_body(bytes, ctx, layouts, metrics)
}

fn read_text_body(
    bytes: &[u8],
    ctx: &MetadataContext,
    layouts: &LayoutRegistry,
    metrics: &mut ParseMetrics,
) -> Result<Frame, PipelineError> {
    let decoded = decode_with_cascade(bytes);
    metrics.encoding_detected = decoded.encoding.to_string();
    metrics.encoding_fallback = decoded.fallback;

    if looks_fixed_width(&decoded.text) {
        let (year, quarter) = parse_quarter_vintage(&ctx.quarter_vintage, ctx.product_year);
        let layout = layouts.get(LayoutKey::Gpci, year, quarter).ok_or_else(|| {
            PipelineError::Parse(ParseError::Malformed {
                filename: ctx.source_filename.clone(),
                reason: format!("no GPCI layout registered at or before {year}.{quarter}"),
            })
        })?;
        metrics.layout_version = Some(layout.version.clone());
        // Data lines open with a five-digit MAC; banners do not.
        let read = read_fixed_width(&decoded.text, layout, |line| {
            line.len() >= 5 && line[..5].chars().all(|c| c.is_ascii_digit())
        });
        metrics.skiprows_dynamic = read.skipped_short;
        return Ok(read.frame);
    }
    read_delimited(&decoded.text, &ctx.source_filename).map_err(PipelineError::Parse)
}

fn frame_from_string_rows(rows: Vec<Vec<String>>, filename: &str) -> Result<Frame, PipelineError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MetadataContext {
        MetadataContext {
            release_id: "gpci_2025".into(),
            vintage_date: "2025-01-01".into(),
            product_year: 2025,
            quarter_vintage: "2025Q1".into(),
            source_filename: "GPCI2025.csv".into(),
            source_file_sha256: "cd".repeat(32),
        }
    }

    #[test]
    fn csv_parses_and_rounds_to_three_places() {
        let csv = "mac,state,locality,locality name,work gpci,pe gpci,mp gpci\n\
                   10112,AL,00,ALABAMA,1.0,0.869,0.5755\n";
        let result = parse(
            csv.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 1);
        match result.data.value(0, "mp_gpci").unwrap() {
            Value::Dec(d) => assert_eq!(d.to_string(), "0.576"),
            other => panic!("expected decimal, got {other:?}"),
        }
        match result.data.value(0, "work_gpci").unwrap() {
            Value::Dec(d) => assert_eq!(d.to_string(), "1.000"),
            other => panic!("expected decimal, got {other:?}"),
        }
    }

    #[test]
    fn fixed_width_txt_parses_through_layout() {
        // Offsets per the registered v2025.1.0 layout.
        let mut line = String::new();
        line.push_str("10112"); // mac 0..5
        line.push(' ');
        line.push_str("AL"); // state 6..8
        line.push_str("  ");
        line.push_str("00"); // locality_code 10..12
        line.push_str("  ");
        line.push_str(&format!("{:<50}", "ALABAMA")); // locality_name 14..64
        line.push_str(&format!("{:>8}", "1.000")); // work 64..72
        line.push_str(&format!("{:>8}", "0.869")); // pe 72..80
        line.push_str(&format!("{:>8}", "0.575")); // mp 80..88
        let text = format!("GPCI HEADER BANNER\n{line}\n");
        let result = parse(
            text.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.metrics.layout_version.as_deref(), Some("v2025.1.0"));
        assert_eq!(result.metrics.skiprows_dynamic, 1);
        assert_eq!(
            result.data.value(0, "locality_name"),
            Some(&Value::Str("ALABAMA".into()))
        );
    }

    #[test]
    fn work_gpci_guardrail_warns_without_rejecting() {
        let csv = "mac,state,locality,locality name,work gpci,pe gpci,mp gpci\n\
                   10112,AL,00,ALABAMA,2.5,0.869,0.575\n";
        let result = parse(
            csv.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(result.data.len(), 1);
        assert!(result.metrics.extra.contains_key("range_warn_work_gpci"));
    }

    #[test]
    fn locality_count_outside_expectation_warns() {
        let csv = "mac,state,locality,locality name,work gpci,pe gpci,mp gpci\n\
                   10112,AL,00,ALABAMA,1.0,0.869,0.575\n";
        let result = parse(
            csv.as_bytes(),
            &ctx(),
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap();
        assert!(result.metrics.extra.contains_key("locality_count_warn"));
    }
}
