//! Locality-county crosswalk parser, stage 1 (layout-faithful).
//!
//! Parses 25LOCCO-style files exactly as published: state and county
//! NAMES, no FIPS derivation, duplicates preserved. The state name is
//! forward-filled on continuation rows. FIPS expansion and dedup are
//! the normalizer's job, so natural-key collisions are only logged
//! here, never enforced.

use cmspipe_kit::encoding::decode_with_cascade;
use cmspipe_kit::finalize::finalize;
use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_kit::metadata::{inject_metadata, MetadataContext};
use cmspipe_kit::metrics::ParseMetrics;
use cmspipe_kit::normalize::{normalize_string_columns, normalize_string_value};
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{ParseError, PipelineError, Value};

use crate::archive::{extract_by_suffix, is_zip};
use crate::layouts::{LayoutKey, LayoutRegistry, LOCALITY_COUNTY_TAIL_START};
use crate::template::parse_quarter_vintage;

pub const PARSER_VERSION: &str = "1.0.1";

/// Parse a locality-county crosswalk file to the raw stage-1 schema.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("locality_raw")
        .ok_or_else(|| PipelineError::Internal("locality_raw contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let body = if is_zip(bytes) {
        let (member, content) = extract_by_suffix(bytes, &ctx.source_filename, &[".txt"])
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
        .get(LayoutKey::LocalityCounty, year, quarter)
        .ok_or_else(|| {
            PipelineError::Parse(ParseError::Malformed {
                filename: ctx.source_filename.clone(),
                reason: format!("no locality layout registered at or before {year}.{quarter}"),
            })
        })?;
    metrics.layout_version = Some(layout.version.clone());

    let mut frame = Frame::new(contract.column_order.clone());
    let mut skipped = 0usize;
    let mut last_state: Option<String> = None;

    for line in decoded.text.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let Some(cells) = layout.slice(line) else {
            skipped += 1;
            continue;
        };
        let mac = cells[0].unwrap_or("").trim();
        if mac.len() != 5 || !mac.chars().all(|c| c.is_ascii_digit()) {
            skipped += 1;
            continue;
        }
        let locality_code = cells[1].unwrap_or("").trim().to_string();
        let raw_state = normalize_string_value(cells[2].unwrap_or(""));
        let state_name = if raw_state.is_empty() {
            last_state.clone().unwrap_or_default()
        } else {
            last_state = Some(raw_state.clone());
            raw_state
        };
        let fee_area = cells[3].unwrap_or("").trim().to_string();
        let county_names = if line.len() > LOCALITY_COUNTY_TAIL_START {
            line[LOCALITY_COUNTY_TAIL_START..].trim().to_string()
        } else {
            String::new()
        };

        frame.push_row(vec![
            Value::Str(mac.to_string()),
            Value::Str(locality_code),
            Value::Str(state_name),
            Value::Str(fee_area),
            Value::Str(county_names),
        ])?;
    }
    metrics.skiprows_dynamic = skipped;
    metrics.total_rows = frame.len();

    normalize_string_columns(&mut frame, true);
    log_duplicate_keys(&frame, &mut metrics);

    let rejects = RejectFrame::new(frame.columns().to_vec());
    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

/// Duplicates are expected in the published file; record them so the
/// normalizer's dedup can be audited, but keep every row.
fn log_duplicate_keys(frame: &Frame, metrics: &mut ParseMetrics) {
    let (Some(mac_idx), Some(loc_idx)) = (
        frame.column_index("mac"),
        frame.column_index("locality_code"),
    ) else {
        return;
    };
    let mut seen: std::collections::BTreeMap<(String, String), usize> =
        std::collections::BTreeMap::new();
    for row in frame.rows() {
        let key = (row[mac_idx].to_string(), row[loc_idx].to_string());
        *seen.entry(key).or_default() += 1;
    }
    let duplicates: Vec<String> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|((mac, loc), count)| format!("({mac}, {loc}) x{count}"))
        .collect();
    if !duplicates.is_empty() {
        metrics.record("natural_key_duplicates", serde_json::json!(duplicates));
    }
}
