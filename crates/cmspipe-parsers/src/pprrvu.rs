//! PPRRVU parser (fixed-width TXT or CSV).

use std::sync::LazyLock;

use regex::Regex;

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
use crate::readers::{looks_fixed_width, read_delimited, read_fixed_width};
use crate::template::{apply_aliases, conform_to_contract, default_effective_from, parse_quarter_vintage};

pub const PARSER_VERSION: &str = "1.3.0";

static HCPCS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Z0-9]{5}$").expect("static regex"));

const ALIASES: &[(&str, &str)] = &[
    ("procedure code", "hcpcs"),
    ("hcpcs code", "hcpcs"),
    ("cpt", "hcpcs"),
    ("mod", "modifier"),
    ("status", "status_code"),
    ("status indicator", "status_code"),
    ("work rvu", "work_rvu"),
    ("non-fac pe rvu", "pe_rvu_nonfac"),
    ("non fac pe rvu", "pe_rvu_nonfac"),
    ("fac pe rvu", "pe_rvu_fac"),
    ("facility pe rvu", "pe_rvu_fac"),
    ("mp rvu", "mp_rvu"),
    ("malpractice rvu", "mp_rvu"),
    ("na indicator", "na_indicator"),
    ("glob days", "global_days"),
    ("global", "global_days"),
    ("physician supervision", "supervision_code"),
];

/// Parse a PPRRVU publication.
pub fn parse(
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    ctx.require().map_err(PipelineError::Parse)?;
    let contract = registry
        .get("pprrvu")
        .ok_or_else(|| PipelineError::Internal("pprrvu contract missing".into()))?;

    let mut metrics = ParseMetrics::new(PARSER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

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

    let mut frame = if looks_fixed_width(&decoded.text) {
        let (year, quarter) = parse_quarter_vintage(&ctx.quarter_vintage, ctx.product_year);
        let layout = layouts
            .get(LayoutKey::Pprrvu, year, quarter)
            .ok_or_else(|| {
                PipelineError::Parse(ParseError::Malformed {
                    filename: ctx.source_filename.clone(),
                    reason: format!("no PPRRVU layout registered at or before {year}.{quarter}"),
                })
            })?;
        metrics.layout_version = Some(layout.version.clone());
        // Banner and column-header lines never start with a code.
        let read = read_fixed_width(&decoded.text, layout, |line| {
            line.len() >= 5 && HCPCS_RE.is_match(&line[..5])
        });
        metrics.skiprows_dynamic = read.skipped_short;
        read.frame
    } else {
        read_delimited(&decoded.text, &ctx.source_filename).map_err(PipelineError::Parse)?
    };
    metrics.total_rows = frame.len();

    apply_aliases(&mut frame, ALIASES);
    normalize_string_columns(&mut frame, true);
    default_effective_from(&mut frame, ctx);
    conform_to_contract(&mut frame, contract).map_err(PipelineError::Parse)?;

    let mut rejects = RejectFrame::new(frame.columns().to_vec());
    reject_malformed_hcpcs(&mut frame, &mut rejects);
    enforce_domains(&mut frame, contract, &mut rejects, &mut metrics);
    cast_frame(&mut frame, contract, &mut rejects);
    check_natural_keys(&mut frame, contract, Severity::Block, &mut rejects)
        .map_err(PipelineError::Parse)?;

    record_counts_by_status(&frame, &mut metrics);
    inject_metadata(&mut frame, contract, ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(frame, rejects, contract, metrics)
}

/// HCPCS must be exactly five uppercase alphanumerics; anything else
/// rejects the row outright.
fn reject_malformed_hcpcs(frame: &mut Frame, rejects: &mut RejectFrame) {
    let Some(idx) = frame.column_index("hcpcs") else {
        return;
    };
    let removed = frame.drain_failing(|_, row| {
        matches!(&row[idx], Value::Str(s) if HCPCS_RE.is_match(s))
    });
    for (row_id, row) in removed {
        let rendered = row[idx].to_string();
        rejects.push(
            row,
            row_id,
            "HCPCS_FORMAT",
            Severity::Block,
            format!("HCPCS {rendered:?} does not match ^[A-Z0-9]{{5}}$"),
        );
    }
}

fn record_counts_by_status(frame: &Frame, metrics: &mut ParseMetrics) {
    let Some(idx) = frame.column_index("status_code") else {
        return;
    };
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for row in frame.rows() {
        if let Value::Str(s) = &row[idx] {
            *counts.entry(s.clone()).or_default() += 1;
        }
    }
    metrics.record(
        "row_count_by_status",
        serde_json::to_value(counts).unwrap_or_default(),
    );
}
