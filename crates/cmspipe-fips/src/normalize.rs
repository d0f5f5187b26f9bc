//! The stage-2 normalizer: raw locality rows → FIPS-coded rows.

use std::collections::{BTreeMap, BTreeSet};

use cmspipe_kit::finalize::finalize;
use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_kit::metadata::{inject_metadata, MetadataContext};
use cmspipe_kit::metrics::ParseMetrics;
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{PipelineError, Severity, Value};

use crate::expand::{parse_county_expr, CountySetExpr};
use crate::matcher::{match_county, MatchMethod};
use crate::reference::{CountyRef, FipsReference};
use crate::state::resolve_state;

pub const NORMALIZER_VERSION: &str = "2.0.0";

/// Options for a normalization run.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Enable the fuzzy matching tier.
    pub use_fuzzy: bool,
    /// Override the release id recorded on output rows.
    pub source_release_id: Option<String>,
}

struct RawRow {
    mac: String,
    locality_code: String,
    state_name: String,
    fee_area: Option<String>,
    county_names: String,
    row_id: usize,
    original: Vec<Value>,
}

/// Expand stage-1 rows into one canonical row per
/// `(mac, locality_code, state_fips, county_fips)`.
///
/// Rows that cannot be resolved are quarantined with a structured
/// reason; everything that resolves is sorted, hashed, and stamped
/// like any other parser output.
pub fn normalize_locality_fips(
    stage1: &Frame,
    reference: &FipsReference,
    opts: &NormalizeOptions,
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
) -> Result<ParseResult, PipelineError> {
    let contract = registry
        .get("locality_fips")
        .ok_or_else(|| PipelineError::Internal("locality_fips contract missing".into()))?;

    let mut metrics = ParseMetrics::new(NORMALIZER_VERSION, &contract.schema_id());
    let started = std::time::Instant::now();

    let mut ctx = ctx.clone();
    if let Some(release) = &opts.source_release_id {
        ctx.release_id = release.clone();
    }

    let rows = collect_raw_rows(stage1)?;
    let input_count = rows.len();
    let rows = dedup_rows(rows, &mut metrics);

    let mut rejects = RejectFrame::new(stage1.columns().to_vec());
    let mut emitted: BTreeSet<(String, String, String, String)> = BTreeSet::new();
    let mut out = Frame::new(contract.column_order.clone());

    // Pass 1: everything except REST OF, tracking which counties each
    // state's explicit localities claim.
    let mut claimed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut rest_rows: Vec<(&RawRow, String)> = Vec::new();

    for row in &rows {
        let Some((_, state_fips)) = resolve_state(&row.state_name) else {
            rejects.push(
                row.original.clone(),
                row.row_id,
                "unknown_state",
                Severity::Block,
                format!("state name {:?} did not resolve", row.state_name),
            );
            continue;
        };
        let candidates = reference.counties_for_state(state_fips);
        let expr = parse_county_expr(&row.county_names);

        match &expr {
            CountySetExpr::RestOfState => {
                rest_rows.push((row, state_fips.to_string()));
            }
            CountySetExpr::AllCounties => {
                for county in candidates {
                    push_output(&mut out, &mut emitted, row, county, "expansion", expr.method());
                }
            }
            CountySetExpr::AllExcept(excluded_names) => {
                match resolve_names(excluded_names, candidates, opts.use_fuzzy, row) {
                    Ok(excluded) => {
                        let excluded_fips: BTreeSet<&str> = excluded
                            .iter()
                            .map(|(c, _)| c.county_fips.as_str())
                            .collect();
                        for county in candidates {
                            if excluded_fips.contains(county.county_fips.as_str()) {
                                continue;
                            }
                            push_output(
                                &mut out,
                                &mut emitted,
                                row,
                                county,
                                "expansion",
                                expr.method(),
                            );
                            claimed
                                .entry(state_fips.to_string())
                                .or_default()
                                .insert(county.county_fips.clone());
                        }
                    }
                    Err(reason) => {
                        rejects.push(
                            row.original.clone(),
                            row.row_id,
                            reason.clone(),
                            Severity::Block,
                            format!("county exclusion failed: {reason}"),
                        );
                    }
                }
            }
            CountySetExpr::Explicit(names) => {
                match resolve_names(names, candidates, opts.use_fuzzy, row) {
                    Ok(matched) if !matched.is_empty() => {
                        for (county, method) in matched {
                            push_output(
                                &mut out,
                                &mut emitted,
                                row,
                                county,
                                method.as_str(),
                                expr.method(),
                            );
                            claimed
                                .entry(state_fips.to_string())
                                .or_default()
                                .insert(county.county_fips.clone());
                        }
                    }
                    Ok(_) => {
                        rejects.push(
                            row.original.clone(),
                            row.row_id,
                            "no_county_match",
                            Severity::Block,
                            "county list yielded zero matches".to_string(),
                        );
                    }
                    Err(reason) => {
                        rejects.push(
                            row.original.clone(),
                            row.row_id,
                            reason.clone(),
                            Severity::Block,
                            format!("county match failed: {reason}"),
                        );
                    }
                }
            }
        }
    }

    // Pass 2: REST OF <state> takes whatever the explicit localities
    // in that state did not claim.
    for (row, state_fips) in rest_rows {
        let candidates = reference.counties_for_state(&state_fips);
        let taken = claimed.get(&state_fips).cloned().unwrap_or_default();
        let mut any = false;
        for county in candidates {
            if taken.contains(&county.county_fips) {
                continue;
            }
            push_output(&mut out, &mut emitted, row, county, "expansion", "rest_of_state");
            any = true;
        }
        if !any {
            rejects.push(
                row.original.clone(),
                row.row_id,
                "no_county_match",
                Severity::Block,
                "rest-of-state expansion left no counties".to_string(),
            );
        }
    }

    metrics.record("input_rows", serde_json::json!(input_count));
    metrics.record("expanded_rows", serde_json::json!(out.len()));
    metrics.total_rows = out.len() + rejects.len();

    inject_metadata(&mut out, contract, &ctx, chrono::Utc::now())?;
    metrics.parse_duration_sec = started.elapsed().as_secs_f64();
    finalize(out, rejects, contract, metrics)
}

fn collect_raw_rows(stage1: &Frame) -> Result<Vec<RawRow>, PipelineError> {
    let col = |name: &str| {
        stage1
            .column_index(name)
            .ok_or_else(|| PipelineError::Internal(format!("stage-1 frame is missing {name}")))
    };
    let (mac_i, loc_i, state_i, fee_i, county_i) = (
        col("mac")?,
        col("locality_code")?,
        col("state_name")?,
        col("fee_area")?,
        col("county_names")?,
    );
    let as_string = |v: &Value| match v {
        Value::Str(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(stage1
        .rows()
        .iter()
        .enumerate()
        .map(|(row_id, row)| RawRow {
            mac: as_string(&row[mac_i]),
            locality_code: as_string(&row[loc_i]),
            state_name: as_string(&row[state_i]),
            fee_area: match &row[fee_i] {
                Value::Null => None,
                other => Some(as_string(other)),
            },
            county_names: as_string(&row[county_i]),
            row_id,
            original: row.clone(),
        })
        .collect())
}

/// Stage 1 preserves published duplicates; they collapse here.
fn dedup_rows(rows: Vec<RawRow>, metrics: &mut ParseMetrics) -> Vec<RawRow> {
    let mut seen: BTreeSet<(String, String, String, String, String)> = BTreeSet::new();
    let before = rows.len();
    let rows: Vec<RawRow> = rows
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.mac.clone(),
                r.locality_code.clone(),
                r.state_name.clone(),
                r.fee_area.clone().unwrap_or_default(),
                r.county_names.clone(),
            ))
        })
        .collect();
    let dropped = before - rows.len();
    if dropped > 0 {
        metrics.record("stage1_duplicates_collapsed", serde_json::json!(dropped));
    }
    rows
}

fn resolve_names<'a>(
    names: &[String],
    candidates: &'a [CountyRef],
    use_fuzzy: bool,
    row: &RawRow,
) -> Result<Vec<(&'a CountyRef, MatchMethod)>, String> {
    let mut matched = Vec::with_capacity(names.len());
    for name in names {
        match match_county(name, candidates, use_fuzzy, row.fee_area.as_deref()) {
            Ok(found) => matched.push(found),
            Err(failure) => return Err(failure.reason()),
        }
    }
    Ok(matched)
}

fn push_output(
    out: &mut Frame,
    emitted: &mut BTreeSet<(String, String, String, String)>,
    row: &RawRow,
    county: &CountyRef,
    match_method: &str,
    expansion_method: &str,
) {
    let key = (
        row.mac.clone(),
        row.locality_code.clone(),
        county.state_fips.clone(),
        county.county_fips.clone(),
    );
    if !emitted.insert(key) {
        return;
    }
    let fee_area = row
        .fee_area
        .as_ref()
        .map_or(Value::Null, |f| Value::Str(f.clone()));
    // Column order: state_fips, county_fips, mac, locality_code,
    // county_name_canonical, lsad, fee_area, match_method,
    // expansion_method.
    let _ = out.push_row(vec![
        Value::Str(county.state_fips.clone()),
        Value::Str(county.county_fips.clone()),
        Value::Str(row.mac.clone()),
        Value::Str(row.locality_code.clone()),
        Value::Str(county.name.clone()),
        Value::Str(county.lsad.clone()),
        fee_area,
        Value::Str(match_method.to_string()),
        Value::Str(expansion_method.to_string()),
    ]);
}
