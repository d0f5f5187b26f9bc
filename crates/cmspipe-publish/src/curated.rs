//! Curated dataset artifacts and the quarantine tree.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use tracing::info;

use cmspipe_kit::frame::{Frame, ParseResult, RejectFrame};
use cmspipe_schema::SchemaContract;
use cmspipe_types::atomic_write::write_file_atomic;
use cmspipe_types::{PipelineError, Value};

use crate::parquet_out::write_parquet;

/// What publishing one dataset produced.
#[derive(Debug, Clone)]
pub struct PublishedDataset {
    pub dataset: String,
    pub parquet_path: Utf8PathBuf,
    pub row_count: usize,
    pub quarantine_paths: Vec<Utf8PathBuf>,
}

/// Write `curated/<dataset>/<release_id>/<dataset>.parquet` plus its
/// README, and quarantine any rejects.
pub fn publish_dataset(
    output_dir: &Utf8Path,
    release_id: &str,
    result: &ParseResult,
    contract: &SchemaContract,
) -> Result<PublishedDataset, PipelineError> {
    let dataset_dir = output_dir
        .join("curated")
        .join(&contract.dataset)
        .join(release_id);
    let parquet_path = dataset_dir.join(format!("{}.parquet", contract.dataset));

    write_parquet(&parquet_path, &result.data, Some(contract))?;
    write_file_atomic(&dataset_dir.join("README.md"), &readme(release_id, result, contract))?;

    let quarantine_paths = write_quarantine(output_dir, release_id, &result.rejects, contract)?;
    info!(
        dataset = %contract.dataset,
        rows = result.data.len(),
        rejects = result.rejects.len(),
        "published dataset"
    );

    Ok(PublishedDataset {
        dataset: contract.dataset.clone(),
        parquet_path,
        row_count: result.data.len(),
        quarantine_paths,
    })
}

/// Write `quarantine/<release_id>/<dataset>_<reason>.parquet`, one
/// file per distinct rule id.
pub fn write_quarantine(
    output_dir: &Utf8Path,
    release_id: &str,
    rejects: &RejectFrame,
    contract: &SchemaContract,
) -> Result<Vec<Utf8PathBuf>, PipelineError> {
    if rejects.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_rule: BTreeMap<&str, Vec<&cmspipe_kit::frame::Reject>> = BTreeMap::new();
    for reject in &rejects.rejects {
        by_rule.entry(reject.rule_id.as_str()).or_default().push(reject);
    }

    let quarantine_dir = output_dir.join("quarantine").join(release_id);
    let mut paths = Vec::new();
    for (rule_id, group) in by_rule {
        let mut columns = rejects.columns.clone();
        columns.extend(
            [
                "validation_rule_id",
                "validation_severity",
                "validation_error",
                "schema_id",
                "release_id",
                "row_id",
            ]
            .map(String::from),
        );
        let mut frame = Frame::new(columns);
        for reject in group {
            let mut row = reject.row.clone();
            row.push(Value::Str(reject.rule_id.clone()));
            row.push(Value::Str(reject.severity.as_str().to_string()));
            row.push(Value::Str(reject.error.clone()));
            row.push(Value::Str(contract.schema_id()));
            row.push(Value::Str(release_id.to_string()));
            row.push(Value::Int(reject.row_id as i64));
            frame.push_row(row)?;
        }

        let reason = rule_id.to_lowercase();
        let path = quarantine_dir.join(format!("{}_{reason}.parquet", contract.dataset));
        write_parquet(&path, &frame, None)?;
        paths.push(path);
    }
    Ok(paths)
}

fn readme(release_id: &str, result: &ParseResult, contract: &SchemaContract) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", contract.dataset));
    out.push_str(&format!("{}\n\n", contract.description));
    out.push_str(&format!("- Release: `{release_id}`\n"));
    out.push_str(&format!("- Schema: `{}`\n", contract.schema_id()));
    out.push_str(&format!("- Rows: {}\n", result.data.len()));
    out.push_str(&format!("- Rejected rows: {}\n", result.rejects.len()));
    out.push_str(&format!(
        "- Generated: {}\n",
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("- License: {}", contract.license));
    if contract.attribution_required {
        out.push_str(" (attribution required)");
    }
    out.push('\n');
    out.push_str("\n## Columns\n\n");
    for column in &contract.columns {
        out.push_str(&format!(
            "- `{}` ({}{}): {}\n",
            column.name,
            column.ty.as_str(),
            if column.nullable { ", nullable" } else { "" },
            column.description
        ));
    }
    out
}
