//! Frame finalization: deterministic ordering and the join invariant.

use std::cmp::Ordering;

use cmspipe_schema::SchemaContract;
use cmspipe_types::PipelineError;

use crate::frame::{Frame, ParseResult, RejectFrame};
use crate::metrics::ParseMetrics;

/// Sort the data by natural key (ties broken by the remaining data
/// columns, then by original position via stable sort), fill the
/// count metrics, and assert the join invariant before returning the
/// final [`ParseResult`].
pub fn finalize(
    mut data: Frame,
    rejects: RejectFrame,
    contract: &SchemaContract,
    mut metrics: ParseMetrics,
) -> Result<ParseResult, PipelineError> {
    let key_indices: Vec<usize> = contract
        .natural_keys
        .iter()
        .filter_map(|name| data.column_index(name))
        .collect();
    let data_indices: Vec<usize> = contract
        .column_order
        .iter()
        .filter_map(|name| data.column_index(name))
        .filter(|idx| !key_indices.contains(idx))
        .collect();

    data.sort_rows_by(|a, b| {
        for &idx in &key_indices {
            match a[idx].cmp_canonical(&b[idx]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        for &idx in &data_indices {
            match a[idx].cmp_canonical(&b[idx]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    });

    metrics.set_counts(data.len(), rejects.len());

    if metrics.total_rows != data.len() + rejects.len() {
        return Err(PipelineError::Internal(format!(
            "join invariant violated for {}: total_rows {} != data {} + rejects {}",
            contract.schema_id(),
            metrics.total_rows,
            data.len(),
            rejects.len()
        )));
    }

    Ok(ParseResult {
        data,
        rejects,
        metrics,
    })
}
