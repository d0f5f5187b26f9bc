//! Deterministic row content hashing.

use sha2::{Digest, Sha256};

use cmspipe_schema::SchemaContract;
use cmspipe_types::{PipelineError, RoundingMode, Value};

use crate::frame::Frame;

/// Separator between canonicalized values in the hash input. The
/// unit separator cannot appear in a normalized value; string
/// normalization strips it.
pub const HASH_SEPARATOR: char = '\u{1f}';

/// Compute the content hash for one row: SHA-256 over the canonical
/// renderings of the columns in `contract.column_order`, joined with
/// the reserved separator. Metadata columns are never included, so
/// re-parsing under a different release id yields identical hashes.
#[must_use]
pub fn row_content_hash(row: &[Value], frame: &Frame, contract: &SchemaContract) -> String {
    let mut hasher = Sha256::new();
    let mut first = true;
    for name in &contract.column_order {
        if !first {
            let mut buf = [0u8; 4];
            hasher.update(HASH_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        first = false;
        let rendered = match frame.column_index(name) {
            Some(idx) => {
                let spec = contract.column(name);
                let precision = spec.and_then(|s| s.precision);
                let rounding = spec
                    .and_then(|s| s.rounding)
                    .unwrap_or(RoundingMode::HalfUp);
                row[idx].canonical_render(precision, rounding)
            }
            None => String::new(),
        };
        hasher.update(rendered.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Compute hashes for every row in the frame, in row order.
pub fn compute_row_hashes(
    frame: &Frame,
    contract: &SchemaContract,
) -> Result<Vec<String>, PipelineError> {
    let mut hashes = Vec::with_capacity(frame.len());
    for row in frame.rows() {
        let hash = row_content_hash(row, frame, contract);
        debug_assert_eq!(hash.len(), 64);
        hashes.push(hash);
    }
    Ok(hashes)
}
