//! Metadata injection: the columns every published row carries about
//! its provenance.

use chrono::{DateTime, Utc};

use cmspipe_schema::SchemaContract;
use cmspipe_types::{ParseError, PipelineError, Value};

use crate::frame::Frame;
use crate::hash::compute_row_hashes;

/// Provenance context for one source file within one release.
///
/// Everything here is excluded from row content hashes; two runs over
/// the same bytes under different release ids produce identical
/// hashes.
#[derive(Debug, Clone)]
pub struct MetadataContext {
    pub release_id: String,
    pub vintage_date: String,
    pub product_year: i64,
    pub quarter_vintage: String,
    pub source_filename: String,
    pub source_file_sha256: String,
}

impl MetadataContext {
    /// Preflight the required metadata; parsers call this first.
    pub fn require(&self) -> Result<(), ParseError> {
        if self.release_id.is_empty() {
            return Err(ParseError::MissingMetadata { field: "release_id" });
        }
        if self.vintage_date.is_empty() {
            return Err(ParseError::MissingMetadata {
                field: "vintage_date",
            });
        }
        if self.source_filename.is_empty() {
            return Err(ParseError::MissingMetadata {
                field: "source_filename",
            });
        }
        if self.source_file_sha256.is_empty() {
            return Err(ParseError::MissingMetadata {
                field: "source_file_sha256",
            });
        }
        Ok(())
    }
}

/// Append the metadata columns (including the row content hash) to a
/// validated frame. Hashes are computed strictly from the data
/// columns in the contract's order, before anything here lands in the
/// frame.
pub fn inject_metadata(
    frame: &mut Frame,
    contract: &SchemaContract,
    ctx: &MetadataContext,
    parsed_at: DateTime<Utc>,
) -> Result<(), PipelineError> {
    let hashes = compute_row_hashes(frame, contract)?;

    frame.add_constant_column("release_id", Value::Str(ctx.release_id.clone()));
    frame.add_constant_column("vintage_date", Value::Str(ctx.vintage_date.clone()));
    frame.add_constant_column("product_year", Value::Int(ctx.product_year));
    frame.add_constant_column("quarter_vintage", Value::Str(ctx.quarter_vintage.clone()));
    frame.add_constant_column("source_filename", Value::Str(ctx.source_filename.clone()));
    frame.add_constant_column(
        "source_file_sha256",
        Value::Str(ctx.source_file_sha256.clone()),
    );
    frame.add_constant_column(
        "parsed_at",
        Value::Str(parsed_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    );
    frame.add_constant_column("schema_id", Value::Str(contract.schema_id()));
    frame.add_column(
        "row_content_hash",
        hashes.into_iter().map(Value::Str).collect(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::{ColumnSpec, METADATA_COLUMNS};

    fn contract() -> SchemaContract {
        SchemaContract {
            dataset: "t".into(),
            major: 1,
            minor: 0,
            description: String::new(),
            source: String::new(),
            classification: "public".into(),
            license: "public-domain".into(),
            attribution_required: false,
            columns: vec![ColumnSpec::string("k", "")],
            natural_keys: vec!["k".into()],
            column_order: vec!["k".into()],
        }
    }

    fn ctx(release: &str) -> MetadataContext {
        MetadataContext {
            release_id: release.into(),
            vintage_date: "2025-01-01".into(),
            product_year: 2025,
            quarter_vintage: "2025Q1".into(),
            source_filename: "CF2025.csv".into(),
            source_file_sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn require_rejects_empty_release() {
        let mut c = ctx("");
        assert!(c.require().is_err());
        c.release_id = "rvu25a".into();
        assert!(c.require().is_ok());
    }

    #[test]
    fn all_metadata_columns_are_appended() {
        let c = contract();
        let mut f = Frame::new(vec!["k".into()]);
        f.push_row(vec![Value::Str("a".into())]).unwrap();
        inject_metadata(&mut f, &c, &ctx("rvu25a"), Utc::now()).unwrap();
        for col in METADATA_COLUMNS {
            assert!(f.column_index(col).is_some(), "missing {col}");
        }
    }

    #[test]
    fn hash_is_independent_of_release_metadata() {
        let c = contract();
        let mut a = Frame::new(vec!["k".into()]);
        a.push_row(vec![Value::Str("x".into())]).unwrap();
        let mut b = a.clone();
        inject_metadata(&mut a, &c, &ctx("release-one"), Utc::now()).unwrap();
        inject_metadata(&mut b, &c, &ctx("release-two"), Utc::now()).unwrap();
        assert_eq!(a.value(0, "row_content_hash"), b.value(0, "row_content_hash"));
        assert_ne!(a.value(0, "release_id"), b.value(0, "release_id"));
    }
}
