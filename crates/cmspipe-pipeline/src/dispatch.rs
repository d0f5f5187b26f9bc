//! Dataset-name → parser dispatch.

use cmspipe_kit::metadata::MetadataContext;
use cmspipe_kit::ParseResult;
use cmspipe_parsers::{conversion_factor, gpci, locality, pprrvu, zip9, zip_locality, LayoutRegistry};
use cmspipe_schema::SchemaRegistry;
use cmspipe_types::{InputError, PipelineError};

/// Parse one landed file through the parser registered for its
/// dataset.
pub fn parse_dataset(
    dataset: &str,
    bytes: &[u8],
    ctx: &MetadataContext,
    registry: &SchemaRegistry,
    layouts: &LayoutRegistry,
) -> Result<ParseResult, PipelineError> {
    match dataset {
        "conversion_factor" => conversion_factor::parse(bytes, ctx, registry),
        "gpci" => gpci::parse(bytes, ctx, registry, layouts),
        "pprrvu" => pprrvu::parse(bytes, ctx, registry, layouts),
        "locality_raw" => locality::parse(bytes, ctx, registry, layouts),
        "zip5_locality" => zip_locality::parse(bytes, ctx, registry, layouts),
        "zip9_override" => zip9::parse(bytes, ctx, registry, layouts),
        other => Err(InputError::UnknownDataset {
            dataset: other.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dataset_is_an_input_error() {
        let ctx = MetadataContext {
            release_id: "r".into(),
            vintage_date: "2025-01-01".into(),
            product_year: 2025,
            quarter_vintage: "2025Q1".into(),
            source_filename: "f.csv".into(),
            source_file_sha256: "ab".repeat(32),
        };
        let err = parse_dataset(
            "mystery",
            b"",
            &ctx,
            &SchemaRegistry::builtin(),
            &LayoutRegistry::builtin(),
        )
        .unwrap_err();
        assert_eq!(err.error_type(), "input_error");
    }
}
