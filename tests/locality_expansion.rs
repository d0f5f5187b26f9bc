//! Two-stage locality normalization: layout-faithful parse feeding
//! the ALL-COUNTIES-EXCEPT expansion.

use cmspipe::{normalize_locality_fips, FipsReference, NormalizeOptions, SchemaRegistry};
use cmspipe_fips::CountyRef;
use cmspipe_kit::metadata::MetadataContext;
use cmspipe_parsers::{locality, LayoutRegistry};
use cmspipe_types::Value;

fn ctx() -> MetadataContext {
    MetadataContext {
        release_id: "rvu25a".into(),
        vintage_date: "2025-01-01".into(),
        product_year: 2025,
        quarter_vintage: "2025Q1".into(),
        source_filename: "25LOCCO.txt".into(),
        source_file_sha256: "ee".repeat(32),
    }
}

fn california_reference() -> FipsReference {
    FipsReference::from_records(
        "2023",
        vec![
            CountyRef::new("06", "037", "LOS ANGELES", "County"),
            CountyRef::new("06", "059", "ORANGE", "County"),
            CountyRef::new("06", "075", "SAN FRANCISCO", "County"),
            CountyRef::new("06", "081", "SAN MATEO", "County"),
            CountyRef::new("06", "041", "MARIN", "County"),
            CountyRef::new("06", "085", "SANTA CLARA", "County"),
        ],
    )
}

fn locco_line(mac: &str, loc: &str, state: &str, fee_area: &str, counties: &str) -> String {
    format!("{mac} {loc:<2}  {state:<20}{fee_area:<35}{counties}")
}

#[test]
fn all_counties_except_expands_to_remaining_counties() {
    let text = format!(
        "LOCALITY COUNTY CROSSWALK\n{}\n",
        locco_line(
            "01112",
            "26",
            "CALIFORNIA",
            "REST OF CALIFORNIA",
            "ALL COUNTIES EXCEPT LOS ANGELES, ORANGE",
        )
    );

    // Stage 1: layout-faithful, names only.
    let stage1 = locality::parse(
        text.as_bytes(),
        &ctx(),
        &SchemaRegistry::builtin(),
        &LayoutRegistry::builtin(),
    )
    .unwrap();
    assert_eq!(stage1.data.len(), 1);
    assert_eq!(
        stage1.data.value(0, "county_names"),
        Some(&Value::Str(
            "ALL COUNTIES EXCEPT LOS ANGELES, ORANGE".into()
        ))
    );

    // Stage 2: FIPS expansion.
    let result = normalize_locality_fips(
        &stage1.data,
        &california_reference(),
        &NormalizeOptions::default(),
        &ctx(),
        &SchemaRegistry::builtin(),
    )
    .unwrap();

    // Six CA counties minus Los Angeles (06037) and Orange (06059).
    assert_eq!(result.data.len(), 4);
    assert!(result.rejects.is_empty());

    let fips_idx = result.data.column_index("county_fips").unwrap();
    let emitted: Vec<String> = result
        .data
        .rows()
        .iter()
        .map(|r| r[fips_idx].to_string())
        .collect();
    assert!(!emitted.contains(&"037".to_string()));
    assert!(!emitted.contains(&"059".to_string()));

    for row_idx in 0..result.data.len() {
        assert_eq!(
            result.data.value(row_idx, "state_fips"),
            Some(&Value::Str("06".into()))
        );
        assert_eq!(
            result.data.value(row_idx, "expansion_method"),
            Some(&Value::Str("all_counties_except".into()))
        );
        assert_eq!(
            result.data.value(row_idx, "mac"),
            Some(&Value::Str("01112".into()))
        );
        assert_eq!(
            result.data.value(row_idx, "locality_code"),
            Some(&Value::Str("26".into()))
        );
        // Every output row is hashed like any parser output.
        match result.data.value(row_idx, "row_content_hash") {
            Some(Value::Str(h)) => {
                assert_eq!(h.len(), 64);
                assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
            }
            other => panic!("missing row hash: {other:?}"),
        }
    }
}

#[test]
fn no_nulls_in_fips_columns_and_output_is_sorted() {
    let text = format!(
        "{}\n{}\n",
        locco_line("01112", "05", "CALIFORNIA", "BAY AREA", "SAN FRANCISCO/SAN MATEO"),
        locco_line("01112", "07", "", "SOUTH BAY", "SANTA CLARA"),
    );
    let stage1 = locality::parse(
        text.as_bytes(),
        &ctx(),
        &SchemaRegistry::builtin(),
        &LayoutRegistry::builtin(),
    )
    .unwrap();

    let result = normalize_locality_fips(
        &stage1.data,
        &california_reference(),
        &NormalizeOptions::default(),
        &ctx(),
        &SchemaRegistry::builtin(),
    )
    .unwrap();

    assert_eq!(result.data.len(), 3);
    let state_idx = result.data.column_index("state_fips").unwrap();
    let county_idx = result.data.column_index("county_fips").unwrap();
    let mut previous = None;
    for row in result.data.rows() {
        assert!(!row[state_idx].is_null());
        assert!(!row[county_idx].is_null());
        let key = (row[state_idx].to_string(), row[county_idx].to_string());
        if let Some(prev) = previous {
            assert!(prev <= key, "output not sorted: {prev:?} then {key:?}");
        }
        previous = Some(key);
    }
}
