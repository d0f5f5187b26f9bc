//! Built-in schema contracts for the published CMS datasets.

use std::collections::BTreeMap;

use cmspipe_types::Severity;

use crate::contract::{ColumnSpec, SchemaContract};

/// US postal state codes accepted by the domain validators: the 50
/// states plus DC and the CMS-covered territories.
pub const US_STATE_CODES: [&str; 56] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC", "PR", "VI", "AS", "GU", "MP",
];

/// RVU status indicators carried by PPRRVU rows.
const PPRRVU_STATUS_CODES: [&str; 16] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "M", "N", "P", "R", "T", "X",
];

/// Global-surgery day indicators.
const GLOBAL_DAYS: [&str; 8] = ["000", "010", "090", "XXX", "YYY", "ZZZ", "MMM", "PPP"];

/// Physician supervision codes.
const SUPERVISION_CODES: [&str; 13] = [
    "01", "02", "03", "04", "05", "06", "09", "21", "22", "66", "6A", "77", "7A",
];

/// Registry of the built-in schema contracts, keyed by dataset name.
///
/// The registry is constructed once at startup and injected into
/// every component that needs contracts; there is no ambient global.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    contracts: BTreeMap<String, SchemaContract>,
}

impl SchemaRegistry {
    /// Registry holding the contracts for every dataset this
    /// pipeline publishes.
    #[must_use]
    pub fn builtin() -> Self {
        let mut contracts = BTreeMap::new();
        for contract in [
            pprrvu(),
            gpci(),
            locality_raw(),
            locality_fips(),
            conversion_factor(),
            zip5_locality(),
            zip9_override(),
        ] {
            contracts.insert(contract.dataset.clone(), contract);
        }
        Self { contracts }
    }

    #[must_use]
    pub fn get(&self, dataset: &str) -> Option<&SchemaContract> {
        self.contracts.get(dataset)
    }

    #[must_use]
    pub fn get_by_id(&self, schema_id: &str) -> Option<&SchemaContract> {
        self.contracts.values().find(|c| c.schema_id() == schema_id)
    }

    #[must_use]
    pub fn datasets(&self) -> Vec<&str> {
        self.contracts.keys().map(String::as_str).collect()
    }
}

fn base(dataset: &str, description: &str) -> SchemaContract {
    SchemaContract {
        dataset: dataset.to_string(),
        major: 1,
        minor: 0,
        description: description.to_string(),
        source: "https://www.cms.gov/medicare/payment/fee-schedules".to_string(),
        classification: "public".to_string(),
        license: "public-domain".to_string(),
        attribution_required: true,
        columns: Vec::new(),
        natural_keys: Vec::new(),
        column_order: Vec::new(),
    }
}

fn with_order(mut contract: SchemaContract, columns: Vec<ColumnSpec>, keys: &[&str]) -> SchemaContract {
    contract.column_order = columns.iter().map(|c| c.name.clone()).collect();
    contract.columns = columns;
    contract.natural_keys = keys.iter().map(ToString::to_string).collect();
    contract
}

fn pprrvu() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("hcpcs", "HCPCS procedure code").with_pattern("^[A-Z0-9]{5}$"),
        ColumnSpec::string("modifier", "HCPCS modifier").nullable(),
        ColumnSpec::string("description", "Short procedure description").non_critical(),
        ColumnSpec::string("status_code", "RVU status indicator").with_domain(&PPRRVU_STATUS_CODES),
        ColumnSpec::decimal("work_rvu", "Physician work RVU", 2).nullable(),
        ColumnSpec::decimal("pe_rvu_nonfac", "Non-facility practice expense RVU", 2).nullable(),
        ColumnSpec::decimal("pe_rvu_fac", "Facility practice expense RVU", 2).nullable(),
        ColumnSpec::decimal("mp_rvu", "Malpractice RVU", 2).nullable(),
        ColumnSpec::string("na_indicator", "Non-facility NA indicator").nullable(),
        ColumnSpec::string("global_days", "Global surgery period").with_domain(&GLOBAL_DAYS).nullable(),
        ColumnSpec::string("supervision_code", "Physician supervision requirement")
            .with_domain(&SUPERVISION_CODES)
            .with_domain_severity(Severity::Warn)
            .nullable(),
        ColumnSpec::date("effective_from", "First date the row applies"),
        ColumnSpec::date("effective_to", "Last date the row applies").nullable(),
    ];
    with_order(
        base("pprrvu", "Physician fee schedule relative value units"),
        columns,
        &["hcpcs", "modifier", "effective_from"],
    )
}

fn gpci() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("mac", "Medicare administrative contractor id"),
        ColumnSpec::string("state", "State postal code")
            .with_domain(&US_STATE_CODES)
            .nullable(),
        ColumnSpec::string("locality_code", "CMS locality code").with_pattern("^\\d+$"),
        ColumnSpec::string("locality_name", "Locality display name").non_critical(),
        ColumnSpec::decimal("work_gpci", "Work geographic practice cost index", 3),
        ColumnSpec::decimal("pe_gpci", "Practice expense GPCI", 3),
        ColumnSpec::decimal("mp_gpci", "Malpractice GPCI", 3),
        ColumnSpec::date("effective_from", "First date the row applies"),
        ColumnSpec::date("effective_to", "Last date the row applies").nullable(),
    ];
    with_order(
        base("gpci", "Geographic practice cost indices by locality"),
        columns,
        &["locality_code", "effective_from"],
    )
}

fn locality_raw() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("mac", "Medicare administrative contractor id"),
        ColumnSpec::string("locality_code", "CMS locality code"),
        ColumnSpec::string("state_name", "State display name, forward-filled"),
        ColumnSpec::string("fee_area", "Fee schedule area description").nullable(),
        ColumnSpec::string("county_names", "Raw county list or set expression").nullable(),
    ];
    with_order(
        base(
            "locality_raw",
            "Layout-faithful locality-to-county rows before FIPS expansion",
        ),
        columns,
        &["mac", "locality_code"],
    )
}

fn locality_fips() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("state_fips", "Two-digit state FIPS").with_pattern("^\\d{2}$"),
        ColumnSpec::string("county_fips", "Three-digit county FIPS").with_pattern("^\\d{3}$"),
        ColumnSpec::string("mac", "Medicare administrative contractor id"),
        ColumnSpec::string("locality_code", "CMS locality code"),
        ColumnSpec::string("county_name_canonical", "Census canonical county name"),
        ColumnSpec::string("lsad", "Legal/statistical area descriptor").nullable(),
        ColumnSpec::string("fee_area", "Fee schedule area description").nullable(),
        ColumnSpec::string("match_method", "How the county name was matched")
            .with_domain(&["exact", "alias", "fuzzy", "expansion"]),
        ColumnSpec::string("expansion_method", "How the county set was expanded")
            .with_domain(&["explicit_list", "all_counties", "all_counties_except", "rest_of_state"]),
    ];
    with_order(
        base(
            "locality_fips",
            "FIPS-coded locality-to-county mapping, one row per county",
        ),
        columns,
        &["state_fips", "county_fips", "mac", "locality_code"],
    )
}

fn conversion_factor() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("cf_type", "Conversion factor type")
            .with_domain(&["physician", "anesthesia"]),
        ColumnSpec::decimal("cf_value", "Dollars per RVU", 4),
        ColumnSpec::date("effective_from", "First date the factor applies"),
        ColumnSpec::date("effective_to", "Last date the factor applies").nullable(),
    ];
    with_order(
        base("conversion_factor", "CMS published conversion factors"),
        columns,
        &["cf_type", "effective_from"],
    )
}

fn zip5_locality() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("zip5", "Five-digit ZIP code").with_pattern("^\\d{5}$"),
        ColumnSpec::string("state", "State postal code").with_domain(&US_STATE_CODES),
        ColumnSpec::string("locality", "CMS locality code").with_pattern("^\\d+$"),
        ColumnSpec::string("carrier_mac", "Carrier or MAC id").nullable(),
        ColumnSpec::string("rural_flag", "Rural indicator")
            .with_domain(&["R", "B"])
            .with_domain_severity(Severity::Warn)
            .nullable(),
        ColumnSpec::date("effective_from", "First date the mapping applies"),
        ColumnSpec::date("effective_to", "Last date the mapping applies").nullable(),
    ];
    with_order(
        base("zip5_locality", "ZIP5 to CMS state and locality mapping"),
        columns,
        &["zip5", "effective_from"],
    )
}

fn zip9_override() -> SchemaContract {
    let columns = vec![
        ColumnSpec::string("zip9_low", "Inclusive lower ZIP9 bound").with_pattern("^\\d{9}$"),
        ColumnSpec::string("zip9_high", "Inclusive upper ZIP9 bound").with_pattern("^\\d{9}$"),
        ColumnSpec::string("state", "State postal code").with_domain(&US_STATE_CODES),
        ColumnSpec::string("locality", "CMS locality code").with_pattern("^\\d+$"),
        ColumnSpec::string("rural_flag", "Rural indicator")
            .with_domain(&["R", "B"])
            .with_domain_severity(Severity::Warn)
            .nullable(),
        ColumnSpec::date("effective_from", "First date the override applies"),
        ColumnSpec::date("effective_to", "Last date the override applies").nullable(),
    ];
    with_order(
        base("zip9_override", "ZIP9 range overrides for locality assignment"),
        columns,
        &["zip9_low", "effective_from"],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_all_datasets() {
        let r = SchemaRegistry::builtin();
        for dataset in [
            "pprrvu",
            "gpci",
            "locality_raw",
            "locality_fips",
            "conversion_factor",
            "zip5_locality",
            "zip9_override",
        ] {
            assert!(r.get(dataset).is_some(), "missing contract: {dataset}");
        }
    }

    #[test]
    fn lookup_by_schema_id() {
        let r = SchemaRegistry::builtin();
        let c = r.get_by_id("conversion_factor_v1.0").unwrap();
        assert_eq!(c.dataset, "conversion_factor");
    }

    #[test]
    fn column_order_covers_every_column() {
        let r = SchemaRegistry::builtin();
        for dataset in r.datasets() {
            let c = r.get(dataset).unwrap();
            assert_eq!(c.column_order.len(), c.columns.len(), "{dataset}");
            for key in &c.natural_keys {
                assert!(c.column(key).is_some(), "{dataset} key {key}");
            }
        }
    }

    #[test]
    fn cf_value_is_four_decimal_places() {
        let r = SchemaRegistry::builtin();
        let c = r.get("conversion_factor").unwrap();
        assert_eq!(c.column("cf_value").unwrap().precision, Some(4));
    }

    #[test]
    fn state_domain_has_fifty_six_entries() {
        assert_eq!(US_STATE_CODES.len(), 56);
    }
}
