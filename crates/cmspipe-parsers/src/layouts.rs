//! Fixed-width layout registry, versioned by year and quarter.
//!
//! CMS re-publishes these files every quarter; when a column moves or
//! widens the layout gets a major bump and the registry grows a new
//! entry. Lookups fall back to the most recent layout at or before
//! the requested vintage.

use std::collections::BTreeMap;

use cmspipe_schema::{ColumnType, LayoutColumn, LayoutSpec};

/// Datasets with registered fixed-width layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayoutKey {
    Gpci,
    Pprrvu,
    LocalityCounty,
    ZipRecord,
}

/// Registry of fixed-width layouts keyed by dataset and vintage.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: BTreeMap<(LayoutKey, u16, u8), LayoutSpec>,
}

impl LayoutRegistry {
    /// Registry with the layouts this pipeline ships.
    #[must_use]
    pub fn builtin() -> Self {
        let mut layouts = BTreeMap::new();
        layouts.insert((LayoutKey::Gpci, 2025, 1), gpci_2025());
        layouts.insert((LayoutKey::Pprrvu, 2025, 1), pprrvu_2025());
        layouts.insert((LayoutKey::LocalityCounty, 2025, 1), locality_county_2025());
        layouts.insert((LayoutKey::ZipRecord, 2025, 1), zip_record_2025());
        Self { layouts }
    }

    /// The layout for a dataset at or before the given vintage.
    #[must_use]
    pub fn get(&self, key: LayoutKey, year: u16, quarter: u8) -> Option<&LayoutSpec> {
        self.layouts
            .range(..=(key, year, quarter))
            .rev()
            .find(|((k, _, _), _)| *k == key)
            .map(|(_, layout)| layout)
    }
}

fn gpci_2025() -> LayoutSpec {
    LayoutSpec::new(
        2025,
        1,
        0,
        vec![
            LayoutColumn::new("mac", 0, 5, ColumnType::String),
            LayoutColumn::new("state", 6, 8, ColumnType::String),
            LayoutColumn::new("locality_code", 10, 12, ColumnType::String),
            LayoutColumn::new("locality_name", 14, 64, ColumnType::String),
            LayoutColumn::new("work_gpci", 64, 72, ColumnType::Float).with_precision(3),
            LayoutColumn::new("pe_gpci", 72, 80, ColumnType::Float).with_precision(3),
            LayoutColumn::new("mp_gpci", 80, 88, ColumnType::Float)
                .with_precision(3)
                .nullable(),
        ],
    )
}

fn pprrvu_2025() -> LayoutSpec {
    LayoutSpec::new(
        2025,
        1,
        0,
        vec![
            LayoutColumn::new("hcpcs", 0, 5, ColumnType::String),
            LayoutColumn::new("modifier", 5, 7, ColumnType::String).nullable(),
            LayoutColumn::new("description", 7, 57, ColumnType::String).nullable(),
            LayoutColumn::new("status_code", 57, 58, ColumnType::String),
            LayoutColumn::new("work_rvu", 58, 66, ColumnType::Float)
                .with_precision(2)
                .nullable(),
            LayoutColumn::new("pe_rvu_nonfac", 66, 74, ColumnType::Float)
                .with_precision(2)
                .nullable(),
            LayoutColumn::new("pe_rvu_fac", 74, 82, ColumnType::Float)
                .with_precision(2)
                .nullable(),
            LayoutColumn::new("mp_rvu", 82, 90, ColumnType::Float)
                .with_precision(2)
                .nullable(),
            LayoutColumn::new("na_indicator", 90, 91, ColumnType::String).nullable(),
            LayoutColumn::new("global_days", 91, 94, ColumnType::String).nullable(),
            LayoutColumn::new("supervision_code", 94, 96, ColumnType::String).nullable(),
        ],
    )
}

/// The fixed prefix of 25LOCCO.txt; the county list is the open tail
/// starting at [`LOCALITY_COUNTY_TAIL_START`].
fn locality_county_2025() -> LayoutSpec {
    LayoutSpec::new(
        2025,
        1,
        0,
        vec![
            LayoutColumn::new("mac", 0, 5, ColumnType::String),
            LayoutColumn::new("locality_code", 6, 8, ColumnType::String),
            LayoutColumn::new("state_name", 10, 30, ColumnType::String).nullable(),
            LayoutColumn::new("fee_area", 30, 65, ColumnType::String).nullable(),
        ],
    )
}

/// Offset where the county names column begins in 25LOCCO.txt.
pub const LOCALITY_COUNTY_TAIL_START: usize = 65;

/// One record of the CMS ZIP bundle: shared by the ZIP5 locality and
/// ZIP9 override parsers, which select different rows from the same
/// lines.
fn zip_record_2025() -> LayoutSpec {
    LayoutSpec::new(
        2025,
        1,
        0,
        vec![
            LayoutColumn::new("state", 0, 2, ColumnType::String),
            LayoutColumn::new("zip5", 2, 7, ColumnType::String),
            LayoutColumn::new("carrier", 7, 12, ColumnType::String).nullable(),
            LayoutColumn::new("locality", 12, 14, ColumnType::String),
            LayoutColumn::new("rural", 14, 15, ColumnType::String).nullable(),
            LayoutColumn::new("plus_four_flag", 20, 21, ColumnType::String).nullable(),
            LayoutColumn::new("plus_four", 21, 25, ColumnType::String).nullable(),
            LayoutColumn::new("plus_four_high", 25, 29, ColumnType::String).nullable(),
        ],
    )
}
