//! Census county reference, read-only during ingestion.

use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use cmspipe_types::{PipelineError, SourceError};

/// One county (or county-equivalent) from a census vintage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyRef {
    pub state_fips: String,
    pub county_fips: String,
    /// Canonical matching name, uppercased, without the LSAD suffix
    /// (for example `LOS ANGELES`, `ST. LOUIS`).
    pub name: String,
    /// Legal/statistical area descriptor (`County`, `city`, `Parish`,
    /// `Borough`, …).
    pub lsad: String,
    /// Alternate spellings seen in CMS publications.
    pub aliases: Vec<String>,
}

impl CountyRef {
    pub fn new(state_fips: &str, county_fips: &str, name: &str, lsad: &str) -> Self {
        Self {
            state_fips: state_fips.to_string(),
            county_fips: county_fips.to_string(),
            name: name.to_ascii_uppercase(),
            lsad: lsad.to_string(),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_ascii_uppercase()).collect();
        self
    }
}

/// The county table for one census vintage, grouped by state.
#[derive(Debug, Clone, Default)]
pub struct FipsReference {
    by_state: BTreeMap<String, Vec<CountyRef>>,
    pub vintage: String,
}

impl FipsReference {
    #[must_use]
    pub fn from_records(vintage: &str, records: Vec<CountyRef>) -> Self {
        let mut by_state: BTreeMap<String, Vec<CountyRef>> = BTreeMap::new();
        for record in records {
            by_state
                .entry(record.state_fips.clone())
                .or_default()
                .push(record);
        }
        for counties in by_state.values_mut() {
            counties.sort_by(|a, b| a.county_fips.cmp(&b.county_fips));
        }
        Self {
            by_state,
            vintage: vintage.to_string(),
        }
    }

    /// Load `counties.csv` from a reference directory. Columns:
    /// `state_fips,county_fips,name,lsad,aliases` with aliases
    /// separated by `;`.
    pub fn from_csv_dir(dir: &Utf8Path) -> Result<Self, PipelineError> {
        let path = dir.join("counties.csv");
        let raw = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Source(SourceError::ArchiveUnreadable {
                filename: path.to_string(),
                reason: e.to_string(),
            })
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(raw.as_bytes());
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                PipelineError::Source(SourceError::ArchiveUnreadable {
                    filename: path.to_string(),
                    reason: e.to_string(),
                })
            })?;
            if record.len() < 4 {
                continue;
            }
            let mut county = CountyRef::new(&record[0], &record[1], &record[2], &record[3]);
            if let Some(aliases) = record.get(4) {
                county.aliases = aliases
                    .split(';')
                    .map(|a| a.trim().to_ascii_uppercase())
                    .filter(|a| !a.is_empty())
                    .collect();
            }
            records.push(county);
        }
        Ok(Self::from_records("csv", records))
    }

    #[must_use]
    pub fn counties_for_state(&self, state_fips: &str) -> &[CountyRef] {
        self.by_state
            .get(state_fips)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn county_count(&self) -> usize {
        self.by_state.values().map(Vec::len).sum()
    }
}
