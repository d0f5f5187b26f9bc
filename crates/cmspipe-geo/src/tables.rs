//! In-memory geography tables, loaded from the published datasets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where a centroid came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidProvenance {
    Gazetteer,
    NberFallback,
}

impl CentroidProvenance {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gazetteer => "gazetteer",
            Self::NberFallback => "nber_fallback",
        }
    }
}

/// One ZCTA centroid from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZctaCentroid {
    pub zcta5: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vintage: String,
    pub provenance: CentroidProvenance,
}

/// One ZIP→ZCTA crosswalk row. Multiple rows per ZIP5 are normal;
/// the resolver picks the canonical one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipToZctaCrosswalk {
    pub zip5: String,
    pub zcta5: String,
    pub relationship: String,
    pub weight: Option<f64>,
    pub vintage: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// ZIP5 → CMS state and locality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zip5Locality {
    pub zip5: String,
    pub state: String,
    pub locality: String,
    pub carrier_mac: Option<String>,
    pub rural_flag: Option<String>,
    pub effective_from: String,
    pub effective_to: Option<String>,
    pub vintage: String,
}

/// An inclusive ZIP9 range override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zip9Override {
    pub zip9_low: String,
    pub zip9_high: String,
    pub state: String,
    pub locality: String,
    pub rural_flag: Option<String>,
    pub effective_from: String,
    pub effective_to: Option<String>,
    pub vintage: String,
}

impl Zip9Override {
    /// Inclusive containment on both endpoints.
    #[must_use]
    pub fn contains(&self, zip9: &str) -> bool {
        self.zip9_low.as_str() <= zip9 && zip9 <= self.zip9_high.as_str()
    }
}

/// Supplementary ZIP facts for candidate filtering and tie-breaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipMetadata {
    pub zip5: String,
    pub population: Option<u64>,
    /// Missing metadata is treated as not a PO box.
    pub is_pobox: bool,
}

/// A candidate produced by the same-state filter.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub zip5: String,
    pub population: Option<u64>,
}

/// All geography tables the resolver reads. Built once per process
/// from the published datasets; read-only afterwards.
#[derive(Debug, Default)]
pub struct GeographyTables {
    zip5_locality: HashMap<String, Zip5Locality>,
    zip9_overrides: Vec<Zip9Override>,
    crosswalk: HashMap<String, Vec<ZipToZctaCrosswalk>>,
    gazetteer: HashMap<String, (f64, f64)>,
    nber_centroids: HashMap<String, (f64, f64)>,
    nber_distances: HashMap<(String, String), f64>,
    zip_metadata: HashMap<String, ZipMetadata>,
}

impl GeographyTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_zip5_locality(&mut self, row: Zip5Locality) {
        self.zip5_locality.insert(row.zip5.clone(), row);
    }

    pub fn add_zip9_override(&mut self, row: Zip9Override) {
        self.zip9_overrides.push(row);
        self.zip9_overrides
            .sort_by(|a, b| a.zip9_low.cmp(&b.zip9_low));
    }

    pub fn add_crosswalk(&mut self, row: ZipToZctaCrosswalk) {
        self.crosswalk.entry(row.zip5.clone()).or_default().push(row);
    }

    pub fn add_centroid(&mut self, row: ZctaCentroid) {
        let target = match row.provenance {
            CentroidProvenance::Gazetteer => &mut self.gazetteer,
            CentroidProvenance::NberFallback => &mut self.nber_centroids,
        };
        target.insert(row.zcta5.clone(), (row.latitude, row.longitude));
    }

    /// Symmetric pair distance; insertion order of the pair does not
    /// matter.
    pub fn add_nber_distance(&mut self, zcta_a: &str, zcta_b: &str, miles: f64) {
        self.nber_distances.insert(ordered_pair(zcta_a, zcta_b), miles);
    }

    pub fn add_zip_metadata(&mut self, row: ZipMetadata) {
        self.zip_metadata.insert(row.zip5.clone(), row);
    }

    #[must_use]
    pub fn locality_for_zip5(&self, zip5: &str) -> Option<&Zip5Locality> {
        self.zip5_locality.get(zip5)
    }

    /// The override whose inclusive range contains the ZIP9, if any.
    #[must_use]
    pub fn override_for_zip9(&self, zip9: &str) -> Option<&Zip9Override> {
        self.zip9_overrides.iter().find(|o| o.contains(zip9))
    }

    #[must_use]
    pub fn crosswalk_rows(&self, zip5: &str) -> &[ZipToZctaCrosswalk] {
        self.crosswalk.get(zip5).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Centroid for a ZCTA, gazetteer first, NBER as fallback.
    #[must_use]
    pub fn centroid(&self, zcta5: &str) -> Option<(f64, f64, CentroidProvenance)> {
        if let Some(&(lat, lon)) = self.gazetteer.get(zcta5) {
            return Some((lat, lon, CentroidProvenance::Gazetteer));
        }
        self.nber_centroids
            .get(zcta5)
            .map(|&(lat, lon)| (lat, lon, CentroidProvenance::NberFallback))
    }

    #[must_use]
    pub fn nber_distance(&self, zcta_a: &str, zcta_b: &str) -> Option<f64> {
        self.nber_distances.get(&ordered_pair(zcta_a, zcta_b)).copied()
    }

    #[must_use]
    pub fn metadata(&self, zip5: &str) -> Option<&ZipMetadata> {
        self.zip_metadata.get(zip5)
    }

    /// Same-state, non-PO-box candidates, excluding the input ZIP.
    /// Returns the candidates plus the count of PO-box exclusions.
    #[must_use]
    pub fn candidates_in_state(&self, state: &str, exclude_zip5: &str) -> (Vec<Candidate>, usize) {
        let mut excluded_pobox = 0usize;
        let mut candidates: Vec<Candidate> = Vec::new();
        for row in self.zip5_locality.values() {
            if row.state != state || row.zip5 == exclude_zip5 {
                continue;
            }
            let metadata = self.zip_metadata.get(&row.zip5);
            if metadata.map(|m| m.is_pobox).unwrap_or(false) {
                excluded_pobox += 1;
                continue;
            }
            candidates.push(Candidate {
                zip5: row.zip5.clone(),
                population: metadata.and_then(|m| m.population),
            });
        }
        candidates.sort_by(|a, b| a.zip5.cmp(&b.zip5));
        (candidates, excluded_pobox)
    }
}

/// Serializable snapshot of every geography table, used to load a
/// resolver from published data without re-running ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesDump {
    pub zip5_locality: Vec<Zip5Locality>,
    pub zip9_overrides: Vec<Zip9Override>,
    pub crosswalk: Vec<ZipToZctaCrosswalk>,
    pub centroids: Vec<ZctaCentroid>,
    /// `(zcta_a, zcta_b, miles)` triples; order-insensitive.
    pub nber_distances: Vec<(String, String, f64)>,
    pub zip_metadata: Vec<ZipMetadata>,
}

impl From<TablesDump> for GeographyTables {
    fn from(dump: TablesDump) -> Self {
        let mut tables = GeographyTables::new();
        for row in dump.zip5_locality {
            tables.add_zip5_locality(row);
        }
        for row in dump.zip9_overrides {
            tables.add_zip9_override(row);
        }
        for row in dump.crosswalk {
            tables.add_crosswalk(row);
        }
        for row in dump.centroids {
            tables.add_centroid(row);
        }
        for (a, b, miles) in dump.nber_distances {
            tables.add_nber_distance(&a, &b, miles);
        }
        for row in dump.zip_metadata {
            tables.add_zip_metadata(row);
        }
        tables
    }
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locality(zip5: &str, state: &str) -> Zip5Locality {
        Zip5Locality {
            zip5: zip5.into(),
            state: state.into(),
            locality: "01".into(),
            carrier_mac: None,
            rural_flag: None,
            effective_from: "2025-01-01".into(),
            effective_to: None,
            vintage: "2025".into(),
        }
    }

    #[test]
    fn zip9_override_endpoints_are_inclusive() {
        let o = Zip9Override {
            zip9_low: "941070000".into(),
            zip9_high: "941079999".into(),
            state: "CA".into(),
            locality: "02".into(),
            rural_flag: None,
            effective_from: "2025-01-01".into(),
            effective_to: None,
            vintage: "2025".into(),
        };
        assert!(o.contains("941070000"));
        assert!(o.contains("941079999"));
        assert!(o.contains("941074567"));
        assert!(!o.contains("941080000"));
    }

    #[test]
    fn nber_lookup_is_order_insensitive() {
        let mut t = GeographyTables::new();
        t.add_nber_distance("94107", "89448", 150.0);
        assert_eq!(t.nber_distance("89448", "94107"), Some(150.0));
    }

    #[test]
    fn gazetteer_centroid_preferred_over_nber() {
        let mut t = GeographyTables::new();
        t.add_centroid(ZctaCentroid {
            zcta5: "94107".into(),
            latitude: 37.76,
            longitude: -122.39,
            vintage: "2023".into(),
            provenance: CentroidProvenance::Gazetteer,
        });
        t.add_centroid(ZctaCentroid {
            zcta5: "94107".into(),
            latitude: 37.00,
            longitude: -122.00,
            vintage: "2023".into(),
            provenance: CentroidProvenance::NberFallback,
        });
        let (lat, _, provenance) = t.centroid("94107").unwrap();
        assert_eq!(provenance, CentroidProvenance::Gazetteer);
        assert!((lat - 37.76).abs() < 1e-9);
    }

    #[test]
    fn candidate_filter_excludes_poboxes_and_other_states() {
        let mut t = GeographyTables::new();
        t.add_zip5_locality(locality("94107", "CA"));
        t.add_zip5_locality(locality("94199", "CA"));
        t.add_zip5_locality(locality("89448", "NV"));
        t.add_zip_metadata(ZipMetadata {
            zip5: "94199".into(),
            population: None,
            is_pobox: true,
        });
        let (candidates, excluded) = t.candidates_in_state("CA", "94107");
        assert!(candidates.is_empty());
        assert_eq!(excluded, 1);
    }
}
