//! ZCTA-pair distance: NBER fast path with a Haversine cross-check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use cmspipe_types::ResolverError;

use crate::tables::{CentroidProvenance, GeographyTables};

/// Earth radius in miles for the Haversine computation.
const EARTH_RADIUS_MILES: f64 = 3959.0;

/// NBER and Haversine agreeing within this many miles is normal;
/// beyond it the lookup table is suspect and Haversine wins.
const DISCREPANCY_MILES: f64 = 1.0;

/// Which path produced the final distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    Nber,
    Haversine,
    SelfPair,
}

impl DistanceMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nber => "nber",
            Self::Haversine => "haversine",
            Self::SelfPair => "self",
        }
    }
}

/// Full result of one pair computation.
#[derive(Debug, Clone, Serialize)]
pub struct DistanceResult {
    pub distance_miles: f64,
    pub method_used: DistanceMethod,
    pub nber_available: bool,
    pub haversine_available: bool,
    pub nber_distance: Option<f64>,
    pub haversine_distance: Option<f64>,
    pub discrepancy_detected: bool,
    pub discrepancy_miles: Option<f64>,
    /// Provenance of the centroids used for Haversine, when any.
    pub centroid_provenance: Option<CentroidProvenance>,
}

/// Great-circle distance between two points, in miles.
#[must_use]
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Distance engine with a per-batch pair cache.
pub struct DistanceEngine {
    tables: Arc<GeographyTables>,
    cache: Mutex<HashMap<(String, String, bool), DistanceResult>>,
}

impl DistanceEngine {
    #[must_use]
    pub fn new(tables: Arc<GeographyTables>) -> Self {
        Self {
            tables,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Distance between two ZCTAs.
    ///
    /// NBER is preferred when enabled and available; a discrepancy
    /// beyond one mile against Haversine flags the result and
    /// switches to Haversine. Identical inputs short-circuit to zero.
    pub fn calculate_distance(
        &self,
        zcta_a: &str,
        zcta_b: &str,
        use_nber: bool,
    ) -> Result<DistanceResult, ResolverError> {
        if zcta_a == zcta_b {
            return Ok(DistanceResult {
                distance_miles: 0.0,
                method_used: DistanceMethod::SelfPair,
                nber_available: false,
                haversine_available: false,
                nber_distance: None,
                haversine_distance: None,
                discrepancy_detected: false,
                discrepancy_miles: None,
                centroid_provenance: None,
            });
        }

        let key = cache_key(zcta_a, zcta_b, use_nber);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let nber = self.tables.nber_distance(zcta_a, zcta_b);
        let (haversine, provenance) = self.haversine_for(zcta_a, zcta_b);

        let result = match (use_nber.then_some(nber).flatten(), haversine) {
            (Some(n), Some(h)) => {
                let discrepancy = (n - h).abs();
                let detected = discrepancy > DISCREPANCY_MILES;
                DistanceResult {
                    distance_miles: if detected { h } else { n },
                    method_used: if detected {
                        DistanceMethod::Haversine
                    } else {
                        DistanceMethod::Nber
                    },
                    nber_available: true,
                    haversine_available: true,
                    nber_distance: Some(n),
                    haversine_distance: Some(h),
                    discrepancy_detected: detected,
                    discrepancy_miles: detected.then_some(discrepancy),
                    centroid_provenance: provenance,
                }
            }
            (Some(n), None) => DistanceResult {
                distance_miles: n,
                method_used: DistanceMethod::Nber,
                nber_available: true,
                haversine_available: false,
                nber_distance: Some(n),
                haversine_distance: None,
                discrepancy_detected: false,
                discrepancy_miles: None,
                centroid_provenance: None,
            },
            (None, Some(h)) => DistanceResult {
                distance_miles: h,
                method_used: DistanceMethod::Haversine,
                nber_available: nber.is_some(),
                haversine_available: true,
                nber_distance: nber,
                haversine_distance: Some(h),
                discrepancy_detected: false,
                discrepancy_miles: None,
                centroid_provenance: provenance,
            },
            (None, None) => {
                let missing = if self.tables.centroid(zcta_a).is_none() {
                    zcta_a
                } else {
                    zcta_b
                };
                return Err(ResolverError::NoCoords {
                    zcta5: missing.to_string(),
                });
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    /// One-to-many distances from a single source.
    pub fn batch(
        &self,
        source: &str,
        targets: &[String],
        use_nber: bool,
    ) -> HashMap<String, Result<DistanceResult, ResolverError>> {
        targets
            .iter()
            .map(|t| (t.clone(), self.calculate_distance(source, t, use_nber)))
            .collect()
    }

    /// Drop the per-batch cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn haversine_for(&self, zcta_a: &str, zcta_b: &str) -> (Option<f64>, Option<CentroidProvenance>) {
        let (Some((lat1, lon1, p1)), Some((lat2, lon2, p2))) =
            (self.tables.centroid(zcta_a), self.tables.centroid(zcta_b))
        else {
            return (None, None);
        };
        // Report the weaker provenance of the pair.
        let provenance = if p1 == CentroidProvenance::NberFallback
            || p2 == CentroidProvenance::NberFallback
        {
            CentroidProvenance::NberFallback
        } else {
            CentroidProvenance::Gazetteer
        };
        (
            Some(haversine_miles(lat1, lon1, lat2, lon2)),
            Some(provenance),
        )
    }
}

fn cache_key(a: &str, b: &str, use_nber: bool) -> (String, String, bool) {
    if a <= b {
        (a.to_string(), b.to_string(), use_nber)
    } else {
        (b.to_string(), a.to_string(), use_nber)
    }
}
