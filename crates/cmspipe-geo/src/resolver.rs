//! The nearest-ZIP resolver.

use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use chrono::Utc;
use tracing::debug;

use cmspipe_types::atomic_write::write_file_atomic;
use cmspipe_types::jcs::emit_jcs;
use cmspipe_types::{ResolverError, TraceId};

use crate::distance::{DistanceEngine, DistanceResult};
use crate::tables::{GeographyTables, ZipToZctaCrosswalk};
use crate::trace::{AsymmetryCheck, Trace};

/// A result is "coincident" under one mile and a "far neighbor"
/// beyond ten.
const COINCIDENT_MILES: f64 = 1.0;
const FAR_NEIGHBOR_MILES: f64 = 10.0;

/// The crosswalk relationship that means the ZIP and ZCTA are the
/// same polygon.
const RELATIONSHIP_EXACT: &str = "Zip matches ZCTA";

/// Caller options; the defaults match the consumer contract.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub use_nber: bool,
    pub max_radius_miles: f64,
    pub include_trace: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            use_nber: true,
            max_radius_miles: 100.0,
            include_trace: false,
        }
    }
}

/// Successful resolution.
#[derive(Debug, Clone)]
pub struct NearestZipResult {
    pub nearest_zip: String,
    pub distance_miles: f64,
    pub input_zip: String,
    pub trace: Option<Trace>,
}

/// Resolves a ZIP5 or ZIP9 to the nearest non-PO-box ZIP5 in the
/// same CMS state. Owns its distance engine and trace log; reads
/// only published geography tables.
pub struct NearestZipResolver {
    tables: Arc<GeographyTables>,
    engine: DistanceEngine,
    traces: Mutex<Vec<Trace>>,
    trace_dir: Option<Utf8PathBuf>,
}

impl NearestZipResolver {
    #[must_use]
    pub fn new(tables: Arc<GeographyTables>) -> Self {
        let engine = DistanceEngine::new(Arc::clone(&tables));
        Self {
            tables,
            engine,
            traces: Mutex::new(Vec::new()),
            trace_dir: None,
        }
    }

    /// Also persist each trace as canonical JSON under `dir`.
    #[must_use]
    pub fn with_trace_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.trace_dir = Some(dir);
        self
    }

    /// Resolve the nearest ZIP for a 5- or 9-digit input.
    pub fn find_nearest_zip(
        &self,
        input: &str,
        options: &ResolverOptions,
    ) -> Result<NearestZipResult, ResolverError> {
        let (zip5, zip9) = parse_input(input)?;

        // State and locality: a ZIP9 override wins over the ZIP5 row.
        let (state, locality, zip9_hit) = match zip9
            .as_deref()
            .and_then(|z9| self.tables.override_for_zip9(z9))
        {
            Some(override_row) => (
                override_row.state.clone(),
                override_row.locality.clone(),
                true,
            ),
            None => {
                let row = self
                    .tables
                    .locality_for_zip5(&zip5)
                    .ok_or_else(|| ResolverError::NoState { zip5: zip5.clone() })?;
                (row.state.clone(), row.locality.clone(), false)
            }
        };

        let starting_zcta = self.starting_zcta(&zip5)?;
        let (_, _, centroid_provenance) =
            self.tables
                .centroid(&starting_zcta)
                .ok_or_else(|| ResolverError::NoCoords {
                    zcta5: starting_zcta.clone(),
                })?;

        let (candidates, excluded_pobox) = self.tables.candidates_in_state(&state, &zip5);
        if candidates.is_empty() {
            return Err(ResolverError::NoCandidatesInState { state });
        }

        // Distance per candidate through the candidate's own ZCTA.
        let mut scored: Vec<(String, Option<u64>, DistanceResult)> = Vec::new();
        for candidate in &candidates {
            let Ok(candidate_zcta) = self.starting_zcta(&candidate.zip5) else {
                continue;
            };
            let Ok(distance) =
                self.engine
                    .calculate_distance(&starting_zcta, &candidate_zcta, options.use_nber)
            else {
                continue;
            };
            scored.push((candidate.zip5.clone(), candidate.population, distance));
        }
        let distances_computed = scored.len();

        // Zero distance means the same point (usually the same ZCTA
        // under two ZIPs was the input itself); discard, then order
        // by distance, smaller population first, ZIP5 last.
        scored.retain(|(_, _, d)| d.distance_miles > 0.0);
        scored.retain(|(_, _, d)| d.distance_miles <= options.max_radius_miles);
        scored.sort_by(|a, b| {
            a.2.distance_miles
                .partial_cmp(&b.2.distance_miles)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.unwrap_or(0).cmp(&b.1.unwrap_or(0)))
                .then_with(|| a.0.cmp(&b.0))
        });

        let Some((nearest_zip, _, distance)) = scored.first().cloned() else {
            return Err(ResolverError::NoCandidatesInState { state });
        };

        debug!(
            input = %input,
            nearest = %nearest_zip,
            miles = distance.distance_miles,
            "resolved nearest zip"
        );

        let asymmetry = if options.include_trace {
            self.check_asymmetry(&zip5, &nearest_zip, options)
        } else {
            None
        };

        let trace = Trace {
            trace_id: TraceId::generate(),
            input: input.to_string(),
            zip5: zip5.clone(),
            zip9,
            state,
            locality,
            zip9_hit,
            starting_zcta,
            centroid_provenance,
            candidate_count: candidates.len(),
            excluded_pobox,
            distances_computed,
            result_zip: nearest_zip.clone(),
            distance_miles: distance.distance_miles,
            coincident: distance.distance_miles < COINCIDENT_MILES,
            far_neighbor: distance.distance_miles > FAR_NEIGHBOR_MILES,
            asymmetry,
            created_at: Utc::now(),
        };
        self.persist_trace(&trace);

        Ok(NearestZipResult {
            nearest_zip,
            distance_miles: distance.distance_miles,
            input_zip: input.to_string(),
            trace: options.include_trace.then_some(trace),
        })
    }

    /// All traces recorded by this resolver instance, oldest first.
    pub fn traces(&self) -> Vec<Trace> {
        self.traces.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// The canonical crosswalk row: prefer the exact relationship,
    /// then the highest weight with nulls last.
    fn starting_zcta(&self, zip5: &str) -> Result<String, ResolverError> {
        let rows = self.tables.crosswalk_rows(zip5);
        if rows.is_empty() {
            return Err(ResolverError::NoZcta {
                zip5: zip5.to_string(),
            });
        }
        let mut sorted: Vec<&ZipToZctaCrosswalk> = rows.iter().collect();
        sorted.sort_by(|a, b| {
            let a_exact = a.relationship == RELATIONSHIP_EXACT;
            let b_exact = b.relationship == RELATIONSHIP_EXACT;
            b_exact
                .cmp(&a_exact)
                .then_with(|| {
                    b.weight
                        .unwrap_or(f64::NEG_INFINITY)
                        .partial_cmp(&a.weight.unwrap_or(f64::NEG_INFINITY))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.zcta5.cmp(&b.zcta5))
        });
        Ok(sorted[0].zcta5.clone())
    }

    /// Resolve from the chosen ZIP back toward the input. The reverse
    /// lookup runs with tracing off so it cannot recurse, and the
    /// candidate filter keeps it inside the state by construction.
    fn check_asymmetry(
        &self,
        input_zip5: &str,
        result_zip: &str,
        options: &ResolverOptions,
    ) -> Option<AsymmetryCheck> {
        let reverse_options = ResolverOptions {
            include_trace: false,
            ..options.clone()
        };
        match self.find_nearest_zip(result_zip, &reverse_options) {
            Ok(reverse) => Some(AsymmetryCheck {
                asymmetry_detected: reverse.nearest_zip != input_zip5,
                reverse_nearest: reverse.nearest_zip,
            }),
            Err(_) => None,
        }
    }

    fn persist_trace(&self, trace: &Trace) {
        if let Ok(mut traces) = self.traces.lock() {
            traces.push(trace.clone());
        }
        if let Some(dir) = &self.trace_dir {
            if let Ok(json) = emit_jcs(trace) {
                let path = dir.join(format!("{}.json", trace.trace_id));
                let _ = write_file_atomic(&path, &json);
            }
        }
    }
}

/// Strip non-digits and demand exactly five or nine digits.
fn parse_input(input: &str) -> Result<(String, Option<String>), ResolverError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        5 => Ok((digits, None)),
        9 => Ok((digits[..5].to_string(), Some(digits))),
        _ => Err(ResolverError::InvalidZip {
            input: input.to_string(),
        }),
    }
}
