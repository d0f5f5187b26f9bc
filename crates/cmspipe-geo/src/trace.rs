//! Immutable resolver traces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmspipe_types::TraceId;

use crate::tables::CentroidProvenance;

/// Result of the optional reverse-resolution check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsymmetryCheck {
    pub reverse_nearest: String,
    pub asymmetry_detected: bool,
}

/// One resolver call, recorded in full. Traces are append-only;
/// nothing ever updates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    pub input: String,
    pub zip5: String,
    pub zip9: Option<String>,
    pub state: String,
    pub locality: String,
    pub zip9_hit: bool,
    pub starting_zcta: String,
    pub centroid_provenance: CentroidProvenance,
    pub candidate_count: usize,
    pub excluded_pobox: usize,
    pub distances_computed: usize,
    pub result_zip: String,
    pub distance_miles: f64,
    pub coincident: bool,
    pub far_neighbor: bool,
    pub asymmetry: Option<AsymmetryCheck>,
    pub created_at: DateTime<Utc>,
}
