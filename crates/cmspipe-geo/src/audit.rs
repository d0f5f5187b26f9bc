//! Audit summaries over recorded resolver traces.
//!
//! Operations reviews a resolver deployment by sampling its traces:
//! how often the PO-box filter actually excluded something, how many
//! results were coincident or suspiciously far, and whether the
//! nearest-neighbor relation is symmetric in practice.

use serde::Serialize;

use crate::trace::Trace;

/// Aggregate statistics over a set of traces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceAudit {
    pub trace_count: usize,
    pub zip9_hits: usize,
    pub nber_fallback_centroids: usize,
    pub coincident_results: usize,
    pub far_neighbor_results: usize,
    pub total_pobox_exclusions: usize,
    pub asymmetry_checks: usize,
    pub asymmetries_detected: usize,
    pub avg_distance_miles: f64,
    pub max_distance_miles: f64,
    /// Sample inputs whose reverse resolution disagreed.
    pub asymmetric_samples: Vec<String>,
}

/// Most asymmetric inputs carried as samples.
const MAX_ASYMMETRIC_SAMPLES: usize = 10;

/// Summarize a batch of traces.
#[must_use]
pub fn audit_traces(traces: &[Trace]) -> TraceAudit {
    let mut audit = TraceAudit {
        trace_count: traces.len(),
        ..TraceAudit::default()
    };
    if traces.is_empty() {
        return audit;
    }

    let mut total_distance = 0.0;
    for trace in traces {
        if trace.zip9_hit {
            audit.zip9_hits += 1;
        }
        if trace.centroid_provenance == crate::tables::CentroidProvenance::NberFallback {
            audit.nber_fallback_centroids += 1;
        }
        if trace.coincident {
            audit.coincident_results += 1;
        }
        if trace.far_neighbor {
            audit.far_neighbor_results += 1;
        }
        audit.total_pobox_exclusions += trace.excluded_pobox;
        total_distance += trace.distance_miles;
        audit.max_distance_miles = audit.max_distance_miles.max(trace.distance_miles);

        if let Some(asymmetry) = &trace.asymmetry {
            audit.asymmetry_checks += 1;
            if asymmetry.asymmetry_detected {
                audit.asymmetries_detected += 1;
                if audit.asymmetric_samples.len() < MAX_ASYMMETRIC_SAMPLES {
                    audit
                        .asymmetric_samples
                        .push(format!("{} -> {} -> {}", trace.input, trace.result_zip, asymmetry.reverse_nearest));
                }
            }
        }
    }
    audit.avg_distance_miles = total_distance / traces.len() as f64;
    audit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::CentroidProvenance;
    use crate::trace::AsymmetryCheck;
    use chrono::Utc;
    use cmspipe_types::TraceId;

    fn trace(input: &str, result: &str, miles: f64) -> Trace {
        Trace {
            trace_id: TraceId::generate(),
            input: input.to_string(),
            zip5: input[..5].to_string(),
            zip9: None,
            state: "CA".into(),
            locality: "05".into(),
            zip9_hit: false,
            starting_zcta: input[..5].to_string(),
            centroid_provenance: CentroidProvenance::Gazetteer,
            candidate_count: 4,
            excluded_pobox: 1,
            distances_computed: 4,
            result_zip: result.to_string(),
            distance_miles: miles,
            coincident: miles < 1.0,
            far_neighbor: miles > 10.0,
            asymmetry: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_audit_is_all_zero() {
        let audit = audit_traces(&[]);
        assert_eq!(audit.trace_count, 0);
        assert_eq!(audit.avg_distance_miles, 0.0);
    }

    #[test]
    fn counts_flags_and_distances() {
        let traces = vec![
            trace("94107", "94110", 0.5),
            trace("94110", "94107", 12.0),
            trace("94158", "94107", 2.0),
        ];
        let audit = audit_traces(&traces);
        assert_eq!(audit.trace_count, 3);
        assert_eq!(audit.coincident_results, 1);
        assert_eq!(audit.far_neighbor_results, 1);
        assert_eq!(audit.total_pobox_exclusions, 3);
        assert!((audit.avg_distance_miles - 14.5 / 3.0).abs() < 1e-9);
        assert_eq!(audit.max_distance_miles, 12.0);
    }

    #[test]
    fn asymmetries_are_sampled() {
        let mut asymmetric = trace("94107", "94110", 2.0);
        asymmetric.asymmetry = Some(AsymmetryCheck {
            reverse_nearest: "94158".into(),
            asymmetry_detected: true,
        });
        let mut symmetric = trace("94110", "94107", 2.0);
        symmetric.asymmetry = Some(AsymmetryCheck {
            reverse_nearest: "94110".into(),
            asymmetry_detected: false,
        });
        let audit = audit_traces(&[asymmetric, symmetric]);
        assert_eq!(audit.asymmetry_checks, 2);
        assert_eq!(audit.asymmetries_detected, 1);
        assert_eq!(audit.asymmetric_samples.len(), 1);
        assert!(audit.asymmetric_samples[0].contains("94107"));
    }
}
