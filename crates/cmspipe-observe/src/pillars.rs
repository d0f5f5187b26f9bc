//! The five observability pillars.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cmspipe_store::MetadataStore;
use cmspipe_types::{HealthStatus, PipelineError, RunStatus};

use crate::alerts::Alert;

/// Pillar weights for the overall health score.
const WEIGHT_FRESHNESS: f64 = 0.25;
const WEIGHT_VOLUME: f64 = 0.20;
const WEIGHT_SCHEMA: f64 = 0.20;
const WEIGHT_QUALITY: f64 = 0.25;
const WEIGHT_LINEAGE: f64 = 0.10;

const SCHEMA_THRESHOLD: f64 = 0.9;
const QUALITY_THRESHOLD: f64 = 0.95;
const LINEAGE_THRESHOLD: f64 = 0.8;

/// Per-dataset expectations the pillars are judged against.
#[derive(Debug, Clone)]
pub struct DatasetExpectation {
    pub dataset: String,
    /// How often a fresh publication is expected, in hours.
    pub expected_cadence_hours: i64,
    /// Grace period beyond the cadence before freshness turns
    /// critical.
    pub freshness_grace_hours: i64,
    /// Typical row count for a healthy publication.
    pub expected_volume: u64,
    /// Tolerated relative deviation from the expected volume.
    pub volume_tolerance: f64,
}

impl DatasetExpectation {
    #[must_use]
    pub fn quarterly(dataset: &str, expected_volume: u64) -> Self {
        Self {
            dataset: dataset.to_string(),
            expected_cadence_hours: 24 * 95,
            freshness_grace_hours: 72,
            expected_volume,
            volume_tolerance: 0.15,
        }
    }
}

/// One metric within a pillar.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityMetric {
    pub metric_type: String,
    pub metric_name: String,
    pub value: f64,
    pub threshold: f64,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// The report shape consumers receive.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityReport {
    pub dataset_name: String,
    pub report_timestamp: DateTime<Utc>,
    pub overall_health_score: f64,
    pub metrics: Vec<ObservabilityMetric>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
}

/// Collects pillar metrics for one dataset from the run-metadata
/// store and the registered schema contract.
pub struct ObservabilityCollector {
    store: Arc<MetadataStore>,
}

impl ObservabilityCollector {
    #[must_use]
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    /// Collect all five pillars. `live_columns` is the column set of
    /// the live published table; `contract_columns` the registered
    /// contract's.
    pub fn collect(
        &self,
        expectation: &DatasetExpectation,
        contract_columns: &[String],
        live_columns: &[String],
        now: DateTime<Utc>,
    ) -> Result<ObservabilityReport, PipelineError> {
        let recent = self.store.get_recent_runs(50)?;
        let dataset_runs: Vec<_> = recent
            .iter()
            .filter(|r| r.dataset_name == expectation.dataset)
            .collect();

        let mut metrics = Vec::new();
        metrics.push(freshness_metric(&dataset_runs, expectation, now));
        metrics.push(volume_metric(&dataset_runs, expectation, now));
        metrics.push(schema_metric(
            &expectation.dataset,
            contract_columns,
            live_columns,
            now,
        ));
        metrics.push(quality_metric(&dataset_runs, now));
        metrics.push(lineage_metric(&dataset_runs, now));

        let overall_health_score = overall_score(&metrics);
        let recommendations = recommend(&metrics);

        Ok(ObservabilityReport {
            dataset_name: expectation.dataset.clone(),
            report_timestamp: now,
            overall_health_score,
            metrics,
            alerts: Vec::new(),
            recommendations,
        })
    }
}

fn last_success_at(
    runs: &[&cmspipe_types::BatchRecord],
) -> Option<DateTime<Utc>> {
    runs.iter()
        .filter(|r| r.status == RunStatus::Success)
        .filter_map(|r| r.completed_at)
        .max()
}

fn freshness_metric(
    runs: &[&cmspipe_types::BatchRecord],
    expectation: &DatasetExpectation,
    now: DateTime<Utc>,
) -> ObservabilityMetric {
    let (value, status, metadata) = match last_success_at(runs) {
        Some(last) => {
            let age_hours = (now - last).num_minutes() as f64 / 60.0;
            let cadence = expectation.expected_cadence_hours as f64;
            let grace = expectation.freshness_grace_hours as f64;
            let status = if age_hours <= cadence {
                HealthStatus::Healthy
            } else if age_hours <= cadence + grace {
                HealthStatus::Warning
            } else {
                HealthStatus::Critical
            };
            let score = (1.0 - age_hours / (cadence + grace)).max(0.0);
            (
                score,
                status,
                serde_json::json!({
                    "age_hours": age_hours,
                    "expected_cadence_hours": cadence,
                    "grace_period_hours": grace,
                    "last_processing_timestamp": last.to_rfc3339(),
                }),
            )
        }
        None => (
            0.0,
            HealthStatus::Critical,
            serde_json::json!({"reason": "no successful runs on record"}),
        ),
    };
    ObservabilityMetric {
        metric_type: "freshness".into(),
        metric_name: "freshness_score".into(),
        value,
        threshold: 1.0,
        status,
        timestamp: now,
        metadata,
    }
}

fn volume_metric(
    runs: &[&cmspipe_types::BatchRecord],
    expectation: &DatasetExpectation,
    now: DateTime<Utc>,
) -> ObservabilityMetric {
    let current = runs
        .iter()
        .filter(|r| r.status == RunStatus::Success)
        .max_by_key(|r| r.completed_at)
        .map_or(0, |r| r.output_row_count);

    let expected = expectation.expected_volume.max(1) as f64;
    let ratio = current as f64 / expected;
    let deviation = (ratio - 1.0).abs();

    let status = if current == 0 || ratio < 0.5 {
        HealthStatus::Critical
    } else if deviation <= expectation.volume_tolerance {
        HealthStatus::Healthy
    } else if deviation <= expectation.volume_tolerance * 2.0 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    };

    ObservabilityMetric {
        metric_type: "volume".into(),
        metric_name: "volume_health".into(),
        value: ratio.min(1.0),
        threshold: expectation.expected_volume as f64,
        status,
        timestamp: now,
        metadata: serde_json::json!({
            "current_count": current,
            "expected_volume": expectation.expected_volume,
            "volume_ratio": ratio,
            "deviation_percent": deviation * 100.0,
        }),
    }
}

fn schema_metric(
    dataset: &str,
    contract_columns: &[String],
    live_columns: &[String],
    now: DateTime<Utc>,
) -> ObservabilityMetric {
    let contract: BTreeSet<&String> = contract_columns.iter().collect();
    let live: BTreeSet<&String> = live_columns.iter().collect();
    let missing: Vec<&&String> = contract.difference(&live).collect();
    let extra: Vec<&&String> = live.difference(&contract).collect();

    // Missing columns break consumers; extras are merely suspicious.
    let score = (1.0 - 0.10 * missing.len() as f64 - 0.05 * extra.len() as f64).max(0.0);
    let status = if score >= SCHEMA_THRESHOLD {
        HealthStatus::Healthy
    } else if score >= SCHEMA_THRESHOLD - 0.2 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    };

    ObservabilityMetric {
        metric_type: "schema".into(),
        metric_name: "schema_drift_score".into(),
        value: score,
        threshold: SCHEMA_THRESHOLD,
        status,
        timestamp: now,
        metadata: serde_json::json!({
            "dataset": dataset,
            "missing_columns": missing.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "extra_columns": extra.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        }),
    }
}

fn quality_metric(
    runs: &[&cmspipe_types::BatchRecord],
    now: DateTime<Utc>,
) -> ObservabilityMetric {
    let scored: Vec<f64> = runs
        .iter()
        .filter(|r| r.status.is_terminal() && r.status != RunStatus::Cancelled)
        .map(|r| r.quality_score)
        .collect();
    let value = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    };
    let status = if scored.is_empty() {
        HealthStatus::Critical
    } else if value >= QUALITY_THRESHOLD {
        HealthStatus::Healthy
    } else if value >= QUALITY_THRESHOLD - 0.1 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    };
    ObservabilityMetric {
        metric_type: "quality".into(),
        metric_name: "avg_quality_score".into(),
        value,
        threshold: QUALITY_THRESHOLD,
        status,
        timestamp: now,
        metadata: serde_json::json!({"runs_scored": scored.len()}),
    }
}

fn lineage_metric(
    runs: &[&cmspipe_types::BatchRecord],
    now: DateTime<Utc>,
) -> ObservabilityMetric {
    let run_count = runs.len();
    let sources: BTreeSet<&str> = runs
        .iter()
        .flat_map(|r| r.source_files.iter().map(|f| f.filename.as_str()))
        .collect();
    let first = runs.iter().map(|r| r.started_at).min();
    let last = runs.iter().map(|r| r.started_at).max();
    let hours_since_last = last.map(|t| (now - t).num_minutes() as f64 / 60.0);

    let value = match (run_count, sources.len()) {
        (0, _) => 0.0,
        (_, 0) => 0.5,
        _ => 1.0,
    };
    let status = if value >= LINEAGE_THRESHOLD {
        HealthStatus::Healthy
    } else if value > 0.0 {
        HealthStatus::Warning
    } else {
        HealthStatus::Critical
    };

    ObservabilityMetric {
        metric_type: "lineage".into(),
        metric_name: "lineage_completeness".into(),
        value,
        threshold: LINEAGE_THRESHOLD,
        status,
        timestamp: now,
        metadata: serde_json::json!({
            "ingest_run_count": run_count,
            "distinct_source_files": sources.len(),
            "first_ingestion": first.map(|t| t.to_rfc3339()),
            "last_ingestion": last.map(|t| t.to_rfc3339()),
            "hours_since_last": hours_since_last,
        }),
    }
}

/// Weighted mean of the pillar scores.
#[must_use]
pub fn overall_score(metrics: &[ObservabilityMetric]) -> f64 {
    let pick = |ty: &str| {
        metrics
            .iter()
            .find(|m| m.metric_type == ty)
            .map_or(0.0, |m| m.value)
    };
    pick("freshness") * WEIGHT_FRESHNESS
        + pick("volume") * WEIGHT_VOLUME
        + pick("schema") * WEIGHT_SCHEMA
        + pick("quality") * WEIGHT_QUALITY
        + pick("lineage") * WEIGHT_LINEAGE
}

fn recommend(metrics: &[ObservabilityMetric]) -> Vec<String> {
    let mut out = Vec::new();
    for metric in metrics {
        if metric.status == HealthStatus::Healthy {
            continue;
        }
        out.push(match metric.metric_type.as_str() {
            "freshness" => "Check the upstream publication schedule and re-run ingestion".into(),
            "volume" => "Compare the landed row count against the previous vintage".into(),
            "schema" => "Review schema drift against the registered contract".into(),
            "quality" => "Inspect the quarantine tree for the dominant reject reasons".into(),
            "lineage" => "Verify source manifests exist for recent runs".into(),
            other => format!("Investigate degraded {other} pillar"),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_types::{BatchId, BatchRecord, ReleaseId, SourceFileRef};

    fn store_with_run(status: RunStatus, rows: u64, quality: f64) -> Arc<MetadataStore> {
        let store = Arc::new(MetadataStore::open_in_memory().unwrap());
        let mut record = BatchRecord::new(
            BatchId::generate(),
            ReleaseId::new("rvu25a"),
            "gpci",
            "pipeline",
        );
        record.source_files.push(SourceFileRef {
            url: "https://cms.gov/gpci".into(),
            filename: "GPCI2025.txt".into(),
            sha256: "ab".repeat(32),
            size_bytes: 10,
        });
        record.quality_score = quality;
        store.create_run(&record).unwrap();
        store
            .complete_run(record.batch_id.as_str(), status, rows, None, None, 0.0)
            .unwrap();
        store
    }

    fn expectation() -> DatasetExpectation {
        DatasetExpectation::quarterly("gpci", 109)
    }

    #[test]
    fn healthy_dataset_scores_high() {
        let store = store_with_run(RunStatus::Success, 109, 0.99);
        let collector = ObservabilityCollector::new(store);
        let cols: Vec<String> = vec!["locality_code".into(), "work_gpci".into()];
        let report = collector
            .collect(&expectation(), &cols, &cols, Utc::now())
            .unwrap();
        assert!(report.overall_health_score > 0.9, "{report:?}");
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn zero_volume_is_critical() {
        let store = store_with_run(RunStatus::Success, 0, 0.99);
        let collector = ObservabilityCollector::new(store);
        let cols: Vec<String> = vec!["locality_code".into()];
        let report = collector
            .collect(&expectation(), &cols, &cols, Utc::now())
            .unwrap();
        let volume = report
            .metrics
            .iter()
            .find(|m| m.metric_type == "volume")
            .unwrap();
        assert_eq!(volume.status, HealthStatus::Critical);
    }

    #[test]
    fn missing_columns_cost_more_than_extras() {
        let now = Utc::now();
        let contract: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let live_missing: Vec<String> = vec!["a".into(), "b".into()];
        let live_extra: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let m1 = schema_metric("t", &contract, &live_missing, now);
        let m2 = schema_metric("t", &contract, &live_extra, now);
        assert!((m1.value - 0.90).abs() < 1e-9);
        assert!((m2.value - 0.95).abs() < 1e-9);
    }

    #[test]
    fn no_runs_means_critical_freshness_and_lineage() {
        let store = Arc::new(MetadataStore::open_in_memory().unwrap());
        let collector = ObservabilityCollector::new(store);
        let cols: Vec<String> = vec!["a".into()];
        let report = collector
            .collect(&expectation(), &cols, &cols, Utc::now())
            .unwrap();
        let freshness = report
            .metrics
            .iter()
            .find(|m| m.metric_type == "freshness")
            .unwrap();
        assert_eq!(freshness.status, HealthStatus::Critical);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn pillar_weights_sum_to_one() {
        let total = WEIGHT_FRESHNESS + WEIGHT_VOLUME + WEIGHT_SCHEMA + WEIGHT_QUALITY + WEIGHT_LINEAGE;
        assert!((total - 1.0).abs() < 1e-12);
    }
}
