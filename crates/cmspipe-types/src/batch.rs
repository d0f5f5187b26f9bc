use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, ReleaseId};
use crate::types::RunStatus;

/// Reference to one fetched source file, recorded on the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRef {
    pub url: String,
    pub filename: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Cost and memory telemetry for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingTelemetry {
    pub processing_cost_usd: f64,
    pub peak_memory_mb: Option<f64>,
}

/// Scores for the five observability pillars, captured at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PillarSnapshot {
    pub freshness_score: f64,
    pub volume_score: f64,
    pub schema_score: f64,
    pub quality_score: f64,
    pub lineage_score: f64,
}

impl PillarSnapshot {
    /// Weighted overall health in [0, 1].
    #[must_use]
    pub fn overall(&self) -> f64 {
        self.freshness_score * 0.25
            + self.volume_score * 0.20
            + self.schema_score * 0.20
            + self.quality_score * 0.25
            + self.lineage_score * 0.10
    }
}

/// One end-to-end execution of the pipeline over a release.
///
/// Created at Land start, progressively updated by each stage, and
/// terminal at Publish end. The store treats these as append-only:
/// supersession happens by running a new batch, never by rewriting
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub release_id: ReleaseId,
    pub dataset_name: String,
    pub vintage_date: Option<String>,
    pub product_year: Option<i64>,
    pub source_urls: Vec<String>,
    pub source_files: Vec<SourceFileRef>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,

    pub input_row_count: u64,
    pub output_row_count: u64,
    pub rejected_row_count: u64,
    pub quality_score: f64,
    pub schema_version: String,

    /// Ordered list of business-rule identifiers applied to the batch.
    pub business_rules_applied: Vec<String>,
    /// Validation result summary, stored as a structured blob.
    pub validation_summary: Option<serde_json::Value>,
    pub telemetry: ProcessingTelemetry,

    pub status: RunStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,

    pub pillars: Option<PillarSnapshot>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRecord {
    /// Fresh record in the `Running` state.
    #[must_use]
    pub fn new(
        batch_id: BatchId,
        release_id: ReleaseId,
        dataset_name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            batch_id,
            release_id,
            dataset_name: dataset_name.into(),
            vintage_date: None,
            product_year: None,
            source_urls: Vec::new(),
            source_files: Vec::new(),
            started_at: now,
            completed_at: None,
            duration_seconds: None,
            input_row_count: 0,
            output_row_count: 0,
            rejected_row_count: 0,
            quality_score: 1.0,
            schema_version: String::new(),
            business_rules_applied: Vec::new(),
            validation_summary: None,
            telemetry: ProcessingTelemetry::default(),
            status: RunStatus::Running,
            error_type: None,
            error_message: None,
            warnings: Vec::new(),
            pillars: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the record terminal and stamp duration.
    pub fn complete(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_seconds = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
        self.updated_at = now;
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_batch_starts_running() {
        let b = BatchRecord::new(
            BatchId::generate(),
            ReleaseId::new("rvu25a"),
            "pprrvu",
            "pipeline",
        );
        assert_eq!(b.status, RunStatus::Running);
        assert!(b.completed_at.is_none());
        assert_eq!(b.quality_score, 1.0);
    }

    #[test]
    fn complete_stamps_duration() {
        let mut b = BatchRecord::new(
            BatchId::generate(),
            ReleaseId::new("rvu25a"),
            "pprrvu",
            "pipeline",
        );
        b.complete(RunStatus::Success);
        assert!(b.status.is_terminal());
        assert!(b.duration_seconds.unwrap() >= 0.0);
    }

    #[test]
    fn pillar_weights_sum_to_one() {
        let p = PillarSnapshot {
            freshness_score: 1.0,
            volume_score: 1.0,
            schema_score: 1.0,
            quality_score: 1.0,
            lineage_score: 1.0,
        };
        assert!((p.overall() - 1.0).abs() < 1e-9);
    }
}
