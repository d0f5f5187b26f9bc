//! The per-run manifest written to `manifests/<run_id>.json`.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use cmspipe_types::atomic_write::write_file_atomic;
use cmspipe_types::jcs::emit_jcs;
use cmspipe_types::PipelineError;

/// Per-dataset outcome inside a run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifestEntry {
    pub dataset: String,
    pub files: Vec<String>,
    pub total_rows: u64,
    pub successful_rows: u64,
    pub failed_rows: u64,
    pub validation_errors: u64,
    pub validation_warnings: u64,
    pub processing_time_seconds: f64,
}

/// Row totals across every dataset in the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestTotals {
    pub total_rows: u64,
    pub successful_rows: u64,
    pub failed_rows: u64,
}

/// One pipeline run, as recorded on disk. Timestamps are ISO-8601
/// UTC; the file is emitted as canonical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub release_id: String,
    pub source_version: String,
    pub run_type: String,
    pub started_at: String,
    pub completed_at: String,
    pub total_duration_seconds: f64,
    pub datasets: Vec<DatasetManifestEntry>,
    pub overall_status: String,
    pub totals: ManifestTotals,
}

impl RunManifest {
    /// Recompute `totals` from the dataset entries.
    pub fn refresh_totals(&mut self) {
        let mut totals = ManifestTotals::default();
        for entry in &self.datasets {
            totals.total_rows += entry.total_rows;
            totals.successful_rows += entry.successful_rows;
            totals.failed_rows += entry.failed_rows;
        }
        self.totals = totals;
    }

    /// Write `manifests/<run_id>.json` under the output root.
    pub fn write(&self, output_dir: &Utf8Path) -> Result<(), PipelineError> {
        let path = output_dir
            .join("manifests")
            .join(format!("{}.json", self.run_id));
        let json = emit_jcs(self).map_err(|e| PipelineError::Internal(e.to_string()))?;
        write_file_atomic(&path, &json)?;
        Ok(())
    }
}
