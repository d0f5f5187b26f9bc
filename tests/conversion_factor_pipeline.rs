//! End-to-end conversion factor scenarios through the full pipeline.

use std::sync::Arc;

use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;

use cmspipe::{
    FixtureProvider, MetadataStore, Pipeline, PipelineConfig, ReleaseDescriptor, ReleaseId,
    RunStatus, SourceFile,
};

fn descriptor(release: &str, year: i64, vintage: &str) -> ReleaseDescriptor {
    ReleaseDescriptor {
        release_id: ReleaseId::new(release),
        vintage_date: vintage.into(),
        product_year: year,
        quarter_vintage: format!("{year}Q1"),
        source_url: "https://www.cms.gov/files/zip/cf.zip".into(),
        license: "public-domain".into(),
        attribution_required: true,
        discovered_from: "https://www.cms.gov/medicare/payment/fee-schedules".into(),
        files: vec![SourceFile {
            dataset: "conversion_factor".into(),
            url: "https://www.cms.gov/files/CF.csv".into(),
            filename: "CF.csv".into(),
            content_type: "text/csv".into(),
            expected_sha256: None,
            size_bytes: None,
            last_modified: None,
            etag: None,
        }],
    }
}

fn pipeline(dir: &tempfile::TempDir) -> (Pipeline, Arc<MetadataStore>, Utf8PathBuf) {
    let out = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let config = PipelineConfig {
        output_dir: out.clone(),
        ..PipelineConfig::default()
    };
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    (Pipeline::new(config, Arc::clone(&store)), store, out)
}

#[tokio::test]
async fn golden_two_row_publication() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, out) = pipeline(&dir);
    let csv = b"cf_type,cf_value,effective_from\nphysician,32.3465,2025-01-01\nanesthesia,20.3178,2025-01-01\n";
    let provider = Arc::new(FixtureProvider::new(
        descriptor("mpfs_cf_2025", 2025, "2025-01-01"),
        [("CF.csv", csv.to_vec())],
    ));

    let outcome = pipeline
        .ingest(provider, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.record_count, 2);
    assert!(outcome.dis_compliance);

    // The published artifact and manifests all exist.
    assert!(out
        .join("curated/conversion_factor/mpfs_cf_2025/conversion_factor.parquet")
        .exists());
    assert!(out.join("raw/mpfs_cf_2025/manifest.json").exists());
    assert!(out
        .join(format!("manifests/{}.json", outcome.batch_id))
        .exists());
    // No rejects, no quarantine tree.
    assert!(!out.join("quarantine/mpfs_cf_2025").exists());

    let run = store.get_run_metadata(outcome.batch_id.as_str()).unwrap();
    assert_eq!(run.input_row_count, 2);
    assert_eq!(run.rejected_row_count, 0);
    assert!(run.quality_score > 0.99);
}

#[tokio::test]
async fn mid_year_adjustment_retains_both_physician_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, _out) = pipeline(&dir);
    let csv = b"cf_type,cf_value,effective_from,effective_to\n\
physician,33.0607,2024-01-01,2024-03-08\n\
physician,32.7442,2024-03-09,2024-12-31\n\
anesthesia,20.0000,2024-01-01,\n";
    let provider = Arc::new(FixtureProvider::new(
        descriptor("mpfs_cf_2024", 2024, "2024-01-01"),
        [("CF.csv", csv.to_vec())],
    ));

    let outcome = pipeline
        .ingest(provider, None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.record_count, 3);

    let run = store.get_run_metadata(outcome.batch_id.as_str()).unwrap();
    assert_eq!(run.rejected_row_count, 0);
}

#[tokio::test]
async fn rerun_requires_a_fresh_batch_id() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, _out) = pipeline(&dir);
    let csv = b"cf_type,cf_value,effective_from\nphysician,32.3465,2025-01-01\n";

    let make_provider = || {
        Arc::new(FixtureProvider::new(
            descriptor("mpfs_cf_2025", 2025, "2025-01-01"),
            [("CF.csv", csv.to_vec())],
        ))
    };
    let first = pipeline
        .ingest(make_provider(), None, CancellationToken::new())
        .await
        .unwrap();
    let second = pipeline
        .ingest(make_provider(), None, CancellationToken::new())
        .await
        .unwrap();

    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(store.get_recent_runs(10).unwrap().len(), 2);
}
