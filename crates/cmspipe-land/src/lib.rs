//! Source acquisition (the Land stage).
//!
//! Discovery enumerates a release's source files; the fetcher pulls
//! bytes over HTTPS with a bounded retry budget; landed bytes are
//! checksummed, written to the immutable raw tree, and described by
//! a canonical `manifest.json` that later stages treat as the source
//! of truth.

pub mod fetch;
pub mod manifest;
pub mod source;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use cmspipe_types::atomic_write::{write_bytes_atomic, write_file_atomic};
use cmspipe_types::jcs::emit_jcs;
use cmspipe_types::{PipelineError, SourceError};

use manifest::{ManifestFile, RawManifest};
use source::{SourceFile, SourceProvider};

/// One fetched, checksummed, persisted source file.
#[derive(Debug, Clone)]
pub struct LandedFile {
    pub dataset: String,
    pub file: SourceFile,
    pub sha256: String,
    pub size_bytes: u64,
    pub path: Utf8PathBuf,
    pub bytes: Vec<u8>,
}

/// Result of the Land stage for one release.
#[derive(Debug, Clone)]
pub struct LandOutcome {
    pub manifest: RawManifest,
    pub files: Vec<LandedFile>,
}

/// Lowercase hex SHA-256 of a byte slice.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fetch every source file of a release, verify checksums, persist
/// the raw tree, and emit the manifest.
///
/// Fetches run concurrently up to `parallelism`; a checksum mismatch
/// against a known digest fails the batch outright.
pub async fn land(
    provider: Arc<dyn SourceProvider>,
    output_dir: &Utf8Path,
    parallelism: usize,
) -> Result<LandOutcome, PipelineError> {
    let descriptor = provider.describe();
    if descriptor.files.is_empty() {
        return Err(SourceError::EmptyRelease {
            release_id: descriptor.release_id.to_string(),
        }
        .into());
    }

    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut tasks: JoinSet<Result<(String, SourceFile, Vec<u8>), PipelineError>> = JoinSet::new();
    for file in descriptor.files.clone() {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Internal(e.to_string()))?;
            let bytes = provider.fetch(&file).await?;
            Ok((file.dataset.clone(), file, bytes))
        });
    }

    let mut landed = Vec::new();
    let raw_dir = output_dir
        .join("raw")
        .join(descriptor.release_id.as_str());
    while let Some(joined) = tasks.join_next().await {
        let (dataset, file, bytes) =
            joined.map_err(|e| PipelineError::Internal(format!("fetch task panicked: {e}")))??;

        let sha256 = sha256_hex(&bytes);
        if let Some(expected) = &file.expected_sha256 {
            if expected.to_lowercase() != sha256 {
                return Err(SourceError::ChecksumMismatch {
                    filename: file.filename.clone(),
                    expected: expected.clone(),
                    actual: sha256,
                }
                .into());
            }
        }

        let path = raw_dir.join("files").join(&file.filename);
        write_bytes_atomic(&path, &bytes)?;
        info!(filename = %file.filename, size = bytes.len(), "landed source file");

        landed.push(LandedFile {
            dataset,
            sha256,
            size_bytes: bytes.len() as u64,
            path,
            bytes,
            file,
        });
    }
    // Join order is completion order; the manifest and downstream
    // stages need the discovery order back.
    landed.sort_by(|a, b| a.file.filename.cmp(&b.file.filename));

    let manifest = RawManifest {
        release_id: descriptor.release_id.to_string(),
        source_url: descriptor.source_url.clone(),
        license: descriptor.license.clone(),
        attribution_required: descriptor.attribution_required,
        fetched_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        discovered_from: descriptor.discovered_from.clone(),
        files: landed
            .iter()
            .map(|l| ManifestFile {
                filename: l.file.filename.clone(),
                source_url: l.file.url.clone(),
                sha256: l.sha256.clone(),
                size_bytes: l.size_bytes,
                content_type: l.file.content_type.clone(),
                last_modified: l.file.last_modified.clone(),
                etag: l.file.etag.clone(),
                dataset: l.dataset.clone(),
            })
            .collect(),
    };
    let manifest_json = emit_jcs(&manifest).map_err(|e| PipelineError::Internal(e.to_string()))?;
    write_file_atomic(&raw_dir.join("manifest.json"), &manifest_json)?;

    Ok(LandOutcome {
        manifest,
        files: landed,
    })
}
