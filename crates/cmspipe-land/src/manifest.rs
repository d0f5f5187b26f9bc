//! The raw-tree manifest: source of truth for every later stage.

use serde::{Deserialize, Serialize};

/// One landed file as recorded in `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub filename: String,
    pub source_url: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub dataset: String,
}

/// `raw/<release_id>/manifest.json`, emitted as canonical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawManifest {
    pub release_id: String,
    pub source_url: String,
    pub license: String,
    pub attribution_required: bool,
    pub fetched_at: String,
    pub discovered_from: String,
    pub files: Vec<ManifestFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_types::jcs::emit_jcs;

    #[test]
    fn manifest_emits_canonical_json() {
        let manifest = RawManifest {
            release_id: "rvu25a".into(),
            source_url: "https://www.cms.gov/files/zip/rvu25a.zip".into(),
            license: "public-domain".into(),
            attribution_required: true,
            fetched_at: "2025-01-15T08:00:00Z".into(),
            discovered_from: "https://www.cms.gov/medicare/payment/fee-schedules".into(),
            files: vec![ManifestFile {
                filename: "PPRRVU25.txt".into(),
                source_url: "https://www.cms.gov/files/PPRRVU25.txt".into(),
                sha256: "ab".repeat(32),
                size_bytes: 1024,
                content_type: "text/plain".into(),
                last_modified: None,
                etag: None,
                dataset: "pprrvu".into(),
            }],
        };
        let a = emit_jcs(&manifest).unwrap();
        let b = emit_jcs(&manifest).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"attribution_required\":true"));
        // Optional fields are omitted, not null.
        assert!(!a.contains("last_modified"));
    }
}
