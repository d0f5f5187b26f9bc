//! Release discovery: what to fetch and where from.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cmspipe_types::{PipelineError, ReleaseId, SourceError};

/// A reference to one upstream artifact. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Dataset this file feeds (`conversion_factor`, `gpci`, …).
    pub dataset: String,
    pub url: String,
    pub filename: String,
    pub content_type: String,
    /// Digest published upstream, when one is known in advance.
    pub expected_sha256: Option<String>,
    pub size_bytes: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// A logical CMS publication and its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub release_id: ReleaseId,
    pub vintage_date: String,
    pub product_year: i64,
    pub quarter_vintage: String,
    pub source_url: String,
    pub license: String,
    pub attribution_required: bool,
    pub discovered_from: String,
    pub files: Vec<SourceFile>,
}

/// Discovery plus fetch for one release.
///
/// `describe` must be deterministic for a given release: landing the
/// same release twice enumerates the same files in the same order.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn describe(&self) -> ReleaseDescriptor;

    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, PipelineError>;
}

/// In-memory provider for tests and local replays: discovery is a
/// fixed descriptor and fetch serves from a byte map.
pub struct FixtureProvider {
    descriptor: ReleaseDescriptor,
    bodies: HashMap<String, Vec<u8>>,
}

impl FixtureProvider {
    pub fn new(
        descriptor: ReleaseDescriptor,
        bodies: impl IntoIterator<Item = (&'static str, Vec<u8>)>,
    ) -> Self {
        Self {
            descriptor,
            bodies: bodies
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), bytes))
                .collect(),
        }
    }
}

#[async_trait]
impl SourceProvider for FixtureProvider {
    fn describe(&self) -> ReleaseDescriptor {
        self.descriptor.clone()
    }

    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, PipelineError> {
        self.bodies.get(&file.filename).cloned().ok_or_else(|| {
            SourceError::MissingMember {
                archive: "<fixture>".to_string(),
                member: file.filename.clone(),
            }
            .into()
        })
    }
}
