use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human-readable identifier for a logical CMS publication.
///
/// Release ids are chosen by the operator (for example
/// `rvu25a_2025q1`) and name the raw and curated trees on disk.
/// They are never generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one end-to-end pipeline execution over a release.
///
/// Batch ids are opaque UUIDs. Reruns of the same release always get a
/// fresh batch id; published artifacts are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Generate a fresh batch id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a persisted resolver trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_unique() {
        let a = BatchId::generate();
        let b = BatchId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn release_id_round_trips_through_serde() {
        let id = ReleaseId::new("rvu25a_2025q1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"rvu25a_2025q1\"");
        let back: ReleaseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
