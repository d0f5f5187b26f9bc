use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmspipe_types::{RoundingMode, Severity};

/// Metadata columns injected after validation. These are excluded
/// from row content hashes by construction: changing the release id
/// or source filename must never change a row's hash.
pub const METADATA_COLUMNS: [&str; 9] = [
    "release_id",
    "vintage_date",
    "product_year",
    "quarter_vintage",
    "source_filename",
    "source_file_sha256",
    "parsed_at",
    "schema_id",
    "row_content_hash",
];

/// Declared type of a data column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ColumnType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }
}

/// One column of a schema contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
    pub description: String,
    /// Regex the string form must match (anchored by convention).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Fractional digits for float columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounding: Option<RoundingMode>,
    /// Allowed categorical values (case-sensitive after normalization).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<String>>,
    pub domain_severity: Severity,
    /// Counted toward the completeness threshold when true.
    pub critical: bool,
}

impl ColumnSpec {
    /// Plain string column, non-null, critical.
    #[must_use]
    pub fn string(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ColumnType::String,
            nullable: false,
            description: description.to_string(),
            pattern: None,
            precision: None,
            rounding: None,
            domain: None,
            domain_severity: Severity::Block,
            critical: true,
        }
    }

    /// Float column rounded HALF_UP to `precision` digits.
    #[must_use]
    pub fn decimal(name: &str, description: &str, precision: u32) -> Self {
        Self {
            ty: ColumnType::Float,
            precision: Some(precision),
            rounding: Some(RoundingMode::HalfUp),
            ..Self::string(name, description)
        }
    }

    /// ISO date column.
    #[must_use]
    pub fn date(name: &str, description: &str) -> Self {
        Self {
            ty: ColumnType::Date,
            ..Self::string(name, description)
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.critical = false;
        self
    }

    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: &[&str]) -> Self {
        self.domain = Some(domain.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub fn with_domain_severity(mut self, severity: Severity) -> Self {
        self.domain_severity = severity;
        self
    }

    #[must_use]
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = Some(rounding);
        self
    }
}

/// Versioned schema contract for one dataset.
///
/// Identified by `schema_id = <dataset>_v<major>.<minor>`. Major bumps
/// on breaking column changes, minor on additive ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContract {
    pub dataset: String,
    pub major: u32,
    pub minor: u32,
    pub description: String,
    pub source: String,
    pub classification: String,
    pub license: String,
    pub attribution_required: bool,
    pub columns: Vec<ColumnSpec>,
    /// Ordered tuple uniquely identifying a row within a vintage.
    pub natural_keys: Vec<String>,
    /// Column order used for content hashing and parquet output.
    pub column_order: Vec<String>,
}

impl SchemaContract {
    #[must_use]
    pub fn schema_id(&self) -> String {
        format!("{}_v{}.{}", self.dataset, self.major, self.minor)
    }

    #[must_use]
    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of columns counted toward completeness.
    #[must_use]
    pub fn critical_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.critical)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// The on-disk `schema_contract.json` shape.
    #[must_use]
    pub fn to_disk_value(&self, created_at: DateTime<Utc>) -> serde_json::Value {
        let columns: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|c| {
                let mut obj = serde_json::Map::new();
                obj.insert("name".into(), c.name.clone().into());
                obj.insert("type".into(), c.ty.as_str().into());
                obj.insert("nullable".into(), c.nullable.into());
                obj.insert("description".into(), c.description.clone().into());
                if let Some(p) = &c.pattern {
                    obj.insert("pattern".into(), p.clone().into());
                }
                if let Some(p) = c.precision {
                    obj.insert("precision".into(), p.into());
                }
                if let Some(r) = &c.rounding {
                    obj.insert(
                        "rounding".into(),
                        serde_json::to_value(r).unwrap_or_default(),
                    );
                }
                (c.name.clone(), serde_json::Value::Object(obj))
            })
            .collect();

        serde_json::json!({
            "name": self.dataset,
            "version": self.version(),
            "description": self.description,
            "source": self.source,
            "classification": self.classification,
            "license": self.license,
            "attribution_required": self.attribution_required,
            "schema_version": self.schema_id(),
            "created_at": created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "columns": columns,
            "natural_keys": self.natural_keys,
            "column_order": self.column_order,
            "hash_metadata_exclusions": METADATA_COLUMNS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaContract {
        SchemaContract {
            dataset: "conversion_factor".into(),
            major: 1,
            minor: 0,
            description: "CMS conversion factors".into(),
            source: "https://www.cms.gov".into(),
            classification: "public".into(),
            license: "public-domain".into(),
            attribution_required: true,
            columns: vec![
                ColumnSpec::string("cf_type", "factor type")
                    .with_domain(&["physician", "anesthesia"]),
                ColumnSpec::decimal("cf_value", "dollars per RVU", 4),
            ],
            natural_keys: vec!["cf_type".into()],
            column_order: vec!["cf_type".into(), "cf_value".into()],
        }
    }

    #[test]
    fn schema_id_format() {
        assert_eq!(sample().schema_id(), "conversion_factor_v1.0");
    }

    #[test]
    fn disk_value_carries_hash_exclusions() {
        let v = sample().to_disk_value(Utc::now());
        let exclusions = v["hash_metadata_exclusions"].as_array().unwrap();
        assert_eq!(exclusions.len(), METADATA_COLUMNS.len());
        assert!(exclusions.iter().any(|e| e == "parsed_at"));
        assert_eq!(v["columns"]["cf_value"]["precision"], 4);
    }

    #[test]
    fn nullable_clears_critical() {
        let c = ColumnSpec::string("modifier", "HCPCS modifier").nullable();
        assert!(c.nullable);
        assert!(!c.critical);
    }
}
