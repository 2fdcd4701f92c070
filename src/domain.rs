use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PhenolinkError;

/// Record field holding the synthetic index key.
pub const URN_FIELD: &str = "URN";
/// Record field holding the canonical reference URI (JSON-LD identity).
pub const ID_FIELD: &str = "@id";
/// Record field holding the entity type name.
pub const TYPE_FIELD: &str = "@type";
/// Record field referencing the data catalog the record came from.
pub const CATALOG_FIELD: &str = "schema:includedInDataCatalog";
/// Short provenance field, same value as the catalog reference.
pub const SOURCE_FIELD: &str = "source";

/// Descriptor of one upstream data source: the catalog URI records point back
/// to and the short code used in URNs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "schema:identifier")]
    pub identifier: String,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identifier: identifier.into(),
        }
    }

    /// Read a descriptor out of a decoded source document.
    pub fn from_value(value: &Value) -> Result<Self, PhenolinkError> {
        let descriptor: SourceDescriptor = serde_json::from_value(value.clone())
            .map_err(|err| PhenolinkError::InvalidSource(err.to_string()))?;
        if descriptor.id.is_empty() || descriptor.identifier.is_empty() {
            return Err(PhenolinkError::InvalidSource(
                "empty @id or schema:identifier".to_string(),
            ));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn descriptor_from_source_document() {
        let value = json!({
            "@id": "https://urgi.versailles.inrae.fr/gnpis",
            "schema:identifier": "GnpIS",
            "schema:name": "GnpIS"
        });
        let descriptor = SourceDescriptor::from_value(&value).unwrap();
        assert_eq!(descriptor.identifier, "GnpIS");
        assert_eq!(descriptor.id, "https://urgi.versailles.inrae.fr/gnpis");
    }

    #[test]
    fn descriptor_rejects_missing_identity() {
        let err = SourceDescriptor::from_value(&json!({"@id": "x"})).unwrap_err();
        assert_matches!(err, PhenolinkError::InvalidSource(_));

        let err =
            SourceDescriptor::from_value(&json!({"@id": "", "schema:identifier": "GnpIS"}))
                .unwrap_err();
        assert_matches!(err, PhenolinkError::InvalidSource(_));
    }
}
