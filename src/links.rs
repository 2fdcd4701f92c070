use regex::Regex;
use serde_json::Value;

use crate::error::PhenolinkError;
use crate::identity::{IdMapping, uri_decode, uri_encode};
use crate::value::{as_list, text_form};

/// `<entity>DbId`, `<entity>DbIds`, `<entity>PUI`, `<entity>PUIs`.
const LINK_FIELD_PATTERN: &str = r"^([a-zA-Z][A-Za-z0-9]*?)(DbId|PUI)(s?)$";

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkKind {
    DbId,
    Pui,
}

#[derive(Debug, Clone)]
struct LinkField {
    entity: String,
    field: String,
    plural: bool,
    values: Vec<Value>,
}

/// Rewrites reference fields of persisted records in both directions once the
/// global identifier mapping is complete: local identifiers become canonical
/// URIs and canonical URIs become encoded global identifiers.
#[derive(Debug)]
pub struct LinkResolver<'a> {
    mapping: &'a IdMapping,
    pattern: Regex,
}

impl<'a> LinkResolver<'a> {
    pub fn new(mapping: &'a IdMapping) -> Self {
        let pattern = Regex::new(LINK_FIELD_PATTERN).unwrap();
        Self { mapping, pattern }
    }

    fn link_fields(&self, record: &Value, kind: LinkKind) -> Vec<LinkField> {
        let Some(fields) = record.as_object() else {
            return Vec::new();
        };
        let suffix = match kind {
            LinkKind::DbId => "DbId",
            LinkKind::Pui => "PUI",
        };
        fields
            .iter()
            .filter_map(|(name, value)| {
                let captures = self.pattern.captures(name)?;
                if &captures[2] != suffix {
                    return None;
                }
                Some(LinkField {
                    entity: captures[1].to_string(),
                    field: name.clone(),
                    plural: !captures[3].is_empty(),
                    values: as_list(value),
                })
            })
            .collect()
    }

    /// Rewrite one record in place; returns the number of fields written.
    /// Idempotent: the identifier direction short-circuits on a present URI
    /// partner and the URI direction recomputes the same encoded values.
    pub fn rewrite(&self, record: &mut Value) -> Result<usize, PhenolinkError> {
        if !record.is_object() {
            return Ok(0);
        }
        let mut written = 0;

        // Local identifiers -> canonical URIs, for records the source only
        // linked by identifier.
        for link in self.link_fields(record, LinkKind::DbId) {
            let uri_field = format!(
                "{}PUI{}",
                link.entity,
                if link.plural { "s" } else { "" }
            );
            if record.get(&uri_field).is_some() {
                continue;
            }
            let mut uris: Vec<String> = Vec::new();
            for id_value in &link.values {
                if id_value.is_null() {
                    continue;
                }
                let local_id = text_form(id_value);
                if let Some(global_id) = self.mapping.global_identifier(&link.entity, &local_id)? {
                    let uri = uri_decode(global_id)?;
                    if !uris.contains(&uri) {
                        uris.push(uri);
                    }
                }
            }
            if uris.is_empty() {
                continue;
            }
            let value = if link.plural {
                Value::Array(uris.into_iter().map(Value::String).collect())
            } else {
                Value::String(uris.remove(0))
            };
            if let Some(fields) = record.as_object_mut() {
                fields.insert(uri_field, value);
                written += 1;
            }
        }

        // Canonical URIs -> encoded global identifiers.
        for link in self.link_fields(record, LinkKind::Pui) {
            let id_field = format!(
                "{}DbId{}",
                link.entity,
                if link.plural { "s" } else { "" }
            );
            let mut ids: Vec<String> = Vec::new();
            for uri_value in &link.values {
                if let Some(encoded) = uri_encode(&text_form(uri_value)) {
                    if !ids.contains(&encoded) {
                        ids.push(encoded);
                    }
                }
            }
            if ids.is_empty() {
                continue;
            }
            let value = if link.plural {
                Value::Array(ids.into_iter().map(Value::String).collect())
            } else {
                Value::String(ids.remove(0))
            };
            if let Some(fields) = record.as_object_mut() {
                fields.insert(id_field, value);
                written += 1;
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use crate::identity::{IdMappingBuilder, MappingFragment};

    use super::*;

    fn mapping_with(entries: &[(&str, &str, &str)]) -> IdMapping {
        let mut builder = IdMappingBuilder::new();
        for (entity, id, uri) in entries {
            builder
                .insert(MappingFragment {
                    entity: entity.to_string(),
                    local_id: id.to_string(),
                    global_id: uri_encode(uri),
                    alias: None,
                })
                .unwrap();
        }
        builder.seal()
    }

    #[test]
    fn rewrites_identifiers_to_uris() {
        let mapping = mapping_with(&[
            ("study", "1", "urn:EX/study/1"),
            ("study", "2", "urn:EX/study/2"),
            ("trial", "t1", "urn:EX/trial/t1"),
        ]);
        let resolver = LinkResolver::new(&mapping);

        let mut record = json!({
            "studyDbIds": [1, 2],
            "trialDbId": "t1"
        });
        resolver.rewrite(&mut record).unwrap();

        assert_eq!(
            record["studyPUIs"],
            json!(["urn:EX/study/1", "urn:EX/study/2"])
        );
        assert_eq!(record["trialPUI"], json!("urn:EX/trial/t1"));
        // Second direction encodes the freshly written URIs back.
        assert_eq!(
            record["studyDbIds"],
            json!([
                uri_encode("urn:EX/study/1").unwrap(),
                uri_encode("urn:EX/study/2").unwrap()
            ])
        );
        assert_eq!(
            record["trialDbId"],
            json!(uri_encode("urn:EX/trial/t1").unwrap())
        );
    }

    #[test]
    fn present_uri_field_short_circuits() {
        let mapping = mapping_with(&[]);
        let resolver = LinkResolver::new(&mapping);

        // No mapping entry for study/9, but the URI partner is present, so
        // the identifier is never dereferenced.
        let mut record = json!({
            "studyDbId": 9,
            "studyPUI": "urn:EX/study/9"
        });
        resolver.rewrite(&mut record).unwrap();
        assert_eq!(
            record["studyDbId"],
            json!(uri_encode("urn:EX/study/9").unwrap())
        );
    }

    #[test]
    fn unknown_identifier_is_fatal() {
        let mapping = mapping_with(&[("study", "1", "urn:EX/study/1")]);
        let resolver = LinkResolver::new(&mapping);

        let mut record = json!({"studyDbIds": [1, "ghost"]});
        let err = resolver.rewrite(&mut record).unwrap_err();
        assert_matches!(err, PhenolinkError::UnresolvedIdentifier { .. });
    }

    #[test]
    fn absent_global_identifier_is_skipped() {
        let mut builder = IdMappingBuilder::new();
        builder
            .insert(MappingFragment {
                entity: "study".to_string(),
                local_id: "1".to_string(),
                global_id: None,
                alias: None,
            })
            .unwrap();
        let mapping = builder.seal();
        let resolver = LinkResolver::new(&mapping);

        let mut record = json!({"studyDbId": 1});
        resolver.rewrite(&mut record).unwrap();
        // No identifier resolved, so the URI field stays unset.
        assert!(record.get("studyPUI").is_none());
    }

    #[test]
    fn rewrite_is_idempotent() {
        let mapping = mapping_with(&[("study", "1", "urn:EX/study/1")]);
        let resolver = LinkResolver::new(&mapping);

        let mut once = json!({"studyDbIds": [1]});
        resolver.rewrite(&mut once).unwrap();
        let mut twice = once.clone();
        resolver.rewrite(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_link_fields_are_untouched() {
        let mapping = mapping_with(&[]);
        let resolver = LinkResolver::new(&mapping);

        let mut record = json!({"name": "x", "DbIds": [1], "studyDbIdList": [2]});
        let written = resolver.rewrite(&mut record).unwrap();
        assert_eq!(written, 0);
        assert_eq!(record, json!({"name": "x", "DbIds": [1], "studyDbIdList": [2]}));
    }
}
