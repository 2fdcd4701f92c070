use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use crate::domain::{CATALOG_FIELD, ID_FIELD, SOURCE_FIELD, SourceDescriptor, TYPE_FIELD, URN_FIELD};
use crate::error::PhenolinkError;
use crate::value::{remove_empty, text_form};

/// Encode a canonical URI into its portable global identifier. Empty input
/// encodes to absent, never to an encoded empty string.
pub fn uri_encode(uri: &str) -> Option<String> {
    if uri.is_empty() {
        return None;
    }
    Some(BASE64.encode(uri))
}

/// Exact inverse of [`uri_encode`].
pub fn uri_decode(encoded: &str) -> Result<String, PhenolinkError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| PhenolinkError::InvalidGlobalIdentifier(encoded.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|_| PhenolinkError::InvalidGlobalIdentifier(encoded.to_string()))
}

/// Synthetic index key for a record: `urn:<source-code>/<entity>/<local-id>`.
pub fn urn(source: &SourceDescriptor, entity: &str, local_id: &str) -> String {
    format!("urn:{}/{}/{}", source.identifier, entity, local_id)
}

/// One normalized record's contribution to the global identifier mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFragment {
    pub entity: String,
    pub local_id: String,
    pub global_id: Option<String>,
    /// URN→URI alias, present when the record carries its own canonical URI.
    pub alias: Option<(String, String)>,
}

/// Normalize a raw record into its global form.
///
/// Extracts the local `<entity>DbId` identifier, computes URN, canonical URI
/// and global identifier, stamps identity and provenance fields, strips empty
/// fields and returns the record together with its mapping fragment. Performs
/// no lookups and touches no shared state.
pub fn normalize(
    source: &SourceDescriptor,
    entity: &str,
    mut record: Value,
) -> Result<(Value, MappingFragment), PhenolinkError> {
    let fields = record.as_object_mut().ok_or_else(|| {
        PhenolinkError::MalformedRecord(format!("{entity} record is not a mapping"))
    })?;

    let id_field = format!("{entity}DbId");
    let local_id = fields
        .get(&id_field)
        .filter(|value| !value.is_null())
        .map(text_form)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PhenolinkError::MissingIdentifier {
            entity: entity.to_string(),
        })?;

    let urn = self::urn(source, entity, &local_id);

    // Sources may publish their own canonical URI; the URN stands in otherwise.
    let uri_field = format!("{entity}PUI");
    let uri = fields
        .get(&uri_field)
        .and_then(Value::as_str)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| urn.clone());
    let global_id = uri_encode(&uri);

    fields.insert(ID_FIELD.to_string(), Value::String(uri.clone()));
    fields.insert(TYPE_FIELD.to_string(), Value::String(entity.to_string()));
    fields.insert(CATALOG_FIELD.to_string(), Value::String(source.id.clone()));
    fields.insert(SOURCE_FIELD.to_string(), Value::String(source.id.clone()));
    fields.insert(URN_FIELD.to_string(), Value::String(urn.clone()));
    fields.insert(
        id_field,
        global_id.clone().map(Value::String).unwrap_or(Value::Null),
    );
    fields.insert(uri_field, Value::String(uri.clone()));

    remove_empty(&mut record);

    let alias = (urn != uri).then(|| (urn, uri));
    let fragment = MappingFragment {
        entity: entity.to_string(),
        local_id,
        global_id,
        alias,
    };
    Ok((record, fragment))
}

/// Write side of the global identifier mapping. Accumulates fragments during
/// the normalization pass; [`IdMappingBuilder::seal`] is the phase transition
/// after which only lookups are possible.
#[derive(Debug, Default)]
pub struct IdMappingBuilder {
    ids: HashMap<(String, String), Option<String>>,
    aliases: HashMap<String, String>,
}

impl IdMappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fragment: MappingFragment) -> Result<(), PhenolinkError> {
        let key = (fragment.entity, fragment.local_id);
        if let Some(existing) = self.ids.get(&key) {
            if *existing != fragment.global_id {
                return Err(PhenolinkError::IdentifierCollision {
                    entity: key.0,
                    id: key.1,
                    existing: existing.clone().unwrap_or_default(),
                    incoming: fragment.global_id.unwrap_or_default(),
                });
            }
        } else {
            self.ids.insert(key, fragment.global_id);
        }
        if let Some((urn, uri)) = fragment.alias {
            self.aliases.insert(urn, uri);
        }
        Ok(())
    }

    /// Union with a builder filled by another worker. The reduction step of a
    /// parallel normalization pass; key collisions are hard errors here too.
    pub fn merge(&mut self, other: IdMappingBuilder) -> Result<(), PhenolinkError> {
        for ((entity, local_id), global_id) in other.ids {
            self.insert(MappingFragment {
                entity,
                local_id,
                global_id,
                alias: None,
            })?;
        }
        self.aliases.extend(other.aliases);
        Ok(())
    }

    pub fn seal(self) -> IdMapping {
        IdMapping {
            ids: self.ids,
            aliases: self.aliases,
        }
    }
}

/// Read side of the global identifier mapping, complete by construction: the
/// link pass may assume every dereferenced identifier is present.
#[derive(Debug)]
pub struct IdMapping {
    ids: HashMap<(String, String), Option<String>>,
    aliases: HashMap<String, String>,
}

impl IdMapping {
    /// Global identifier for a local identifier. An absent key signals broken
    /// referential integrity upstream and is an error; a key mapped to an
    /// absent identifier yields `None` and is skippable.
    pub fn global_identifier(
        &self,
        entity: &str,
        local_id: &str,
    ) -> Result<Option<&str>, PhenolinkError> {
        self.ids
            .get(&(entity.to_string(), local_id.to_string()))
            .map(Option::as_deref)
            .ok_or_else(|| PhenolinkError::UnresolvedIdentifier {
                entity: entity.to_string(),
                id: local_id.to_string(),
            })
    }

    /// Canonical URI aliased to a URN, when the two differ.
    pub fn aliased_uri(&self, urn: &str) -> Option<&str> {
        self.aliases.get(urn).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
