//! Record ⇄ wire JSON translation
//!
//! The mapper uses a [`SchemaDocument`] to rename attributes, to bind lookups
//! through the right navigation property, and to rebuild lookups, formatted
//! values and expanded records when reading.

pub mod fetchxml;

use log::{debug, warn};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::constants::annotations::{
    FORMATTED_VALUE, LOOKUP_LOGICAL_NAME, ODATA_BIND, ODATA_TYPE,
};
use crate::error::Result;
use crate::model::{Record, RecordRef, Value};
use crate::schema::{EntitySchema, NavigationTargets, OutboundMapping, SchemaDocument};

pub use fetchxml::{AliasTypeMap, FetchAttribute};

/// Translates records using one schema document
#[derive(Debug, Clone)]
pub struct EntityMapper {
    schema: Arc<SchemaDocument>,
}

impl EntityMapper {
    pub fn new(schema: impl Into<Arc<SchemaDocument>>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &SchemaDocument {
        &self.schema
    }

    /// Wire payload for the changed attributes of `record`
    ///
    /// Unchanged attributes are never sent. A lookup set to null is written as
    /// its raw foreign-key field so an update removes the relationship.
    pub fn serialize(&self, record: &Record) -> Result<Map<String, Json>> {
        let schema = self.schema.entity_schema(&record.logical_name)?;
        let mut payload = Map::new();

        for field in record.changed_fields() {
            let value = record.get(field).cloned().unwrap_or_default();

            match schema.outbound_for(field) {
                None => {
                    warn!(
                        "Attribute '{}' of '{}' has no outbound mapping, skipping",
                        field, record.logical_name
                    );
                }
                Some(OutboundMapping::Field(wire)) => match value {
                    Value::Scalar(json) => {
                        payload.insert(wire.clone(), json);
                    }
                    other => warn!(
                        "Attribute '{}' of '{}' is not a lookup but holds {}, skipping",
                        field, record.logical_name, other
                    ),
                },
                Some(OutboundMapping::Navigation(targets)) => match value {
                    Value::Scalar(Json::Null) => {
                        payload.insert(schema.foreign_key_field(field), Json::Null);
                    }
                    Value::Reference(reference) => {
                        self.bind(&mut payload, field, targets, &reference)
                    }
                    Value::Record(related) => {
                        self.bind(&mut payload, field, targets, &related.to_reference())
                    }
                    Value::Scalar(other) => warn!(
                        "Lookup '{}' of '{}' needs a record reference, got {}; skipping",
                        field, record.logical_name, other
                    ),
                },
            }
        }

        Ok(payload)
    }

    fn bind(
        &self,
        payload: &mut Map<String, Json>,
        field: &str,
        targets: &NavigationTargets,
        reference: &RecordRef,
    ) {
        let Some(navigation) = targets.get(&reference.logical_name) else {
            warn!(
                "Lookup '{}' cannot point at '{}' (allowed: {}), skipping",
                field,
                reference.logical_name,
                targets.targets().collect::<Vec<_>>().join(", ")
            );
            return;
        };

        let collection = match self.schema.collection_name(&reference.logical_name) {
            Ok(collection) => collection,
            Err(e) => {
                warn!("Cannot bind lookup '{}': {}", field, e);
                return;
            }
        };

        let key = match reference.key_segment() {
            Ok(key) => key,
            Err(e) => {
                warn!("Cannot bind lookup '{}': {}", field, e);
                return;
            }
        };

        payload.insert(
            format!("{}{}", navigation, ODATA_BIND),
            Json::String(format!("/{}({})", collection, key)),
        );
    }

    /// Build a record of `entity` from a wire object, taking its id from the schema key
    pub fn deserialize_wire(
        &self,
        entity: &str,
        wire: &Map<String, Json>,
        aliases: Option<&AliasTypeMap>,
    ) -> Result<Record> {
        let schema = self.schema.entity_schema(entity)?;
        let reference = identity_of(schema, wire);
        self.deserialize(wire, reference, aliases)
    }

    /// Build a record from a wire object
    ///
    /// `reference` supplies the entity type and identity. `aliases` is the
    /// map produced by [`alias_type_map`](Self::alias_type_map) for FetchXML
    /// results, where the service omits lookup type annotations on aliased
    /// and linked columns.
    pub fn deserialize(
        &self,
        wire: &Map<String, Json>,
        reference: RecordRef,
        aliases: Option<&AliasTypeMap>,
    ) -> Result<Record> {
        let schema = self.schema.entity_schema(&reference.logical_name)?;

        let mut record = Record::new(&reference.logical_name);
        record.id = reference.id;
        record.key_attributes = reference.key_attributes;

        for (wire_field, value) in wire {
            if wire_field.contains('@') {
                continue;
            }

            let logical = match schema.logical_name_for(wire_field) {
                Some(logical) => logical.to_string(),
                None => {
                    if let Json::Object(object) = value {
                        if let Some((logical, related)) =
                            self.deserialize_expanded(schema, wire_field, object, aliases)?
                        {
                            record.load(logical, Value::Record(Box::new(related)));
                            continue;
                        }
                    }
                    debug!(
                        "Field '{}' of '{}' is not in the inbound map, keeping wire name",
                        wire_field, reference.logical_name
                    );
                    wire_field.clone()
                }
            };

            let lookup_type = annotation(wire, wire_field, LOOKUP_LOGICAL_NAME);
            let formatted = annotation(wire, wire_field, FORMATTED_VALUE);

            let mut attribute = match (lookup_type, value.as_str()) {
                (Some(target), Some(id)) => Value::Reference(RecordRef::new(target, id)),
                (None, Some(id)) if formatted.is_some() && Uuid::parse_str(id).is_ok() => {
                    match aliases.and_then(|map| map.get(wire_field.as_str())) {
                        Some(target) => Value::Reference(RecordRef::new(target, id)),
                        None => Value::Scalar(value.clone()),
                    }
                }
                _ => Value::Scalar(value.clone()),
            };

            if let Some(formatted) = formatted {
                record.load_formatted(&logical, formatted);
                if let Value::Reference(reference) = &mut attribute {
                    reference.name = Some(formatted.to_string());
                }
            }

            record.load(logical, attribute);
        }

        Ok(record)
    }

    /// Deserialize an expanded single-valued navigation property
    ///
    /// Returns the lookup attribute it belongs to and the related record, or
    /// `None` when the related type cannot be determined.
    fn deserialize_expanded(
        &self,
        schema: &EntitySchema,
        navigation: &str,
        object: &Map<String, Json>,
        aliases: Option<&AliasTypeMap>,
    ) -> Result<Option<(String, Record)>> {
        let found = schema.find_navigation(navigation);

        let declared_type = object
            .get(ODATA_TYPE)
            .and_then(Json::as_str)
            .map(|t| t.trim_start_matches('#').rsplit('.').next().unwrap_or(t).to_string())
            .filter(|t| self.schema.supports(t));

        let Some(target) = declared_type.or_else(|| found.map(|(_, target)| target.to_string()))
        else {
            debug!(
                "Cannot determine the type of expanded property '{}' on '{}'",
                navigation, schema.name
            );
            return Ok(None);
        };

        let logical = found
            .map(|(logical, _)| logical.to_string())
            .unwrap_or_else(|| navigation.to_string());

        let target_schema = self.schema.entity_schema(&target)?;
        let reference = identity_of(target_schema, object);
        let related = self.deserialize(object, reference, aliases)?;
        Ok(Some((logical, related)))
    }

    /// Map FetchXML response columns that are lookups to their target entity
    ///
    /// Multi-target lookups resolve to their first declared target.
    pub fn alias_type_map(&self, fetch_xml: &str) -> Result<AliasTypeMap> {
        let mut map = AliasTypeMap::new();

        for attribute in fetchxml::selected_attributes(fetch_xml)? {
            let Ok(schema) = self.schema.entity_schema(&attribute.entity) else {
                debug!("FetchXML entity '{}' is not in the schema", attribute.entity);
                continue;
            };
            let Some(targets) = schema
                .outbound_for(&attribute.name)
                .and_then(OutboundMapping::as_navigation)
            else {
                continue;
            };
            if let Some((target, _)) = targets.first() {
                map.insert(attribute.response_key(), target.to_string());
            }
        }

        Ok(map)
    }
}

/// Identity of a wire object according to the schema's key attribute
fn identity_of(schema: &EntitySchema, wire: &Map<String, Json>) -> RecordRef {
    let id = schema
        .key
        .as_deref()
        .and_then(|key| wire.get(key))
        .and_then(Json::as_str);

    match id {
        Some(id) => RecordRef::new(&schema.name, id),
        None => RecordRef::unidentified(&schema.name),
    }
}

fn annotation<'w>(wire: &'w Map<String, Json>, field: &str, suffix: &str) -> Option<&'w str> {
    wire.get(&format!("{}{}", field, suffix)).and_then(Json::as_str)
}
