//! Parsed schema document and per-entity field maps

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Navigation properties of one lookup, keyed by target entity, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTargets(Vec<(String, String)>);

impl NavigationTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigation property used when the lookup points at `target`
    pub fn get(&self, target: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(entity, _)| entity == target)
            .map(|(_, nav)| nav.as_str())
    }

    pub fn contains_target(&self, target: &str) -> bool {
        self.get(target).is_some()
    }

    /// Set the navigation property for `target`, keeping its original position
    pub fn insert(&mut self, target: impl Into<String>, navigation: impl Into<String>) {
        let target = target.into();
        let navigation = navigation.into();
        match self.0.iter_mut().find(|(entity, _)| *entity == target) {
            Some((_, nav)) => *nav = navigation,
            None => self.0.push((target, navigation)),
        }
    }

    /// Entry for the first declared target
    pub fn first(&self) -> Option<(&str, &str)> {
        self.0
            .first()
            .map(|(entity, nav)| (entity.as_str(), nav.as_str()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(entity, _)| entity.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(entity, nav)| (entity.as_str(), nav.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`; entries of `other` win per target
    pub fn merge(&mut self, other: &NavigationTargets) {
        for (target, nav) in other.iter() {
            self.insert(target, nav);
        }
    }
}

/// Where a logical attribute goes on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMapping {
    /// Plain property written under this wire name
    Field(String),
    /// Lookup bound through one navigation property per target entity
    Navigation(NavigationTargets),
}

impl OutboundMapping {
    pub fn as_navigation(&self) -> Option<&NavigationTargets> {
        match self {
            OutboundMapping::Navigation(targets) => Some(targets),
            OutboundMapping::Field(_) => None,
        }
    }
}

/// Field maps for one entity type, inherited entries included
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub key: Option<String>,
    pub is_abstract: bool,
    pub base_type: Option<String>,
    /// Wire field name → logical attribute name
    pub inbound: HashMap<String, String>,
    /// Logical attribute name → wire mapping
    pub outbound: HashMap<String, OutboundMapping>,
    /// Logical attribute name → EDM type (e.g. `Edm.String`)
    pub field_types: HashMap<String, String>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn logical_name_for(&self, wire_field: &str) -> Option<&str> {
        self.inbound.get(wire_field).map(String::as_str)
    }

    pub fn outbound_for(&self, logical_field: &str) -> Option<&OutboundMapping> {
        self.outbound.get(logical_field)
    }

    pub fn field_type(&self, logical_field: &str) -> Option<&str> {
        self.field_types.get(logical_field).map(String::as_str)
    }

    /// Raw foreign-key wire field backing a lookup (`_parentcustomerid_value`)
    pub fn foreign_key_field(&self, logical_field: &str) -> String {
        let mut candidates: Vec<&str> = self
            .inbound
            .iter()
            .filter(|(wire, logical)| logical.as_str() == logical_field && wire.as_str() != logical_field)
            .map(|(wire, _)| wire.as_str())
            .collect();
        candidates.sort_unstable();

        match candidates.first() {
            Some(wire) => wire.to_string(),
            None => format!("_{}_value", logical_field),
        }
    }

    /// Lookup attribute and target entity served by a navigation property
    ///
    /// The first declared target wins when several share the property.
    pub fn find_navigation(&self, navigation: &str) -> Option<(&str, &str)> {
        let mut matches: Vec<(&str, &str)> = self
            .outbound
            .iter()
            .filter_map(|(logical, mapping)| {
                let targets = mapping.as_navigation()?;
                targets
                    .iter()
                    .find(|(_, nav)| *nav == navigation)
                    .map(|(target, _)| (logical.as_str(), target))
            })
            .collect();
        matches.sort_unstable();
        matches.into_iter().next()
    }

    /// Overlay a derived type's own maps on top of this (base) schema
    pub(crate) fn rebase(base: &EntitySchema, own: &EntitySchema) -> EntitySchema {
        let mut merged = base.clone();
        merged.name = own.name.clone();
        merged.is_abstract = own.is_abstract;
        merged.base_type = own.base_type.clone();
        if own.key.is_some() {
            merged.key = own.key.clone();
        }

        merged
            .inbound
            .extend(own.inbound.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .field_types
            .extend(own.field_types.iter().map(|(k, v)| (k.clone(), v.clone())));

        for (logical, mapping) in &own.outbound {
            match (merged.outbound.get_mut(logical), mapping) {
                (
                    Some(OutboundMapping::Navigation(existing)),
                    OutboundMapping::Navigation(targets),
                ) => existing.merge(targets),
                _ => {
                    merged.outbound.insert(logical.clone(), mapping.clone());
                }
            }
        }

        merged
    }
}

/// All entity schemas of one service version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub namespace: String,
    pub alias: Option<String>,
    pub entities: HashMap<String, EntitySchema>,
    /// Entity type → entity set (collection) name
    pub collections: HashMap<String, String>,
}

impl SchemaDocument {
    pub fn entity_schema(&self, entity: &str) -> Result<&EntitySchema> {
        self.entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_supported(entity))
    }

    pub fn collection_name(&self, entity: &str) -> Result<&str> {
        self.collections
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| Error::entity_not_supported(entity))
    }

    /// Entity type stored in a collection
    pub fn entity_type_for_collection(&self, collection: &str) -> Option<&str> {
        self.collections
            .iter()
            .find(|(_, set)| set.as_str() == collection)
            .map(|(entity, _)| entity.as_str())
    }

    pub fn supports(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(entries: &[(&str, &str)]) -> NavigationTargets {
        let mut targets = NavigationTargets::new();
        for (target, nav) in entries {
            targets.insert(*target, *nav);
        }
        targets
    }

    #[test]
    fn test_navigation_targets_merge_keeps_order() {
        let mut base = targets(&[("account", "parentcustomerid_account"), ("contact", "old")]);
        base.merge(&targets(&[("contact", "parentcustomerid_contact"), ("lead", "x")]));

        assert_eq!(
            base.iter().collect::<Vec<_>>(),
            vec![
                ("account", "parentcustomerid_account"),
                ("contact", "parentcustomerid_contact"),
                ("lead", "x"),
            ]
        );
        assert_eq!(base.first(), Some(("account", "parentcustomerid_account")));
    }

    #[test]
    fn test_rebase_own_entries_win() {
        let mut base = EntitySchema::new("base");
        base.key = Some("baseid".into());
        base.inbound.insert("name".into(), "name".into());
        base.inbound.insert("code".into(), "code".into());
        base.outbound.insert(
            "ownerid".into(),
            OutboundMapping::Navigation(targets(&[("systemuser", "owninguser")])),
        );

        let mut own = EntitySchema::new("derived");
        own.base_type = Some("base".into());
        own.inbound.insert("code".into(), "derived_code".into());
        own.outbound.insert(
            "ownerid".into(),
            OutboundMapping::Navigation(targets(&[("team", "owningteam")])),
        );

        let merged = EntitySchema::rebase(&base, &own);
        assert_eq!(merged.name, "derived");
        assert_eq!(merged.key.as_deref(), Some("baseid"));
        assert_eq!(merged.logical_name_for("name"), Some("name"));
        assert_eq!(merged.logical_name_for("code"), Some("derived_code"));

        let owner = merged.outbound_for("ownerid").and_then(OutboundMapping::as_navigation);
        assert_eq!(owner.map(NavigationTargets::len), Some(2));
    }

    #[test]
    fn test_foreign_key_field() {
        let mut schema = EntitySchema::new("contact");
        schema
            .inbound
            .insert("_parentcustomerid_value".into(), "parentcustomerid".into());
        assert_eq!(
            schema.foreign_key_field("parentcustomerid"),
            "_parentcustomerid_value"
        );
        assert_eq!(schema.foreign_key_field("ownerid"), "_ownerid_value");
    }

    #[test]
    fn test_document_lookups_fail_for_unknown_entities() {
        let mut doc = SchemaDocument::default();
        doc.entities.insert("account".into(), EntitySchema::new("account"));
        doc.collections.insert("account".into(), "accounts".into());

        assert!(doc.entity_schema("account").is_ok());
        assert_eq!(doc.collection_name("account").unwrap(), "accounts");
        assert_eq!(doc.entity_type_for_collection("accounts"), Some("account"));
        assert!(matches!(
            doc.entity_schema("lead"),
            Err(Error::EntityNotSupported { .. })
        ));
        assert!(matches!(
            doc.collection_name("lead"),
            Err(Error::EntityNotSupported { .. })
        ));
    }
}
