//! CSDL `$metadata` parser
//!
//! Builds a [`SchemaDocument`] from the service's EDMX document. Entity types
//! are first read with only their own properties, then every type is rebased
//! on its fully resolved base type so inheritance chains resolve no matter in
//! which order the document declares them.

use log::{debug, warn};
use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};

use super::document::{EntitySchema, NavigationTargets, OutboundMapping, SchemaDocument};
use crate::error::{Error, Result};

/// Parse a CSDL document into normalized per-entity field maps
pub fn parse_csdl(xml: &str) -> Result<SchemaDocument> {
    let doc = Document::parse(xml).map_err(|e| Error::parse(format!("Invalid CSDL XML: {}", e)))?;

    let schema_node = find_schema(&doc).ok_or_else(|| Error::parse("CSDL document has no Schema element"))?;

    let namespace = schema_node.attribute("Namespace").unwrap_or_default().to_string();
    let alias = schema_node.attribute("Alias").map(str::to_string);

    // Own (non-inherited) maps, in declaration order
    let mut declared: Vec<String> = Vec::new();
    let mut own: HashMap<String, EntitySchema> = HashMap::new();
    for node in schema_node.children().filter(|n| n.has_tag_name("EntityType")) {
        let schema = parse_entity_type(node)?;
        declared.push(schema.name.clone());
        own.insert(schema.name.clone(), schema);
    }

    let mut resolved: HashMap<String, EntitySchema> = HashMap::new();
    for name in &declared {
        let mut visiting = HashSet::new();
        resolve(name, &own, &mut resolved, &mut visiting)?;
    }

    expand_abstract_targets(&declared, &mut resolved);

    let collections = parse_entity_sets(&doc);

    debug!(
        "Parsed CSDL namespace '{}': {} entity types, {} entity sets",
        namespace,
        resolved.len(),
        collections.len()
    );

    Ok(SchemaDocument {
        namespace,
        alias,
        entities: resolved,
        collections,
    })
}

/// The Schema element that declares entity types (falls back to the first Schema)
fn find_schema<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let schemas: Vec<Node> = doc
        .descendants()
        .filter(|n| n.has_tag_name("Schema"))
        .collect();

    schemas
        .iter()
        .find(|schema| schema.children().any(|n| n.has_tag_name("EntityType")))
        .or(schemas.first())
        .copied()
}

/// Strip namespace or alias qualification: `mscrm.account` → `account`
fn short_type_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// `_parentcustomerid_value` → `parentcustomerid`
fn lookup_logical_name(wire: &str) -> Option<&str> {
    wire.strip_prefix('_')
        .and_then(|rest| rest.strip_suffix("_value"))
        .filter(|name| !name.is_empty())
}

fn parse_entity_type(node: Node) -> Result<EntitySchema> {
    let name = node
        .attribute("Name")
        .ok_or_else(|| Error::parse("EntityType without a Name attribute"))?;

    let mut schema = EntitySchema::new(name);
    schema.is_abstract = node.attribute("Abstract") == Some("true");
    schema.base_type = node.attribute("BaseType").map(|t| short_type_name(t).to_string());

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "Key" => {
                schema.key = child
                    .descendants()
                    .find(|n| n.has_tag_name("PropertyRef"))
                    .and_then(|n| n.attribute("Name"))
                    .map(str::to_string);
            }
            "Property" => {
                let (Some(wire), Some(edm_type)) = (child.attribute("Name"), child.attribute("Type")) else {
                    continue;
                };
                match lookup_logical_name(wire) {
                    Some(logical) => {
                        schema.inbound.insert(wire.to_string(), logical.to_string());
                        schema.field_types.insert(logical.to_string(), edm_type.to_string());
                    }
                    None => {
                        schema.inbound.insert(wire.to_string(), wire.to_string());
                        schema
                            .outbound
                            .insert(wire.to_string(), OutboundMapping::Field(wire.to_string()));
                        schema.field_types.insert(wire.to_string(), edm_type.to_string());
                    }
                }
            }
            "NavigationProperty" => parse_navigation(child, &mut schema),
            _ => {}
        }
    }

    Ok(schema)
}

/// Register a single-valued navigation property as an outbound lookup binding
fn parse_navigation(node: Node, schema: &mut EntitySchema) {
    let (Some(nav_name), Some(nav_type)) = (node.attribute("Name"), node.attribute("Type")) else {
        return;
    };
    // Collection-valued navigations are reached through associate/disassociate
    if nav_type.starts_with("Collection(") {
        return;
    }

    let Some(logical) = node
        .children()
        .find(|n| n.has_tag_name("ReferentialConstraint"))
        .and_then(|n| n.attribute("Property"))
        .and_then(lookup_logical_name)
    else {
        return;
    };

    let target = short_type_name(nav_type);
    match schema.outbound.get_mut(logical) {
        Some(OutboundMapping::Navigation(targets)) => targets.insert(target, nav_name),
        _ => {
            let mut targets = NavigationTargets::new();
            targets.insert(target, nav_name);
            schema
                .outbound
                .insert(logical.to_string(), OutboundMapping::Navigation(targets));
        }
    }
}

/// Resolve `name` against its (recursively resolved) base type
fn resolve(
    name: &str,
    own: &HashMap<String, EntitySchema>,
    resolved: &mut HashMap<String, EntitySchema>,
    visiting: &mut HashSet<String>,
) -> Result<()> {
    if resolved.contains_key(name) {
        return Ok(());
    }
    if !visiting.insert(name.to_string()) {
        return Err(Error::parse(format!(
            "Inheritance cycle involving entity type '{}'",
            name
        )));
    }

    let schema = own
        .get(name)
        .ok_or_else(|| Error::parse(format!("Unknown entity type '{}'", name)))?;

    let full = match &schema.base_type {
        Some(base) => {
            if !own.contains_key(base) {
                return Err(Error::parse(format!(
                    "Entity type '{}' derives from undeclared type '{}'",
                    name, base
                )));
            }
            resolve(base, own, resolved, visiting)?;
            EntitySchema::rebase(&resolved[base], schema)
        }
        None => schema.clone(),
    };

    visiting.remove(name);
    resolved.insert(name.to_string(), full);
    Ok(())
}

/// Register lookups that target an abstract type for each concrete descendant too
fn expand_abstract_targets(declared: &[String], resolved: &mut HashMap<String, EntitySchema>) {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in declared {
        if let Some(base) = resolved.get(name).and_then(|s| s.base_type.as_deref()) {
            children.entry(base).or_default().push(name.as_str());
        }
    }

    let abstract_types: Vec<&str> = declared
        .iter()
        .map(String::as_str)
        .filter(|name| resolved.get(*name).is_some_and(|s| s.is_abstract))
        .collect();

    let mut concrete_descendants: HashMap<String, Vec<String>> = HashMap::new();
    for abstract_type in abstract_types {
        let mut found = Vec::new();
        let mut stack = vec![abstract_type];
        while let Some(current) = stack.pop() {
            let Some(direct) = children.get(current) else {
                continue;
            };
            for child in direct {
                if resolved.get(*child).is_some_and(|s| !s.is_abstract) {
                    found.push(child.to_string());
                }
            }
            stack.extend(direct.iter().rev().copied());
        }
        concrete_descendants.insert(abstract_type.to_string(), found);
    }

    if concrete_descendants.values().all(Vec::is_empty) {
        return;
    }

    for schema in resolved.values_mut() {
        for mapping in schema.outbound.values_mut() {
            let OutboundMapping::Navigation(targets) = mapping else {
                continue;
            };
            let additions: Vec<(String, String)> = targets
                .iter()
                .filter_map(|(target, nav)| {
                    concrete_descendants
                        .get(target)
                        .map(|descendants| (descendants, nav.to_string()))
                })
                .flat_map(|(descendants, nav)| {
                    descendants.iter().map(move |d| (d.clone(), nav.clone()))
                })
                .collect();

            for (descendant, nav) in additions {
                if targets.contains_target(&descendant) {
                    continue;
                }
                targets.insert(descendant, nav);
            }
        }
    }
}

fn parse_entity_sets(doc: &Document) -> HashMap<String, String> {
    let mut collections = HashMap::new();
    for node in doc.descendants().filter(|n| n.has_tag_name("EntitySet")) {
        let (Some(set_name), Some(entity_type)) = (node.attribute("Name"), node.attribute("EntityType")) else {
            warn!("Skipping EntitySet without Name or EntityType");
            continue;
        };
        collections.insert(short_type_name(entity_type).to_string(), set_name.to_string());
    }
    collections
}
