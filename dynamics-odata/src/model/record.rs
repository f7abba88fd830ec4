//! Records and record references

use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};

use super::value::Value;
use crate::error::{Error, Result};

/// Ordered alternate-key values identifying a record without its id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyAttributes(Vec<(String, Json)>);

impl KeyAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key part, replacing an existing part with the same name in place
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Json>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// OData key predicate body in URL path form: `accountnumber='A-1',statecode=0`
    ///
    /// String values are percent-encoded; quotes, `=` and `,` stay literal.
    pub fn to_predicate(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", name, key_literal(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Render a JSON value as an OData key literal
fn key_literal(value: &Json) -> String {
    match value {
        Json::String(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{}'", urlencoding::encode(&escaped).replace("%27", "'"))
        }
        Json::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Weak reference to a record: identifies it, never owns it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRef {
    pub logical_name: String,
    pub id: Option<String>,
    pub key_attributes: Option<KeyAttributes>,
    /// Display name, usually the primary name formatted by the service
    pub name: Option<String>,
}

impl RecordRef {
    pub fn new(logical_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            id: Some(id.into()),
            key_attributes: None,
            name: None,
        }
    }

    pub fn by_keys(logical_name: impl Into<String>, keys: KeyAttributes) -> Self {
        Self {
            logical_name: logical_name.into(),
            id: None,
            key_attributes: Some(keys),
            name: None,
        }
    }

    /// Reference with neither id nor keys, used for records not yet created
    pub fn unidentified(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            id: None,
            key_attributes: None,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Text inside the parentheses of an entity path
    ///
    /// The id wins over alternate keys when both are present.
    pub fn key_segment(&self) -> Result<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        match &self.key_attributes {
            Some(keys) if !keys.is_empty() => Ok(keys.to_predicate()),
            _ => Err(Error::invalid_argument(format!(
                "Reference to '{}' has neither an id nor alternate keys",
                self.logical_name
            ))),
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key_segment() {
            Ok(key) => write!(f, "{}({})", self.logical_name, key),
            Err(_) => write!(f, "{}(new)", self.logical_name),
        }
    }
}

/// A typed CRM record with change tracking
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub logical_name: String,
    pub id: Option<String>,
    pub key_attributes: Option<KeyAttributes>,
    attributes: HashMap<String, Value>,
    changed: BTreeSet<String>,
    formatted_values: HashMap<String, String>,
}

impl Record {
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(logical_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(logical_name)
        }
    }

    pub fn with_keys(logical_name: impl Into<String>, keys: KeyAttributes) -> Self {
        Self {
            key_attributes: Some(keys),
            ..Self::new(logical_name)
        }
    }

    /// Set an attribute and mark it changed
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        self.changed.insert(name.clone());
        self.attributes.insert(name, value.into());
        self
    }

    /// Set an attribute without marking it changed (used when reading from the service)
    pub(crate) fn load(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub(crate) fn load_formatted(&mut self, name: impl Into<String>, formatted: impl Into<String>) {
        self.formatted_values.insert(name.into(), formatted.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Display string the service formatted for an attribute
    pub fn formatted_value(&self, name: &str) -> Option<&str> {
        self.formatted_values.get(name).map(String::as_str)
    }

    pub fn formatted_values(&self) -> &HashMap<String, String> {
        &self.formatted_values
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// Names of changed attributes, sorted
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Clear every change flag at once; called after a successful write
    pub fn reset_changed(&mut self) {
        self.changed.clear();
    }

    pub fn to_reference(&self) -> RecordRef {
        RecordRef {
            logical_name: self.logical_name.clone(),
            id: self.id.clone(),
            key_attributes: self.key_attributes.clone(),
            name: None,
        }
    }
}
