//! Rich entity metadata from `EntityDefinitions`

use log::{debug, info, warn};
use moka::future::Cache;
use serde_json::{Map, Value as Json};
use std::sync::Arc;

use super::models::EntityMetadata;
use crate::api::client::DynamicsClient;
use crate::error::{Error, Result};

const DEFINITION_EXPAND: &str =
    "Attributes,Keys,ManyToOneRelationships,OneToManyRelationships,ManyToManyRelationships";

/// Attribute subtypes whose option sets only come back from a cast request
const OPTION_SET_SUBTYPES: &[(&str, &str)] = &[
    ("Boolean", "OptionSet"),
    ("Picklist", "OptionSet,GlobalOptionSet"),
    ("MultiSelectPicklist", "OptionSet,GlobalOptionSet"),
    ("State", "OptionSet"),
    ("Status", "OptionSet"),
    ("EntityName", "OptionSet"),
];

/// Why a definition load produced nothing to cache
#[derive(Debug)]
enum LoadFailure {
    Missing,
    Failed(Error),
}

impl From<Error> for LoadFailure {
    fn from(e: Error) -> Self {
        LoadFailure::Failed(e)
    }
}

/// Per-instance cache of decoded entity definitions
#[derive(Debug)]
pub struct MetadataRegistry {
    client: Arc<DynamicsClient>,
    definitions: Cache<String, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    pub fn new(client: Arc<DynamicsClient>) -> Self {
        let definitions = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(client.settings().metadata_ttl())
            .build();
        Self {
            client,
            definitions,
        }
    }

    fn key(&self, logical_name: &str) -> String {
        format!("metadata:{}:{}", self.client.service_root(), logical_name)
    }

    /// Definition of an entity with attributes, keys and relationships
    ///
    /// `None` when the instance has no entity by that name. Concurrent
    /// callers for the same entity share one fetch.
    pub async fn get_definition(&self, logical_name: &str) -> Result<Option<Arc<EntityMetadata>>> {
        let key = self.key(logical_name);
        match self
            .definitions
            .try_get_with(key.clone(), self.load(&key, logical_name))
            .await
        {
            Ok(definition) => Ok(Some(definition)),
            Err(failure) => match failure.as_ref() {
                LoadFailure::Missing => Ok(None),
                LoadFailure::Failed(e) => Err(e.clone()),
            },
        }
    }

    async fn load(
        &self,
        key: &str,
        logical_name: &str,
    ) -> std::result::Result<Arc<EntityMetadata>, LoadFailure> {
        if let Some(cached) = self.client.cache().get(key).await {
            match serde_json::from_value::<EntityMetadata>(cached) {
                Ok(definition) => {
                    debug!("Metadata for {} loaded from cache store", logical_name);
                    return Ok(Arc::new(definition));
                }
                Err(e) => warn!("Ignoring unreadable cached metadata for {}: {}", logical_name, e),
            }
        }

        let raw = self.fetch(logical_name).await?.ok_or(LoadFailure::Missing)?;
        let definition: EntityMetadata = serde_json::from_value(raw)
            .map_err(|e| Error::parse(format!("entity metadata for {}: {}", logical_name, e)))?;
        info!(
            "Loaded metadata for {}: {} attributes",
            logical_name,
            definition.attributes.len()
        );

        let ttl = self.client.settings().metadata_ttl();
        match serde_json::to_value(&definition) {
            Ok(value) => self.client.cache().set(key, value, Some(ttl)).await,
            Err(e) => warn!("Metadata for {} not written to cache store: {}", logical_name, e),
        }
        Ok(Arc::new(definition))
    }

    /// Raw definition with subtype attributes merged in
    async fn fetch(&self, logical_name: &str) -> Result<Option<Json>> {
        let base = format!(
            "EntityDefinitions(LogicalName='{}')",
            logical_name.replace('\'', "''")
        );

        let mut definition = match self
            .client
            .get_json(&format!("{}?$expand={}", base, DEFINITION_EXPAND), Vec::new())
            .await
        {
            Ok(definition) => definition,
            Err(e) if e.is_not_found() => {
                debug!("No entity definition for {}", logical_name);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        for (subtype, expand) in OPTION_SET_SUBTYPES {
            let path = format!(
                "{}/Attributes/Microsoft.Dynamics.CRM.{}AttributeMetadata?$expand={}",
                base, subtype, expand
            );
            match self.client.get_json(&path, Vec::new()).await {
                Ok(page) => {
                    let detailed = page
                        .get("value")
                        .and_then(Json::as_array)
                        .cloned()
                        .unwrap_or_default();
                    merge_attributes(&mut definition, detailed);
                }
                Err(e) => warn!(
                    "{} attributes of {} not expanded: {}",
                    subtype, logical_name, e
                ),
            }
        }

        Ok(Some(definition))
    }

    /// Forget one entity, in memory and in the cache store
    pub async fn invalidate(&self, logical_name: &str) {
        let key = self.key(logical_name);
        self.definitions.invalidate(&key).await;
        self.client.cache().delete(&key).await;
    }

    /// Forget every entity held by this registry
    pub async fn clear(&self) {
        let keys: Vec<Arc<String>> = self.definitions.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.client.cache().delete(&key).await;
        }
        self.definitions.invalidate_all();
    }
}

/// Replace attributes that share a `MetadataId` with their detailed form
fn merge_attributes(definition: &mut Json, detailed: Vec<Json>) {
    let Some(attributes) = definition
        .get_mut("Attributes")
        .and_then(Json::as_array_mut)
    else {
        return;
    };

    let mut by_id: Map<String, Json> = detailed
        .into_iter()
        .filter_map(|attribute| {
            let id = attribute.get("MetadataId")?.as_str()?.to_string();
            Some((id, attribute))
        })
        .collect();

    for attribute in attributes.iter_mut() {
        let id = attribute
            .get("MetadataId")
            .and_then(Json::as_str)
            .map(str::to_string);
        if let Some(replacement) = id.and_then(|id| by_id.remove(&id)) {
            *attribute = replacement;
        }
    }
}
