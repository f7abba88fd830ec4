//! CSDL schema retrieval and caching

use log::{debug, info, warn};
use std::sync::Arc;

use super::DynamicsClient;
use crate::api::constants::headers::ACCEPT;
use crate::api::transport::Method;
use crate::error::Result;
use crate::mapper::EntityMapper;
use crate::schema::{EntitySchema, SchemaDocument, parse_csdl};

impl DynamicsClient {
    fn schema_key(&self) -> String {
        format!("schema:{}", self.service_root)
    }

    /// The instance's schema, parsed from `$metadata`
    ///
    /// Looked up in memory, then in the cache store, then fetched. Concurrent
    /// callers on a cold cache share one fetch.
    pub async fn get_schema(&self) -> Result<Arc<SchemaDocument>> {
        let key = self.schema_key();
        self.schemas
            .try_get_with(key.clone(), self.load_schema(&key))
            .await
            .map_err(|e| e.as_ref().clone())
    }

    async fn load_schema(&self, key: &str) -> Result<Arc<SchemaDocument>> {
        if let Some(cached) = self.cache().get(key).await {
            match serde_json::from_value::<SchemaDocument>(cached) {
                Ok(schema) => {
                    debug!("Schema for {} loaded from cache store", self.service_root);
                    return Ok(Arc::new(schema));
                }
                Err(e) => warn!("Ignoring unreadable cached schema: {}", e),
            }
        }

        let response = self
            .send(
                Method::GET,
                "$metadata",
                vec![(ACCEPT.to_string(), "application/xml".to_string())],
                None,
            )
            .await?;
        let schema = Arc::new(parse_csdl(&response.body)?);
        info!(
            "Parsed schema for {}: {} entity types",
            self.service_root,
            schema.entities.len()
        );

        match serde_json::to_value(schema.as_ref()) {
            Ok(value) => {
                self.cache()
                    .set(key, value, Some(self.settings.schema_ttl()))
                    .await
            }
            Err(e) => warn!("Schema not written to cache store: {}", e),
        }
        Ok(schema)
    }

    /// Drop the cached schema so the next access refetches `$metadata`
    pub async fn invalidate_schema(&self) {
        let key = self.schema_key();
        self.schemas.invalidate(&key).await;
        self.cache().delete(&key).await;
    }

    pub async fn entity_schema(&self, entity: &str) -> Result<EntitySchema> {
        let schema = self.get_schema().await?;
        schema.entity_schema(entity).cloned()
    }

    /// Entity set name for an entity type, e.g. `account` → `accounts`
    pub async fn collection_name(&self, entity: &str) -> Result<String> {
        let schema = self.get_schema().await?;
        schema.collection_name(entity).map(str::to_string)
    }

    /// Mapper over the current schema
    pub async fn mapper(&self) -> Result<EntityMapper> {
        Ok(EntityMapper::new(self.get_schema().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{ROOT, client, token_response};
    use super::*;
    use crate::api::transport::HttpResponse;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::config::ClientSettings;
    use crate::error::Error;
    use crate::testing::MockTransport;

    pub(crate) const CSDL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="Microsoft.Dynamics.CRM" Alias="mscrm" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="account">
        <Key><PropertyRef Name="accountid" /></Key>
        <Property Name="accountid" Type="Edm.Guid" />
        <Property Name="name" Type="Edm.String" />
        <Property Name="_primarycontactid_value" Type="Edm.Guid" />
        <NavigationProperty Name="primarycontactid" Type="mscrm.contact">
          <ReferentialConstraint Property="_primarycontactid_value" ReferencedProperty="contactid" />
        </NavigationProperty>
      </EntityType>
      <EntityType Name="contact">
        <Key><PropertyRef Name="contactid" /></Key>
        <Property Name="contactid" Type="Edm.Guid" />
        <Property Name="fullname" Type="Edm.String" />
      </EntityType>
      <EntityContainer Name="System">
        <EntitySet Name="accounts" EntityType="Microsoft.Dynamics.CRM.account" />
        <EntitySet Name="contacts" EntityType="Microsoft.Dynamics.CRM.contact" />
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[tokio::test]
    async fn test_schema_fetched_once() {
        let (client, transport) = client();
        transport.push(HttpResponse::new(200, CSDL));

        let schema = client.get_schema().await.unwrap();
        assert!(schema.supports("account"));
        assert_eq!(client.collection_name("contact").await.unwrap(), "contacts");
        assert_eq!(
            client.entity_schema("account").await.unwrap().key.as_deref(),
            Some("accountid")
        );
        assert!(matches!(
            client.entity_schema("lead").await,
            Err(Error::EntityNotSupported { .. })
        ));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].url, format!("{}$metadata", ROOT));
        assert_eq!(requests[1].header_value("Accept"), Some("application/xml"));
    }

    #[tokio::test]
    async fn test_schema_invalidation_refetches() {
        let (client, transport) = client();
        transport.push(HttpResponse::new(200, CSDL));
        transport.push(HttpResponse::new(200, CSDL));

        client.get_schema().await.unwrap();
        client.invalidate_schema().await;
        client.mapper().await.unwrap();
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_schema_shared_through_cache_store() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let mut settings =
            ClientSettings::with_secret("https://contoso.crm.dynamics.com", "client-1", "s3cret");
        settings.tenant_id = Some("3f0b4a5e-1c2d-4e5f-8a9b-0c1d2e3f4a5b".into());

        let first_transport = Arc::new(MockTransport::new());
        first_transport.push(token_response());
        first_transport.push(HttpResponse::new(200, CSDL));
        let first = DynamicsClient::with_transport(
            settings.clone(),
            first_transport.clone(),
            cache.clone(),
        )
        .unwrap();
        first.get_schema().await.unwrap();

        // token and schema both come from the shared store
        let second_transport = Arc::new(MockTransport::new());
        let second =
            DynamicsClient::with_transport(settings, second_transport.clone(), cache).unwrap();
        let schema = second.get_schema().await.unwrap();
        assert!(schema.supports("contact"));
        assert!(second_transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let (client, transport) = client();
        transport.push(HttpResponse::new(200, CSDL));

        let (first, second) = tokio::join!(client.get_schema(), client.get_schema());
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));

        let metadata_calls = transport
            .requests()
            .iter()
            .filter(|r| r.url.ends_with("$metadata"))
            .count();
        assert_eq!(metadata_calls, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (client, transport) = client();
        transport.push(HttpResponse::new(200, "<Edmx><nope"));
        transport.push(HttpResponse::new(200, CSDL));

        assert!(client.get_schema().await.is_err());
        assert!(client.get_schema().await.unwrap().supports("account"));
    }

    #[tokio::test]
    async fn test_malformed_metadata() {
        let (client, transport) = client();
        transport.push(HttpResponse::new(200, "<Edmx><nope"));
        assert!(matches!(
            client.get_schema().await,
            Err(Error::ParseError { .. })
        ));
    }
}
