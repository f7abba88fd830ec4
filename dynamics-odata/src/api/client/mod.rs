//! Dynamics 365 Web API client
//!
//! [`DynamicsClient`] sends authenticated OData requests, classifies
//! failures into [`Error`], follows continuation links and keeps the
//! instance's CSDL schema cached.

mod records;
mod schema;

pub use records::RecordSet;

use log::{debug, trace, warn};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::sync::Arc;

use crate::api::auth::TokenProvider;
use crate::api::constants::CRM_NAMESPACE;
use crate::api::constants::headers::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, INCLUDE_ANNOTATIONS, JSON, LOCATION, ODATA_ENTITY_ID,
    ODATA_MAX_VERSION, ODATA_V4, ODATA_VERSION, PREFER,
};
use crate::api::operations::{Operation, OperationResult, WriteMode};
use crate::api::query::{ListResult, QueryOptions, build_query};
use crate::api::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
use crate::cache::{CacheStore, NoopCache};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::schema::SchemaDocument;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Client for one Dynamics 365 instance
pub struct DynamicsClient {
    settings: ClientSettings,
    service_root: String,
    transport: Arc<dyn HttpTransport>,
    auth: Arc<TokenProvider>,
    cache: Arc<dyn CacheStore>,
    schemas: Cache<String, Arc<SchemaDocument>>,
}

impl std::fmt::Debug for DynamicsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicsClient")
            .field("service_root", &self.service_root)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl DynamicsClient {
    /// Client using reqwest and no external cache
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let transport = ReqwestTransport::new(settings.timeout())
            .map_err(|e| Error::transport(e.message))?;
        Self::with_transport(settings, Arc::new(transport), Arc::new(NoopCache))
    }

    /// Client over a custom transport and cache store
    pub fn with_transport(
        settings: ClientSettings,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let auth = TokenProvider::from_settings(&settings, transport.clone(), cache.clone())?;
        Ok(Self::from_parts(settings, transport, cache, Arc::new(auth)))
    }

    /// Client sharing an existing token provider
    pub fn from_parts(
        settings: ClientSettings,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn CacheStore>,
        auth: Arc<TokenProvider>,
    ) -> Self {
        let schemas = Cache::builder()
            .max_capacity(16)
            .time_to_live(settings.schema_ttl())
            .build();
        Self {
            service_root: settings.service_root(),
            settings,
            transport,
            auth,
            cache,
            schemas,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Web API root ending in `/`
    pub fn service_root(&self) -> &str {
        &self.service_root
    }

    pub fn token_provider(&self) -> &Arc<TokenProvider> {
        &self.auth
    }

    pub(crate) fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Absolute URL for a path relative to the service root
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.service_root, path.trim_start_matches('/'))
        }
    }

    /// Send an authenticated request and classify the response
    ///
    /// Default OData headers are added unless `headers` already carries them.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: Vec<(String, String)>,
        body: Option<&Json>,
    ) -> Result<HttpResponse> {
        let token = self.auth.acquire_token().await?;

        let mut request = HttpRequest::new(method, self.url(path))
            .header(AUTHORIZATION, token.authorization())
            .header(ODATA_VERSION, ODATA_V4)
            .header(ODATA_MAX_VERSION, ODATA_V4);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if request.header_value(ACCEPT).is_none() {
            request = request.header(ACCEPT, JSON);
        }
        if request.header_value(PREFER).is_none() {
            request = request.header(PREFER, INCLUDE_ANNOTATIONS);
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=utf-8")
                .body(body.to_string());
        }

        debug!("{} {}", request.method, request.url);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| Error::transport(e.message))?;
        trace!("<- {} ({} bytes)", response.status, response.body.len());

        if response.is_success() {
            Ok(response)
        } else {
            Err(self.classify(response).await)
        }
    }

    /// Turn a failed response into an error, discarding the token on 401
    async fn classify(&self, response: HttpResponse) -> Error {
        let parsed = serde_json::from_str::<ErrorEnvelope>(&response.body).ok();
        let (code, message) = match parsed {
            Some(ErrorEnvelope { error }) => (
                error.code,
                error.message.unwrap_or_else(|| response.body.clone()),
            ),
            None if response.body.trim().is_empty() => {
                (None, format!("HTTP {} with empty body", response.status))
            }
            None => (None, response.body.clone()),
        };

        if response.status == 401 {
            warn!("Request rejected with 401, discarding token: {}", message);
            self.auth.discard_token().await;
            return Error::authentication(message);
        }

        Error::ProtocolFailure {
            status: response.status,
            code,
            message,
        }
    }

    pub(crate) async fn get_json(&self, path: &str, headers: Vec<(String, String)>) -> Result<Json> {
        let response = self.send(Method::GET, path, headers, None).await?;
        parse_body(&response)
    }

    /// Execute a write operation
    pub async fn execute(&self, operation: &Operation) -> Result<OperationResult> {
        let body = operation.body(&self.service_root);
        let headers = operation
            .headers()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        debug!(
            "Executing {} on {}",
            operation.operation_type(),
            operation.collection()
        );
        let response = self
            .send(
                operation.http_method(),
                &operation.path(),
                headers,
                body.as_ref(),
            )
            .await?;

        let data = if response.body.trim().is_empty() {
            None
        } else {
            Some(parse_body(&response)?)
        };

        Ok(OperationResult {
            status: response.status,
            entity_id: entity_id_of(&response),
            data,
        })
    }

    /// Fetch one record by id or alternate key; `None` when it does not exist
    pub async fn get_record(
        &self,
        collection: &str,
        key: &str,
        options: &QueryOptions,
    ) -> Result<Option<Map<String, Json>>> {
        let (query, headers) = build_query(options)?;
        let path = with_query(&format!("{}({})", collection, key), &query);

        match self.get_json(&path, headers).await {
            Ok(Json::Object(map)) => Ok(Some(map)),
            Ok(other) => Err(Error::parse(format!(
                "Expected a record object, got {}",
                other
            ))),
            Err(err) if err.is_not_found() => {
                debug!("{}({}) not found", collection, key);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Create a record and return its id
    pub async fn create(&self, collection: &str, data: Map<String, Json>) -> Result<String> {
        let result = self.execute(&Operation::create(collection, data)).await?;
        result.entity_id.ok_or_else(|| {
            Error::parse(format!(
                "Create on '{}' returned no OData-EntityId header",
                collection
            ))
        })
    }

    /// Update or upsert a record; returns the id reported by the service
    pub async fn update(
        &self,
        collection: &str,
        key: &str,
        data: Map<String, Json>,
        mode: WriteMode,
    ) -> Result<Option<String>> {
        let result = self
            .execute(&Operation::update(collection, key, data, mode))
            .await?;
        Ok(result.entity_id)
    }

    pub async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.execute(&Operation::delete(collection, key)).await?;
        Ok(())
    }

    /// Link `target` (a path such as `contacts(guid)`) through `navigation`
    pub async fn associate(
        &self,
        collection: &str,
        key: &str,
        navigation: &str,
        target: &str,
    ) -> Result<()> {
        self.execute(&Operation::associate(collection, key, navigation, target))
            .await?;
        Ok(())
    }

    /// Remove a link; `target_key` is required for collection-valued properties
    pub async fn disassociate(
        &self,
        collection: &str,
        key: &str,
        navigation: &str,
        target_key: Option<&str>,
    ) -> Result<()> {
        self.execute(&Operation::disassociate(
            collection,
            key,
            navigation,
            target_key.map(str::to_string),
        ))
        .await?;
        Ok(())
    }

    /// Query a collection
    ///
    /// Without a page size every continuation link is followed and the pages
    /// are merged. With a page size only the first page is fetched and its
    /// cursor is kept.
    pub async fn list(&self, collection: &str, options: &QueryOptions) -> Result<ListResult> {
        let (query, headers) = build_query(options)?;
        let path = with_query(collection, &query);

        let mut result = ListResult::from_page(self.get_json(&path, headers.clone()).await?)?;
        if options.is_paged() {
            return Ok(result);
        }

        let mut pages = 1usize;
        while let Some(next) = result.next_link.clone() {
            if let Some(max) = self.settings.max_auto_pages {
                if pages >= max {
                    warn!(
                        "Stopped following '{}' after {} pages, cursor kept",
                        collection, pages
                    );
                    return Ok(result);
                }
            }
            let page = ListResult::from_page(self.get_json(&next, headers.clone()).await?)?;
            result.absorb(page);
            pages += 1;
        }

        if pages > 1 {
            debug!("Merged {} pages of '{}'", pages, collection);
        }
        if options.fetch_xml.is_none() {
            result.drop_cursor();
        }
        Ok(result)
    }

    /// Number of records in a collection (`/$count`, capped by the service at 5000)
    pub async fn count(&self, collection: &str) -> Result<u64> {
        let response = self
            .send(
                Method::GET,
                &format!("{}/$count", collection),
                vec![(ACCEPT.to_string(), "text/plain".to_string())],
                None,
            )
            .await?;
        let text = response.body.trim().trim_start_matches('\u{feff}');
        text.parse()
            .map_err(|_| Error::parse(format!("Invalid $count response '{}'", text)))
    }

    /// Call an unbound function such as `WhoAmI`
    pub async fn execute_function(
        &self,
        function: &str,
        parameters: &Map<String, Json>,
    ) -> Result<Json> {
        self.get_json(&function_path(function, parameters), Vec::new())
            .await
    }

    /// Call a function bound to one record
    pub async fn execute_bound_function(
        &self,
        collection: &str,
        key: &str,
        function: &str,
        parameters: &Map<String, Json>,
    ) -> Result<Json> {
        let name = format!("{}.{}", CRM_NAMESPACE, function);
        let path = format!(
            "{}({})/{}",
            collection,
            key,
            function_path(&name, parameters)
        );
        self.get_json(&path, Vec::new()).await
    }

    /// Call an unbound action; `None` when the action returns nothing
    pub async fn execute_action(
        &self,
        action: &str,
        parameters: Map<String, Json>,
    ) -> Result<Option<Json>> {
        self.post_action(action, parameters).await
    }

    /// Call an action bound to one record
    pub async fn execute_bound_action(
        &self,
        collection: &str,
        key: &str,
        action: &str,
        parameters: Map<String, Json>,
    ) -> Result<Option<Json>> {
        let path = format!("{}({})/{}.{}", collection, key, CRM_NAMESPACE, action);
        self.post_action(&path, parameters).await
    }

    async fn post_action(&self, path: &str, parameters: Map<String, Json>) -> Result<Option<Json>> {
        let body = Json::Object(parameters);
        let response = self
            .send(Method::POST, path, Vec::new(), Some(&body))
            .await?;
        if response.body.trim().is_empty() {
            Ok(None)
        } else {
            parse_body(&response).map(Some)
        }
    }
}

fn parse_body(response: &HttpResponse) -> Result<Json> {
    serde_json::from_str(&response.body)
        .map_err(|e| Error::parse(format!("Invalid JSON response: {}", e)))
}

fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

/// Id inside the `OData-EntityId` (or `Location`) URL: `.../accounts(<id>)`
fn entity_id_of(response: &HttpResponse) -> Option<String> {
    let url = response
        .header(ODATA_ENTITY_ID)
        .or_else(|| response.header(LOCATION))?;
    let start = url.rfind('(')? + 1;
    let end = start + url[start..].find(')')?;
    Some(url[start..end].to_string())
}

/// `Name(a=@p1,b=@p2)?@p1=...&@p2=...` with parameters passed as aliases
fn function_path(function: &str, parameters: &Map<String, Json>) -> String {
    if parameters.is_empty() {
        return format!("{}()", function);
    }

    let mut names = Vec::new();
    let mut aliases = Vec::new();
    for (index, (name, value)) in parameters.iter().enumerate() {
        let alias = format!("@p{}", index + 1);
        names.push(format!("{}={}", name, alias));
        let literal = match value {
            Json::String(s) => format!("'{}'", s.replace('\'', "''")),
            other => other.to_string(),
        };
        aliases.push(format!("{}={}", alias, urlencoding::encode(&literal)));
    }

    format!("{}({})?{}", function, names.join(","), aliases.join("&"))
}
