//! Token acquisition and caching

use arc_swap::ArcSwapOption;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::assertion::{CLIENT_ASSERTION_TYPE, CertificateCredential};
use super::tenant::{parse_tenant_id, challenge_url};
use super::token::{Token, TokenResponse};
use crate::api::constants::headers;
use crate::api::transport::{HttpRequest, HttpTransport, Method};
use crate::cache::CacheStore;
use crate::config::{ClientSettings, Credentials};
use crate::error::{Error, Result};

/// Discovered tenant ids are stable per instance
const TENANT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Secret material presented to the token endpoint
#[derive(Debug, Clone)]
pub enum ClientCredential {
    Secret(String),
    Certificate(CertificateCredential),
}

impl ClientCredential {
    pub fn from_settings(credentials: &Credentials) -> Result<Self> {
        match credentials {
            Credentials::Secret { client_secret } => Ok(Self::Secret(client_secret.clone())),
            Credentials::Certificate {
                certificate_path,
                private_key_path,
            } => CertificateCredential::load(certificate_path, private_key_path.as_deref())
                .map(Self::Certificate),
        }
    }

    /// Identity part of the cache key, hashed before use
    fn identity(&self) -> String {
        match self {
            Self::Secret(secret) => secret.clone(),
            Self::Certificate(cert) => cert.thumbprint_hex(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Acquires client credential tokens for one instance
///
/// A live token is kept in memory and mirrored into the external
/// [`CacheStore`] so other clients sharing the store can reuse it. Only one
/// acquisition runs at a time per provider.
pub struct TokenProvider {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn CacheStore>,
    instance: String,
    authority: String,
    client_id: String,
    credential: ClientCredential,
    static_tenant: Option<String>,
    tenant: ArcSwapOption<String>,
    current: ArcSwapOption<Token>,
    acquiring: Mutex<()>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("instance", &self.instance)
            .field("client_id", &self.client_id)
            .field("tenant", &self.tenant.load_full())
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    pub fn new(
        settings: &ClientSettings,
        credential: ClientCredential,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            transport,
            cache,
            instance: settings.instance().to_string(),
            authority: settings.authority.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            credential,
            static_tenant: settings.tenant_id.clone().filter(|t| !t.is_empty()),
            tenant: ArcSwapOption::empty(),
            current: ArcSwapOption::empty(),
            acquiring: Mutex::new(()),
        }
    }

    /// Provider whose credential is loaded from `settings.credentials`
    pub fn from_settings(
        settings: &ClientSettings,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let credential = ClientCredential::from_settings(&settings.credentials)?;
        Ok(Self::new(settings, credential, transport, cache))
    }

    /// A valid token, from memory, the cache store, or Azure AD
    pub async fn acquire_token(&self) -> Result<Token> {
        if let Some(token) = self.live_token() {
            return Ok(token);
        }

        let _guard = self.acquiring.lock().await;
        if let Some(token) = self.live_token() {
            return Ok(token);
        }

        let key = self.cache_key();
        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_value::<Token>(cached) {
                Ok(token) if token.is_valid() => {
                    debug!("Using cached token for {}", self.instance);
                    self.current.store(Some(Arc::new(token.clone())));
                    return Ok(token);
                }
                Ok(_) => debug!("Cached token for {} is outside its validity window", self.instance),
                Err(e) => warn!("Ignoring unreadable cached token: {}", e),
            }
        }

        let tenant = self.tenant_id().await?;
        let token = self.request_token(&tenant).await?;

        if let Some(ttl) = token.remaining(Utc::now()) {
            let value = serde_json::to_value(&token)
                .map_err(|e| Error::authentication(format!("Failed to cache token: {}", e)))?;
            self.cache.set(&key, value, Some(ttl)).await;
        }
        self.current.store(Some(Arc::new(token.clone())));

        info!(
            "Acquired token for {} valid until {}",
            self.instance, token.expires_on
        );
        Ok(token)
    }

    /// Forget the current token so the next call re-authenticates
    pub async fn discard_token(&self) {
        self.current.store(None);
        self.cache.delete(&self.cache_key()).await;
        debug!("Discarded token for {}", self.instance);
    }

    /// Tenant id: configured, cached, or discovered from the instance
    pub async fn tenant_id(&self) -> Result<String> {
        if let Some(tenant) = &self.static_tenant {
            return Ok(tenant.clone());
        }
        if let Some(tenant) = self.tenant.load_full() {
            return Ok(tenant.as_ref().clone());
        }

        let key = format!("tenant:{}", self.instance);
        let tenant = match self.cache.get(&key).await {
            Some(serde_json::Value::String(tenant)) => tenant,
            _ => {
                let tenant = self.discover_tenant().await?;
                self.cache
                    .set(&key, serde_json::Value::String(tenant.clone()), Some(TENANT_TTL))
                    .await;
                tenant
            }
        };

        self.tenant.store(Some(Arc::new(tenant.clone())));
        Ok(tenant)
    }

    pub fn token_endpoint(&self, tenant: &str) -> String {
        format!("{}/{}/oauth2/token", self.authority, tenant)
    }

    fn live_token(&self) -> Option<Token> {
        self.current
            .load_full()
            .filter(|token| token.is_valid())
            .map(|token| token.as_ref().clone())
    }

    fn cache_key(&self) -> String {
        let material = format!(
            "{}|{}|{}",
            self.instance,
            self.client_id,
            self.credential.identity()
        );
        format!("token:{}", hex::encode(Sha1::digest(material.as_bytes())))
    }

    async fn discover_tenant(&self) -> Result<String> {
        let url = challenge_url(&self.instance);
        debug!("Discovering tenant via {}", url);

        let response = self
            .transport
            .send(HttpRequest::new(Method::GET, &url))
            .await
            .map_err(|e| Error::authentication(format!("Tenant discovery failed: {}", e)))?;

        let challenge = response.header(headers::WWW_AUTHENTICATE).ok_or_else(|| {
            Error::authentication(format!(
                "{} answered {} without a WWW-Authenticate challenge",
                url, response.status
            ))
        })?;

        parse_tenant_id(challenge).ok_or_else(|| {
            Error::authentication(format!(
                "Could not read a tenant id from challenge '{}'",
                challenge
            ))
        })
    }

    async fn request_token(&self, tenant: &str) -> Result<Token> {
        let endpoint = self.token_endpoint(tenant);

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("resource", self.instance.clone()),
        ];
        match &self.credential {
            ClientCredential::Secret(secret) => form.push(("client_secret", secret.clone())),
            ClientCredential::Certificate(cert) => {
                let assertion = cert.assertion(&self.client_id, &endpoint, Utc::now())?;
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                form.push(("client_assertion", assertion));
            }
        }
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let request = HttpRequest::new(Method::POST, &endpoint)
            .header(headers::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(headers::ACCEPT, headers::JSON)
            .body(body);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| Error::authentication(format!("Token request failed: {}", e)))?;

        if !response.is_success() {
            let detail = serde_json::from_str::<TokenErrorBody>(&response.body)
                .ok()
                .and_then(|b| b.error_description.or(b.error))
                .unwrap_or_else(|| response.body.clone());
            return Err(Error::authentication(format!(
                "Token endpoint returned {}: {}",
                response.status, detail
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::authentication(format!("Invalid token response: {}", e)))?;
        parsed.into_token(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::HttpResponse;
    use crate::cache::{MemoryCache, NoopCache};
    use crate::testing::MockTransport;
    use serde_json::json;

    const TENANT: &str = "3f0b4a5e-1c2d-4e5f-8a9b-0c1d2e3f4a5b";

    fn settings() -> ClientSettings {
        ClientSettings::with_secret("https://contoso.crm.dynamics.com", "client-1", "s3cret")
    }

    fn challenge() -> HttpResponse {
        HttpResponse::new(401, "").with_header(
            "WWW-Authenticate",
            format!(
                "Bearer authorization_uri=https://login.microsoftonline.com/{}/oauth2/authorize, resource_id=https://contoso.crm.dynamics.com/",
                TENANT
            ),
        )
    }

    fn token_response(expires_in: i64) -> HttpResponse {
        let now = Utc::now().timestamp();
        HttpResponse::new(
            200,
            json!({
                "token_type": "Bearer",
                "access_token": format!("token-{}", expires_in),
                "expires_on": (now + expires_in).to_string(),
                "not_before": (now - 60).to_string(),
            })
            .to_string(),
        )
    }

    fn provider(
        settings: &ClientSettings,
        transport: &Arc<MockTransport>,
        cache: Arc<dyn CacheStore>,
    ) -> TokenProvider {
        TokenProvider::from_settings(settings, transport.clone(), cache).unwrap()
    }

    #[tokio::test]
    async fn test_discovers_tenant_and_requests_token() {
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(token_response(3600));

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        let token = provider.acquire_token().await.unwrap();
        assert_eq!(token.access_token, "token-3600");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, "https://contoso.crm.dynamics.com/api/data");
        assert!(requests[0].header_value("Authorization").is_none());

        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(
            requests[1].url,
            format!("https://login.microsoftonline.com/{}/oauth2/token", TENANT)
        );
        let body = requests[1].body.clone().unwrap();
        assert!(body.contains("grant_type=client_credentials"));
        assert!(body.contains("client_secret=s3cret"));
        assert!(body.contains("resource=https%3A%2F%2Fcontoso.crm.dynamics.com"));
    }

    #[tokio::test]
    async fn test_token_reused_within_validity() {
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(token_response(3600));

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        let first = provider.acquire_token().await.unwrap();
        let second = provider.acquire_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_token_is_reacquired() {
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(token_response(0));
        transport.push(token_response(3600));

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        let first = provider.acquire_token().await.unwrap();
        assert_eq!(first.access_token, "token-0");

        let second = provider.acquire_token().await.unwrap();
        assert_eq!(second.access_token, "token-3600");

        // tenant is remembered, so only one discovery request
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].method, Method::POST);
    }

    #[tokio::test]
    async fn test_static_tenant_skips_discovery() {
        let mut settings = settings();
        settings.tenant_id = Some(TENANT.to_string());

        let transport = Arc::new(MockTransport::new());
        transport.push(token_response(3600));

        let provider = provider(&settings, &transport, Arc::new(NoopCache));
        provider.acquire_token().await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with("/oauth2/token"));
    }

    #[tokio::test]
    async fn test_shared_cache_serves_second_provider() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(token_response(3600));

        let first = provider(&settings(), &transport, cache.clone());
        let token = first.acquire_token().await.unwrap();

        let other_transport = Arc::new(MockTransport::new());
        let second = provider(&settings(), &other_transport, cache.clone());
        assert_eq!(second.acquire_token().await.unwrap(), token);
        assert!(other_transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_discard_clears_memory_and_cache() {
        let cache = Arc::new(MemoryCache::new());
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(token_response(3600));
        transport.push(token_response(7200));

        let provider = provider(&settings(), &transport, cache.clone());
        provider.acquire_token().await.unwrap();
        assert!(cache.get(&provider.cache_key()).await.is_some());

        provider.discard_token().await;
        provider.discard_token().await;
        assert!(cache.get(&provider.cache_key()).await.is_none());

        let token = provider.acquire_token().await.unwrap();
        assert_eq!(token.access_token, "token-7200");
    }

    #[tokio::test]
    async fn test_discovery_without_challenge_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        transport.push(HttpResponse::new(200, "{}"));

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        assert!(matches!(
            provider.acquire_token().await,
            Err(Error::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let transport = Arc::new(MockTransport::new());
        transport.push(challenge());
        transport.push(HttpResponse::new(
            401,
            r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided."}"#,
        ));

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        match provider.acquire_token().await {
            Err(Error::AuthenticationFailed { message }) => {
                assert!(message.contains("AADSTS7000215"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_authentication_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error("connection refused");

        let provider = provider(&settings(), &transport, Arc::new(NoopCache));
        assert!(matches!(
            provider.acquire_token().await,
            Err(Error::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_certificate_credential_sends_assertion() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let mut settings = settings();
        settings.tenant_id = Some(TENANT.to_string());
        settings.credentials = Credentials::Certificate {
            certificate_path: root.join("test_bundle.pem"),
            private_key_path: None,
        };

        let transport = Arc::new(MockTransport::new());
        transport.push(token_response(3600));

        let provider = provider(&settings, &transport, Arc::new(NoopCache));
        provider.acquire_token().await.unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        assert!(body.contains("client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer"));
        assert!(body.contains("client_assertion=ey"));
        assert!(!body.contains("client_secret"));
    }
}
