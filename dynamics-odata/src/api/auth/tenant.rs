//! Tenant discovery from the Web API's authentication challenge

use once_cell::sync::Lazy;
use regex::Regex;

static AUTHORIZATION_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)authorization_uri="?https?://[^/"\s,]+/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})"#,
    )
    .expect("Invalid tenant id regex pattern")
});

/// Tenant id from a `WWW-Authenticate` challenge
///
/// ```text
/// Bearer authorization_uri=https://login.microsoftonline.com/<tenant>/oauth2/authorize, resource_id=...
/// ```
pub fn parse_tenant_id(challenge: &str) -> Option<String> {
    AUTHORIZATION_URI
        .captures(challenge)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// URL that answers unauthenticated requests with the challenge
pub fn challenge_url(instance: &str) -> String {
    format!("{}/api/data", instance.trim_end_matches('/'))
}
