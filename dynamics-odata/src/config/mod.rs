//! Client configuration
//!
//! Settings can be read from a TOML file, from `DYNAMICS_*` environment
//! variables (a `.env` file is honoured), or built in code.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Web API version segment
pub const DEFAULT_API_VERSION: &str = "9.2";

/// Default Azure AD authority host
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// How the application proves its identity to Azure AD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Shared client secret
    Secret { client_secret: String },
    /// Certificate based client assertion
    ///
    /// `certificate_path` points to a PEM file holding the certificate. The
    /// RSA private key is read from `private_key_path`, or from the same file
    /// when no separate key path is given.
    Certificate {
        certificate_path: PathBuf,
        #[serde(default)]
        private_key_path: Option<PathBuf>,
    },
}

/// Connection settings for one Dynamics 365 instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Instance URI, e.g. `https://contoso.crm4.dynamics.com`
    pub instance_uri: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Application (client) id registered in Azure AD
    pub client_id: String,
    /// Skips tenant discovery when set
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub credentials: Credentials,
    /// Transport timeout in seconds, none means the HTTP client default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_schema_ttl_secs")]
    pub schema_ttl_secs: u64,
    #[serde(default = "default_metadata_ttl_secs")]
    pub metadata_ttl_secs: u64,
    /// Upper bound on continuation pages followed automatically
    #[serde(default)]
    pub max_auto_pages: Option<usize>,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_schema_ttl_secs() -> u64 {
    60 * 60 * 24
}

fn default_metadata_ttl_secs() -> u64 {
    60 * 60 * 24 * 7
}

impl ClientSettings {
    /// Settings using a client secret, with defaults for everything else
    pub fn with_secret(
        instance_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::new(
            instance_uri,
            client_id,
            Credentials::Secret {
                client_secret: client_secret.into(),
            },
        )
    }

    pub fn new(
        instance_uri: impl Into<String>,
        client_id: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            instance_uri: instance_uri.into(),
            api_version: default_api_version(),
            authority: default_authority(),
            client_id: client_id.into(),
            tenant_id: None,
            credentials,
            timeout_secs: None,
            schema_ttl_secs: default_schema_ttl_secs(),
            metadata_ttl_secs: default_metadata_ttl_secs(),
            max_auto_pages: None,
        }
    }

    /// Instance URI without a trailing slash
    pub fn instance(&self) -> &str {
        self.instance_uri.trim_end_matches('/')
    }

    /// Web API service root, e.g. `https://contoso.crm.dynamics.com/api/data/v9.2/`
    pub fn service_root(&self) -> String {
        format!("{}/api/data/v{}/", self.instance(), self.api_version)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl_secs)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).context("Failed to parse client settings TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    /// Load settings from the default location in the user's config directory
    pub fn load_default() -> Result<Self> {
        let path = default_config_path().context("Could not determine config directory")?;
        Self::load_from_file(&path)
    }

    /// Build settings from `DYNAMICS_*` environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("Missing environment variable {}", key))
        };

        let credentials = if let Some(secret) = lookup("DYNAMICS_CLIENT_SECRET") {
            Credentials::Secret {
                client_secret: secret,
            }
        } else if let Some(cert) = lookup("DYNAMICS_CERTIFICATE_PATH") {
            Credentials::Certificate {
                certificate_path: PathBuf::from(cert),
                private_key_path: lookup("DYNAMICS_PRIVATE_KEY_PATH").map(PathBuf::from),
            }
        } else {
            anyhow::bail!(
                "Either DYNAMICS_CLIENT_SECRET or DYNAMICS_CERTIFICATE_PATH must be set"
            );
        };

        let mut settings = Self::new(
            required("DYNAMICS_INSTANCE_URI")?,
            required("DYNAMICS_CLIENT_ID")?,
            credentials,
        );
        settings.tenant_id = lookup("DYNAMICS_TENANT_ID");
        if let Some(version) = lookup("DYNAMICS_API_VERSION") {
            settings.api_version = version;
        }
        if let Some(authority) = lookup("DYNAMICS_AUTHORITY") {
            settings.authority = authority;
        }
        if let Some(timeout) = lookup("DYNAMICS_TIMEOUT_SECS") {
            settings.timeout_secs = Some(
                timeout
                    .parse()
                    .context("DYNAMICS_TIMEOUT_SECS must be a whole number of seconds")?,
            );
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !self.instance_uri.starts_with("https://") && !self.instance_uri.starts_with("http://")
        {
            anyhow::bail!("Instance URI must be absolute: {}", self.instance_uri);
        }
        if self.client_id.trim().is_empty() {
            anyhow::bail!("Client id must not be empty");
        }
        Ok(())
    }
}

/// `<config dir>/dynamics-odata/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dynamics-odata").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_secret_settings() {
        let settings = ClientSettings::from_toml_str(
            r#"
            instance_uri = "https://contoso.crm4.dynamics.com/"
            client_id = "00000000-0000-0000-0000-000000000001"

            [credentials]
            type = "secret"
            client_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(settings.instance(), "https://contoso.crm4.dynamics.com");
        assert_eq!(
            settings.service_root(),
            "https://contoso.crm4.dynamics.com/api/data/v9.2/"
        );
        assert_eq!(settings.authority, DEFAULT_AUTHORITY);
        assert_eq!(settings.metadata_ttl(), Duration::from_secs(604_800));
        assert!(matches!(settings.credentials, Credentials::Secret { .. }));
    }

    #[test]
    fn test_parse_certificate_settings() {
        let settings = ClientSettings::from_toml_str(
            r#"
            instance_uri = "https://contoso.crm.dynamics.com"
            client_id = "app"
            tenant_id = "tenant"
            max_auto_pages = 50

            [credentials]
            type = "certificate"
            certificate_path = "/etc/dynamics/cert.pem"
            "#,
        )
        .unwrap();

        assert_eq!(settings.tenant_id.as_deref(), Some("tenant"));
        assert_eq!(settings.max_auto_pages, Some(50));
        assert_eq!(
            settings.credentials,
            Credentials::Certificate {
                certificate_path: PathBuf::from("/etc/dynamics/cert.pem"),
                private_key_path: None,
            }
        );
    }

    #[test]
    fn test_rejects_relative_instance() {
        let result = ClientSettings::from_toml_str(
            r#"
            instance_uri = "contoso.crm.dynamics.com"
            client_id = "app"
            [credentials]
            type = "secret"
            client_secret = "x"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DYNAMICS_INSTANCE_URI", "https://contoso.crm.dynamics.com"),
            ("DYNAMICS_CLIENT_ID", "app"),
            ("DYNAMICS_CLIENT_SECRET", "secret"),
            ("DYNAMICS_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let settings =
            ClientSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.client_id, "app");
        assert_eq!(settings.timeout(), Some(Duration::from_secs(30)));
        assert!(settings.tenant_id.is_none());
    }

    #[test]
    fn test_from_lookup_requires_credentials() {
        let vars: HashMap<&str, &str> = [
            ("DYNAMICS_INSTANCE_URI", "https://contoso.crm.dynamics.com"),
            ("DYNAMICS_CLIENT_ID", "app"),
        ]
        .into_iter()
        .collect();

        let err = ClientSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DYNAMICS_CLIENT_SECRET"));
    }
}
