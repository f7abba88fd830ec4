//! Certificate based client assertions
//!
//! Azure AD accepts a JWT signed with the application's certificate key in
//! place of a client secret. The header identifies the certificate by its
//! SHA-1 thumbprint (`x5t`).

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Assertion type submitted alongside `client_assertion`
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const VALIDITY_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    exp: i64,
}

/// Certificate and RSA key used to sign client assertions
#[derive(Clone)]
pub struct CertificateCredential {
    thumbprint: [u8; 20],
    key: EncodingKey,
}

impl std::fmt::Debug for CertificateCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCredential")
            .field("thumbprint", &self.thumbprint_hex())
            .finish_non_exhaustive()
    }
}

impl CertificateCredential {
    /// Build from PEM text
    ///
    /// `certificate_pem` must contain a `CERTIFICATE` block. The private key
    /// is taken from `key_pem`, or from `certificate_pem` when it bundles
    /// both.
    pub fn from_pem(certificate_pem: &str, key_pem: Option<&str>) -> Result<Self> {
        let der = pem_block(certificate_pem, "CERTIFICATE")
            .ok_or_else(|| Error::authentication("No CERTIFICATE block found in certificate PEM"))?;
        let der = STANDARD
            .decode(der)
            .map_err(|e| Error::authentication(format!("Certificate is not valid base64: {}", e)))?;

        let source = key_pem.unwrap_or(certificate_pem);
        let key_block = ["PRIVATE KEY", "RSA PRIVATE KEY"]
            .into_iter()
            .find_map(|label| {
                pem_block(source, label)
                    .map(|body| format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n"))
            })
            .ok_or_else(|| Error::authentication("No RSA private key found in PEM"))?;
        let key = EncodingKey::from_rsa_pem(key_block.as_bytes())
            .map_err(|e| Error::authentication(format!("Invalid RSA private key: {}", e)))?;

        Ok(Self {
            thumbprint: Sha1::digest(&der).into(),
            key,
        })
    }

    /// Read the certificate (and optionally a separate key file) from disk
    pub fn load(certificate_path: &Path, private_key_path: Option<&Path>) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                Error::authentication(format!("Failed to read {}: {}", path.display(), e))
            })
        };
        let certificate = read(certificate_path)?;
        let key = private_key_path.map(read).transpose()?;
        Self::from_pem(&certificate, key.as_deref())
    }

    /// Upper-case hex SHA-1 thumbprint, as shown by the Azure portal
    pub fn thumbprint_hex(&self) -> String {
        hex::encode_upper(self.thumbprint)
    }

    /// `x5t` header value
    pub fn x5t(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.thumbprint)
    }

    /// Signed assertion for `client_id`, valid five minutes either side of `now`
    pub fn assertion(&self, client_id: &str, audience: &str, now: DateTime<Utc>) -> Result<String> {
        let margin = chrono::Duration::minutes(VALIDITY_MARGIN_MINUTES);
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: Uuid::new_v4().to_string(),
            nbf: (now - margin).timestamp(),
            exp: (now + margin).timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.x5t());

        encode(&header, &claims, &self.key)
            .map_err(|e| Error::authentication(format!("Failed to sign client assertion: {}", e)))
    }
}

/// Base64 body of the first `-----BEGIN {label}-----` block
fn pem_block(pem: &str, label: &str) -> Option<String> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let start = pem.find(&begin)? + begin.len();
    let stop = start + pem[start..].find(&end)?;
    Some(pem[start..stop].split_whitespace().collect())
}
