//! Access tokens

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Bearer token with its validity window `[not_before, expires_on)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: String,
    pub access_token: String,
    pub not_before: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.expires_on
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Time left until expiry, `None` once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_on - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Token endpoint response
///
/// The v1 endpoint sends timestamps as strings of epoch seconds.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default = "default_token_type")]
    token_type: String,
    access_token: String,
    #[serde(default, deserialize_with = "epoch_seconds")]
    expires_on: Option<i64>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    not_before: Option<i64>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl TokenResponse {
    pub(crate) fn into_token(self, now: DateTime<Utc>) -> Result<Token> {
        let timestamp = |secs: i64| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| Error::authentication(format!("Invalid token timestamp {}", secs)))
        };

        let expires_on = match (self.expires_on, self.expires_in) {
            (Some(on), _) => timestamp(on)?,
            (None, Some(within)) => now + chrono::Duration::seconds(within),
            (None, None) => {
                return Err(Error::authentication(
                    "Token response carries neither expires_on nor expires_in",
                ));
            }
        };
        let not_before = match self.not_before {
            Some(nbf) => timestamp(nbf)?,
            None => now,
        };

        Ok(Token {
            token_type: self.token_type,
            access_token: self.access_token,
            not_before,
            expires_on,
        })
    }
}
