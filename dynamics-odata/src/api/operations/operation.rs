//! Core Operation types for Web API writes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::api::constants::annotations::ODATA_ID;
use crate::api::constants::headers::{AUTO_DISASSOCIATE, IF_MATCH};
use crate::api::transport::Method;

/// How an update treats a record that does not exist yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Plain PATCH: the service creates the record when the key is unknown
    Upsert,
    /// PATCH with `If-Match: *`: fails with 404 when the record is missing
    #[default]
    UpdateOnly,
}

/// A single write executed against the Web API
///
/// Collections are entity set names (`accounts`) and keys are either a GUID
/// or an alternate key predicate (`accountnumber='A-1'`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new record
    Create {
        collection: String,
        data: Map<String, Value>,
    },
    /// Update (or upsert) an existing record
    Update {
        collection: String,
        key: String,
        data: Map<String, Value>,
        mode: WriteMode,
    },
    /// Delete a record
    Delete { collection: String, key: String },
    /// Add a relationship through a navigation property
    /// POST /{collection}({key})/{navigation}/$ref with body {"@odata.id": "{target}"}
    Associate {
        collection: String,
        key: String,
        navigation: String,
        /// Target path relative to the service root, e.g. `contacts(guid)`
        target: String,
    },
    /// Remove a relationship
    /// DELETE /{collection}({key})/{navigation}({target_key})/$ref
    /// or /{collection}({key})/{navigation}/$ref for single-valued properties
    Disassociate {
        collection: String,
        key: String,
        navigation: String,
        target_key: Option<String>,
    },
}

/// Outcome of a successful operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResult {
    /// HTTP status code from the response
    pub status: u16,
    /// Id read from `OData-EntityId`, for creates and updates
    pub entity_id: Option<String>,
    /// Response body, when the service returned one
    pub data: Option<Value>,
}

impl Operation {
    pub fn create(collection: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::Create {
            collection: collection.into(),
            data,
        }
    }

    pub fn update(
        collection: impl Into<String>,
        key: impl Into<String>,
        data: Map<String, Value>,
        mode: WriteMode,
    ) -> Self {
        Self::Update {
            collection: collection.into(),
            key: key.into(),
            data,
            mode,
        }
    }

    pub fn delete(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn associate(
        collection: impl Into<String>,
        key: impl Into<String>,
        navigation: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::Associate {
            collection: collection.into(),
            key: key.into(),
            navigation: navigation.into(),
            target: target.into(),
        }
    }

    pub fn disassociate(
        collection: impl Into<String>,
        key: impl Into<String>,
        navigation: impl Into<String>,
        target_key: Option<String>,
    ) -> Self {
        Self::Disassociate {
            collection: collection.into(),
            key: key.into(),
            navigation: navigation.into(),
            target_key,
        }
    }

    /// Get the collection this operation targets
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. }
            | Self::Associate { collection, .. }
            | Self::Disassociate { collection, .. } => collection,
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> Method {
        match self {
            Self::Create { .. } | Self::Associate { .. } => Method::POST,
            Self::Update { .. } => Method::PATCH,
            Self::Delete { .. } | Self::Disassociate { .. } => Method::DELETE,
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update {
                mode: WriteMode::Upsert,
                ..
            } => "upsert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Associate { .. } => "associate",
            Self::Disassociate { .. } => "disassociate",
        }
    }

    /// Path relative to the service root
    pub fn path(&self) -> String {
        match self {
            Self::Create { collection, .. } => collection.clone(),
            Self::Update { collection, key, .. } | Self::Delete { collection, key } => {
                format!("{}({})", collection, key)
            }
            Self::Associate {
                collection,
                key,
                navigation,
                ..
            } => format!("{}({})/{}/$ref", collection, key, navigation),
            Self::Disassociate {
                collection,
                key,
                navigation,
                target_key: Some(target),
            } => format!("{}({})/{}({})/$ref", collection, key, navigation, target),
            Self::Disassociate {
                collection,
                key,
                navigation,
                target_key: None,
            } => format!("{}({})/{}/$ref", collection, key, navigation),
        }
    }

    /// Headers specific to this operation
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::Update { mode, .. } => {
                let mut headers = vec![(AUTO_DISASSOCIATE, "true")];
                if *mode == WriteMode::UpdateOnly {
                    headers.push((IF_MATCH, "*"));
                }
                headers
            }
            _ => Vec::new(),
        }
    }

    /// JSON body, if the operation sends one
    pub fn body(&self, service_root: &str) -> Option<Value> {
        match self {
            Self::Create { data, .. } | Self::Update { data, .. } => {
                Some(Value::Object(data.clone()))
            }
            Self::Associate { target, .. } => Some(json!({
                ODATA_ID: format!("{}{}", service_root, target.trim_start_matches('/'))
            })),
            Self::Delete { .. } | Self::Disassociate { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://contoso.crm.dynamics.com/api/data/v9.2/";

    fn data() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".into(), json!("Acme"));
        map
    }

    #[test]
    fn test_create() {
        let op = Operation::create("accounts", data());
        assert_eq!(op.http_method(), Method::POST);
        assert_eq!(op.path(), "accounts");
        assert!(op.headers().is_empty());
        assert_eq!(op.body(ROOT), Some(json!({"name": "Acme"})));
    }

    #[test]
    fn test_update_modes() {
        let update = Operation::update("accounts", "A1", data(), WriteMode::UpdateOnly);
        assert_eq!(update.http_method(), Method::PATCH);
        assert_eq!(update.path(), "accounts(A1)");
        assert_eq!(update.operation_type(), "update");
        assert_eq!(
            update.headers(),
            vec![("MSCRM.AutoDisassociate", "true"), ("If-Match", "*")]
        );

        let upsert = Operation::update(
            "accounts",
            "accountnumber='X'",
            data(),
            WriteMode::Upsert,
        );
        assert_eq!(upsert.operation_type(), "upsert");
        assert_eq!(upsert.path(), "accounts(accountnumber='X')");
        assert_eq!(upsert.headers(), vec![("MSCRM.AutoDisassociate", "true")]);
    }

    #[test]
    fn test_associate_and_disassociate() {
        let associate = Operation::associate("accounts", "A1", "contact_customer_accounts", "/contacts(C1)");
        assert_eq!(associate.http_method(), Method::POST);
        assert_eq!(associate.path(), "accounts(A1)/contact_customer_accounts/$ref");
        assert_eq!(
            associate.body(ROOT),
            Some(json!({"@odata.id": format!("{}contacts(C1)", ROOT)}))
        );

        let many = Operation::disassociate("accounts", "A1", "contact_customer_accounts", Some("C1".into()));
        assert_eq!(many.http_method(), Method::DELETE);
        assert_eq!(many.path(), "accounts(A1)/contact_customer_accounts(C1)/$ref");
        assert_eq!(many.body(ROOT), None);

        let single = Operation::disassociate("contacts", "C1", "parentcustomerid_account", None);
        assert_eq!(single.path(), "contacts(C1)/parentcustomerid_account/$ref");
    }
}
