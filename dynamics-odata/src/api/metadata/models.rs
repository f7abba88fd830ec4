//! Dynamics 365 metadata models
//!
//! These mirror the `EntityDefinitions` payload of the Web API and keep its
//! PascalCase field names on the wire, so a decoded tree serializes back to
//! the same shape for caching.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use super::enums::{AttributeRequiredLevel, AttributeTypeCode, OwnershipType};

/// A label in one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LocalizedLabel {
    pub label: String,
    pub language_code: i32,
}

/// Localized display text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Label {
    pub localized_labels: Vec<LocalizedLabel>,
    pub user_localized_label: Option<LocalizedLabel>,
}

impl Label {
    /// The user's label, else the first localized one
    pub fn text(&self) -> Option<&str> {
        self.user_localized_label
            .as_ref()
            .or_else(|| self.localized_labels.first())
            .map(|l| l.label.as_str())
    }
}

/// A customizable setting with its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagedProperty<T> {
    pub value: T,
    #[serde(default)]
    pub can_be_changed: bool,
}

/// `{"Value": "..."}` wrapper used for type names and formats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValueWrapper {
    pub value: String,
}

/// One choice of an option set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OptionMetadata {
    pub value: Option<i32>,
    pub label: Label,
    pub description: Label,
    pub color: Option<String>,
    /// State a status option belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<i32>,
    /// Default status of a state option
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_status: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OptionSetMetadata {
    pub metadata_id: Option<String>,
    pub name: Option<String>,
    pub is_global: Option<bool>,
    pub option_set_type: Option<String>,
    pub options: Vec<OptionMetadata>,
    /// Boolean option sets only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_option: Option<OptionMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_option: Option<OptionMetadata>,
}

impl OptionSetMetadata {
    /// Every `(value, label)` pair, boolean options included
    pub fn choices(&self) -> Vec<(i32, String)> {
        self.false_option
            .iter()
            .chain(self.true_option.iter())
            .chain(self.options.iter())
            .filter_map(|o| {
                let value = o.value?;
                Some((value, o.label.text().unwrap_or_default().to_string()))
            })
            .collect()
    }

    pub fn label_for(&self, value: i32) -> Option<String> {
        self.choices()
            .into_iter()
            .find(|(v, _)| *v == value)
            .map(|(_, label)| label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BooleanDetails {
    pub option_set: Option<OptionSetMetadata>,
    pub default_value: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PicklistDetails {
    pub option_set: Option<OptionSetMetadata>,
    pub global_option_set: Option<OptionSetMetadata>,
    pub default_form_value: Option<i32>,
}

impl PicklistDetails {
    /// Local option set, else the global one it is bound to
    pub fn options(&self) -> Option<&OptionSetMetadata> {
        self.option_set.as_ref().or(self.global_option_set.as_ref())
    }
}

/// State, status and entity-name attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OptionSetDetails {
    pub option_set: Option<OptionSetMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LookupDetails {
    pub targets: Vec<String>,
}

/// String and memo attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StringDetails {
    pub max_length: Option<i32>,
    pub format_name: Option<ValueWrapper>,
}

/// Integer and big integer attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IntegerDetails {
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub format: Option<String>,
}

/// Decimal, double and money attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DecimalDetails {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub precision: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DateTimeDetails {
    pub format: Option<String>,
    pub date_time_behavior: Option<ValueWrapper>,
}

/// Types without extra metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoDetails {}

/// Type-specific part of an attribute, chosen by its `AttributeType`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeDetails {
    Boolean(BooleanDetails),
    Picklist(PicklistDetails),
    MultiSelectPicklist(PicklistDetails),
    State(OptionSetDetails),
    Status(OptionSetDetails),
    EntityName(OptionSetDetails),
    Lookup(LookupDetails),
    String(StringDetails),
    Memo(StringDetails),
    Integer(IntegerDetails),
    BigInt(IntegerDetails),
    Decimal(DecimalDetails),
    Double(DecimalDetails),
    Money(DecimalDetails),
    DateTime(DateTimeDetails),
    Other(NoDetails),
}

type Decoder = fn(Json) -> serde_json::Result<AttributeDetails>;

/// Attribute type → decoder for its details
const DECODERS: &[(AttributeTypeCode, Decoder)] = &[
    (AttributeTypeCode::Boolean, |v| serde_json::from_value(v).map(AttributeDetails::Boolean)),
    (AttributeTypeCode::Picklist, |v| serde_json::from_value(v).map(AttributeDetails::Picklist)),
    (AttributeTypeCode::State, |v| serde_json::from_value(v).map(AttributeDetails::State)),
    (AttributeTypeCode::Status, |v| serde_json::from_value(v).map(AttributeDetails::Status)),
    (AttributeTypeCode::EntityName, |v| serde_json::from_value(v).map(AttributeDetails::EntityName)),
    (AttributeTypeCode::Customer, |v| serde_json::from_value(v).map(AttributeDetails::Lookup)),
    (AttributeTypeCode::Lookup, |v| serde_json::from_value(v).map(AttributeDetails::Lookup)),
    (AttributeTypeCode::Owner, |v| serde_json::from_value(v).map(AttributeDetails::Lookup)),
    (AttributeTypeCode::PartyList, |v| serde_json::from_value(v).map(AttributeDetails::Lookup)),
    (AttributeTypeCode::String, |v| serde_json::from_value(v).map(AttributeDetails::String)),
    (AttributeTypeCode::Memo, |v| serde_json::from_value(v).map(AttributeDetails::Memo)),
    (AttributeTypeCode::Integer, |v| serde_json::from_value(v).map(AttributeDetails::Integer)),
    (AttributeTypeCode::BigInt, |v| serde_json::from_value(v).map(AttributeDetails::BigInt)),
    (AttributeTypeCode::Decimal, |v| serde_json::from_value(v).map(AttributeDetails::Decimal)),
    (AttributeTypeCode::Double, |v| serde_json::from_value(v).map(AttributeDetails::Double)),
    (AttributeTypeCode::Money, |v| serde_json::from_value(v).map(AttributeDetails::Money)),
    (AttributeTypeCode::DateTime, |v| serde_json::from_value(v).map(AttributeDetails::DateTime)),
];

/// `AttributeTypeName` of multi-select choices, which report `AttributeType` Virtual
const MULTI_SELECT_TYPE_NAME: &str = "MultiSelectPicklistType";

impl AttributeDetails {
    fn decode(
        attribute_type: Option<AttributeTypeCode>,
        type_name: Option<&str>,
        raw: Json,
    ) -> serde_json::Result<Self> {
        if type_name == Some(MULTI_SELECT_TYPE_NAME) {
            return serde_json::from_value(raw).map(AttributeDetails::MultiSelectPicklist);
        }
        match attribute_type
            .and_then(|code| DECODERS.iter().find(|(c, _)| *c == code))
        {
            Some((_, decode)) => decode(raw),
            None => Ok(AttributeDetails::Other(NoDetails {})),
        }
    }

    /// Option set of choice-like attributes
    pub fn option_set(&self) -> Option<&OptionSetMetadata> {
        match self {
            Self::Boolean(d) => d.option_set.as_ref(),
            Self::Picklist(d) | Self::MultiSelectPicklist(d) => d.options(),
            Self::State(d) | Self::Status(d) | Self::EntityName(d) => d.option_set.as_ref(),
            _ => None,
        }
    }

    pub fn targets(&self) -> &[String] {
        match self {
            Self::Lookup(d) => &d.targets,
            _ => &[],
        }
    }
}

/// Attribute (column) metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeMetadata {
    pub metadata_id: Option<String>,
    pub logical_name: String,
    pub schema_name: Option<String>,
    pub entity_logical_name: Option<String>,
    pub display_name: Label,
    pub description: Label,
    pub attribute_type: Option<AttributeTypeCode>,
    pub attribute_type_name: Option<ValueWrapper>,
    pub attribute_of: Option<String>,
    pub is_primary_id: bool,
    pub is_primary_name: bool,
    pub is_custom_attribute: bool,
    pub is_valid_for_create: bool,
    pub is_valid_for_update: bool,
    pub is_valid_for_read: bool,
    pub required_level: Option<ManagedProperty<AttributeRequiredLevel>>,
    #[serde(flatten)]
    pub details: AttributeDetails,
}

/// Fields shared by every attribute type
#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AttributeCommon {
    metadata_id: Option<String>,
    logical_name: String,
    schema_name: Option<String>,
    entity_logical_name: Option<String>,
    display_name: Option<Label>,
    description: Option<Label>,
    attribute_type: Option<String>,
    attribute_type_name: Option<ValueWrapper>,
    attribute_of: Option<String>,
    is_primary_id: Option<bool>,
    is_primary_name: Option<bool>,
    is_custom_attribute: Option<bool>,
    is_valid_for_create: Option<bool>,
    is_valid_for_update: Option<bool>,
    is_valid_for_read: Option<bool>,
    required_level: Option<ManagedProperty<AttributeRequiredLevel>>,
}

impl<'de> Deserialize<'de> for AttributeMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Json::deserialize(deserializer)?;
        let common: AttributeCommon =
            serde_json::from_value(raw.clone()).map_err(serde::de::Error::custom)?;

        let attribute_type = common
            .attribute_type
            .as_deref()
            .and_then(AttributeTypeCode::from_label);
        let details = AttributeDetails::decode(
            attribute_type,
            common.attribute_type_name.as_ref().map(|n| n.value.as_str()),
            raw,
        )
        .map_err(serde::de::Error::custom)?;

        Ok(AttributeMetadata {
            metadata_id: common.metadata_id,
            logical_name: common.logical_name,
            schema_name: common.schema_name,
            entity_logical_name: common.entity_logical_name,
            display_name: common.display_name.unwrap_or_default(),
            description: common.description.unwrap_or_default(),
            attribute_type,
            attribute_type_name: common.attribute_type_name,
            attribute_of: common.attribute_of,
            is_primary_id: common.is_primary_id.unwrap_or(false),
            is_primary_name: common.is_primary_name.unwrap_or(false),
            is_custom_attribute: common.is_custom_attribute.unwrap_or(false),
            is_valid_for_create: common.is_valid_for_create.unwrap_or(false),
            is_valid_for_update: common.is_valid_for_update.unwrap_or(false),
            is_valid_for_read: common.is_valid_for_read.unwrap_or(false),
            required_level: common.required_level,
            details,
        })
    }
}

impl AttributeMetadata {
    pub fn is_required(&self) -> bool {
        matches!(
            self.required_level.as_ref().map(|r| r.value),
            Some(AttributeRequiredLevel::SystemRequired | AttributeRequiredLevel::ApplicationRequired)
        )
    }
}

/// Alternate key definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EntityKeyMetadata {
    pub metadata_id: Option<String>,
    pub logical_name: String,
    pub schema_name: Option<String>,
    pub key_attributes: Vec<String>,
    pub display_name: Label,
}

/// One-to-many relationship, seen from either side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OneToManyRelationshipMetadata {
    pub metadata_id: Option<String>,
    pub schema_name: String,
    pub referenced_entity: String,
    pub referenced_attribute: String,
    pub referencing_entity: String,
    pub referencing_attribute: String,
    pub referenced_entity_navigation_property_name: Option<String>,
    pub referencing_entity_navigation_property_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ManyToManyRelationshipMetadata {
    pub metadata_id: Option<String>,
    pub schema_name: String,
    pub entity1_logical_name: String,
    pub entity2_logical_name: String,
    pub intersect_entity_name: String,
    pub entity1_navigation_property_name: Option<String>,
    pub entity2_navigation_property_name: Option<String>,
}

/// Complete entity metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EntityMetadata {
    pub metadata_id: Option<String>,
    pub logical_name: String,
    pub schema_name: Option<String>,
    /// Entity set name for OData URLs (e.g., "accounts", "contacts")
    pub entity_set_name: Option<String>,
    pub primary_id_attribute: Option<String>,
    pub primary_name_attribute: Option<String>,
    pub object_type_code: Option<i32>,
    pub ownership_type: Option<OwnershipType>,
    pub display_name: Label,
    pub display_collection_name: Label,
    pub description: Label,
    pub is_custom_entity: Option<bool>,
    pub is_activity: Option<bool>,
    pub attributes: Vec<AttributeMetadata>,
    pub keys: Vec<EntityKeyMetadata>,
    pub many_to_one_relationships: Vec<OneToManyRelationshipMetadata>,
    pub one_to_many_relationships: Vec<OneToManyRelationshipMetadata>,
    pub many_to_many_relationships: Vec<ManyToManyRelationshipMetadata>,
}

impl EntityMetadata {
    pub fn attribute(&self, logical_name: &str) -> Option<&AttributeMetadata> {
        self.attributes
            .iter()
            .find(|a| a.logical_name == logical_name)
    }

    /// Many-to-one relationship backing a lookup attribute
    pub fn lookup_relationship(&self, attribute: &str) -> Option<&OneToManyRelationshipMetadata> {
        self.many_to_one_relationships
            .iter()
            .find(|r| r.referencing_attribute == attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attribute(value: Json) -> AttributeMetadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_subtype_chosen_by_attribute_type() {
        let name = attribute(json!({
            "@odata.type": "#Microsoft.Dynamics.CRM.StringAttributeMetadata",
            "MetadataId": "a1",
            "LogicalName": "name",
            "AttributeType": "String",
            "AttributeTypeName": {"Value": "StringType"},
            "IsPrimaryName": true,
            "MaxLength": 160,
            "RequiredLevel": {"Value": "ApplicationRequired", "CanBeChanged": true},
            "DisplayName": {
                "LocalizedLabels": [{"Label": "Account Name", "LanguageCode": 1033}],
                "UserLocalizedLabel": {"Label": "Account Name", "LanguageCode": 1033}
            }
        }));

        assert_eq!(name.attribute_type, Some(AttributeTypeCode::String));
        assert!(name.is_primary_name);
        assert!(name.is_required());
        assert_eq!(name.display_name.text(), Some("Account Name"));
        match &name.details {
            AttributeDetails::String(d) => assert_eq!(d.max_length, Some(160)),
            other => panic!("unexpected {:?}", other),
        }

        let owner = attribute(json!({
            "LogicalName": "ownerid",
            "AttributeType": "Owner",
            "Targets": ["systemuser", "team"]
        }));
        assert_eq!(owner.details.targets(), ["systemuser", "team"]);
    }

    #[test]
    fn test_multi_select_from_type_name() {
        let colors = attribute(json!({
            "LogicalName": "new_colors",
            "AttributeType": "Virtual",
            "AttributeTypeName": {"Value": "MultiSelectPicklistType"},
            "OptionSet": {
                "Options": [
                    {"Value": 1, "Label": {"LocalizedLabels": [{"Label": "Red", "LanguageCode": 1033}]}}
                ]
            }
        }));
        assert!(matches!(colors.details, AttributeDetails::MultiSelectPicklist(_)));
        assert_eq!(
            colors.details.option_set().unwrap().label_for(1).as_deref(),
            Some("Red")
        );
    }

    #[test]
    fn test_boolean_options_and_unknown_type() {
        let flag = attribute(json!({
            "LogicalName": "donotemail",
            "AttributeType": "Boolean",
            "OptionSet": {
                "TrueOption": {"Value": 1, "Label": {"UserLocalizedLabel": {"Label": "Do Not Allow", "LanguageCode": 1033}}},
                "FalseOption": {"Value": 0, "Label": {"UserLocalizedLabel": {"Label": "Allow", "LanguageCode": 1033}}}
            }
        }));
        assert_eq!(
            flag.details.option_set().unwrap().choices(),
            vec![(0, "Allow".to_string()), (1, "Do Not Allow".to_string())]
        );

        let rules = attribute(json!({"LogicalName": "x", "AttributeType": "SomethingNew"}));
        assert_eq!(rules.attribute_type, None);
        assert!(matches!(rules.details, AttributeDetails::Other(_)));
    }

    #[test]
    fn test_serialized_tree_decodes_back() {
        let picklist = attribute(json!({
            "MetadataId": "p1",
            "LogicalName": "industrycode",
            "AttributeType": "Picklist",
            "DefaultFormValue": -1,
            "GlobalOptionSet": {"Name": "industry", "IsGlobal": true, "Options": []}
        }));

        let entity = EntityMetadata {
            logical_name: "account".into(),
            ownership_type: Some(OwnershipType::UserOwned),
            attributes: vec![picklist],
            ..Default::default()
        };

        let text = serde_json::to_value(&entity).unwrap();
        assert_eq!(text["OwnershipType"], "UserOwned");
        assert_eq!(text["Attributes"][0]["AttributeType"], "Picklist");
        assert_eq!(text["Attributes"][0]["DefaultFormValue"], -1);

        let back: EntityMetadata = serde_json::from_value(text).unwrap();
        assert_eq!(back, entity);
    }
}
