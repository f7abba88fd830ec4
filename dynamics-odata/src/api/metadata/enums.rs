//! Metadata enumerations with their numeric codes and wire labels

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Declares an enum whose variants carry a numeric code and a wire label
///
/// Values serialize as their label and deserialize from either the label or
/// the numeric code.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn value(self) -> i32 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn from_value(value: i32) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.value() == value)
            }

            pub fn from_label(label: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label().eq_ignore_ascii_case(label))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match Coded::deserialize(deserializer)? {
                    Coded::Label(label) => Self::from_label(&label).ok_or_else(|| {
                        serde::de::Error::custom(format!(
                            "unknown {} '{}'",
                            stringify!($name),
                            label
                        ))
                    }),
                    Coded::Value(value) => Self::from_value(value).ok_or_else(|| {
                        serde::de::Error::custom(format!(
                            "unknown {} code {}",
                            stringify!($name),
                            value
                        ))
                    }),
                }
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coded {
    Value(i32),
    Label(String),
}

labelled_enum! {
    /// Attribute data type (`AttributeType`)
    pub enum AttributeTypeCode {
        Boolean = 0 => "Boolean",
        Customer = 1 => "Customer",
        DateTime = 2 => "DateTime",
        Decimal = 3 => "Decimal",
        Double = 4 => "Double",
        Integer = 5 => "Integer",
        Lookup = 6 => "Lookup",
        Memo = 7 => "Memo",
        Money = 8 => "Money",
        Owner = 9 => "Owner",
        PartyList = 10 => "PartyList",
        Picklist = 11 => "Picklist",
        State = 12 => "State",
        Status = 13 => "Status",
        String = 14 => "String",
        Uniqueidentifier = 15 => "Uniqueidentifier",
        CalendarRules = 16 => "CalendarRules",
        Virtual = 17 => "Virtual",
        BigInt = 18 => "BigInt",
        ManagedProperty = 19 => "ManagedProperty",
        EntityName = 20 => "EntityName",
    }
}

impl AttributeTypeCode {
    /// Lookup-like types whose values are references to other records
    pub fn is_lookup(self) -> bool {
        matches!(
            self,
            Self::Customer | Self::Lookup | Self::Owner | Self::PartyList
        )
    }
}

labelled_enum! {
    /// Who owns records of an entity
    pub enum OwnershipType {
        None = 0 => "None",
        UserOwned = 1 => "UserOwned",
        TeamOwned = 2 => "TeamOwned",
        BusinessOwned = 4 => "BusinessOwned",
        OrganizationOwned = 8 => "OrganizationOwned",
        BusinessParented = 16 => "BusinessParented",
    }
}

labelled_enum! {
    /// Whether an attribute must have a value
    pub enum AttributeRequiredLevel {
        None = 0 => "None",
        SystemRequired = 1 => "SystemRequired",
        ApplicationRequired = 2 => "ApplicationRequired",
        Recommended = 3 => "Recommended",
    }
}
