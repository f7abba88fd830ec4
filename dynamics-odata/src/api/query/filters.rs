//! Typed `$filter` expressions
//!
//! String literals are quoted and single quotes doubled. Raw filter strings
//! passed to [`QueryOptions::filter`](super::QueryOptions::filter) are sent
//! untouched.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    Null,
}

impl FilterValue {
    pub fn to_odata(&self) -> String {
        match self {
            FilterValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Guid(g) => g.to_string(),
            FilterValue::DateTime(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            FilterValue::Null => "null".to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value.into())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        FilterValue::Guid(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::DateTime(value)
    }
}

/// A `$filter` expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    Ne(String, FilterValue),
    Gt(String, FilterValue),
    Ge(String, FilterValue),
    Lt(String, FilterValue),
    Le(String, FilterValue),
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Pre-built expression, sent as is
    Raw(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Ge(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Le(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains(field.into(), value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith(field.into(), value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::EndsWith(field.into(), value.into())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::Eq(field.into(), FilterValue::Null)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn to_odata(&self) -> String {
        let function = |name: &str, field: &str, value: &str| {
            format!("{}({},{})", name, field, FilterValue::from(value).to_odata())
        };
        let join = |filters: &[Filter], op: &str| {
            filters
                .iter()
                .map(|f| match f {
                    Filter::And(_) | Filter::Or(_) => format!("({})", f.to_odata()),
                    _ => f.to_odata(),
                })
                .collect::<Vec<_>>()
                .join(op)
        };

        match self {
            Filter::Eq(field, value) => format!("{} eq {}", field, value.to_odata()),
            Filter::Ne(field, value) => format!("{} ne {}", field, value.to_odata()),
            Filter::Gt(field, value) => format!("{} gt {}", field, value.to_odata()),
            Filter::Ge(field, value) => format!("{} ge {}", field, value.to_odata()),
            Filter::Lt(field, value) => format!("{} lt {}", field, value.to_odata()),
            Filter::Le(field, value) => format!("{} le {}", field, value.to_odata()),
            Filter::Contains(field, value) => function("contains", field, value),
            Filter::StartsWith(field, value) => function("startswith", field, value),
            Filter::EndsWith(field, value) => function("endswith", field, value),
            Filter::And(filters) => join(filters, " and "),
            Filter::Or(filters) => join(filters, " or "),
            Filter::Not(inner) => format!("not ({})", inner.to_odata()),
            Filter::Raw(expression) => expression.clone(),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_odata())
    }
}
