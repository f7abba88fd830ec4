//! Attribute values held by a [`Record`](super::Record)

use serde_json::Value as Json;

use super::record::{Record, RecordRef};

/// Value of a record attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any scalar as it appears on the wire (string, number, bool, null, arrays)
    Scalar(Json),
    /// Lookup to another record
    Reference(RecordRef),
    /// Expanded related record
    Record(Box<Record>),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Json::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Scalar(Json::Null))
    }

    pub fn as_scalar(&self) -> Option<&Json> {
        match self {
            Value::Scalar(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Json::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Json::as_i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Json::as_bool)
    }

    pub fn as_reference(&self) -> Option<&RecordRef> {
        match self {
            Value::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::Scalar(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Json::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(Json::String(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Scalar(Json::from(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Scalar(Json::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Scalar(Json::from(f))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Json::Bool(b))
    }
}

impl From<RecordRef> for Value {
    fn from(reference: RecordRef) -> Self {
        Value::Reference(reference)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(Box::new(record))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Scalar(Json::String(s)) => write!(f, "{}", s),
            Value::Scalar(json) => write!(f, "{}", json),
            Value::Reference(reference) => write!(f, "{}", reference),
            Value::Record(record) => write!(f, "{}", record.to_reference()),
        }
    }
}
