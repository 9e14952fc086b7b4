//! Feature records produced by the sources: a geometry and a set of attributes.

use std::fmt::{Display, Formatter};

use cadgis_types::Geom;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use thiserror::Error;

/// Value of a feature attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// No value.
    Null,
    /// Floating point number.
    Number(f64),
    /// Integer number.
    Integer(i64),
    /// Text.
    String(String),
    /// Boolean.
    Boolean(bool),
    /// Point in time.
    Date(DateTime<Utc>),
}

impl AttributeValue {
    /// Converts a JSON value. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(v) => Self::Boolean(*v),
            Value::Number(n) => match n.as_i64() {
                Some(v) => Self::Integer(v),
                None => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            },
            Value::String(v) => Self::String(v.clone()),
            Value::Array(_) | Value::Object(_) => Self::String(value.to_string()),
        }
    }

    /// Date from milliseconds since the Unix epoch, the way feature services encode dates.
    pub fn from_epoch_millis(millis: i64) -> Self {
        match Utc.timestamp_millis_opt(millis).single() {
            Some(date) => Self::Date(date),
            None => Self::Integer(millis),
        }
    }

    /// Returns true for [`AttributeValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
        }
    }
}

/// String representation used for labels and grouping. `Null` is an empty string.
impl Display for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(v) => f.write_str(&v.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Attribute value has a different type than requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} attribute value, found {found}")]
pub struct ValueConversionError {
    /// Requested type.
    pub expected: &'static str,
    /// Type of the value.
    pub found: &'static str,
}

fn conversion_error(expected: &'static str, value: &AttributeValue) -> ValueConversionError {
    ValueConversionError {
        expected,
        found: value.type_name(),
    }
}

impl TryFrom<&AttributeValue> for f64 {
    type Error = ValueConversionError;

    fn try_from(value: &AttributeValue) -> Result<Self, Self::Error> {
        match value {
            AttributeValue::Number(v) => Ok(*v),
            AttributeValue::Integer(v) => Ok(*v as f64),
            _ => Err(conversion_error("number", value)),
        }
    }
}

impl TryFrom<&AttributeValue> for i64 {
    type Error = ValueConversionError;

    fn try_from(value: &AttributeValue) -> Result<Self, Self::Error> {
        match value {
            AttributeValue::Integer(v) => Ok(*v),
            AttributeValue::Number(v)
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 =>
            {
                Ok(*v as i64)
            }
            _ => Err(conversion_error("integer", value)),
        }
    }
}

impl TryFrom<&AttributeValue> for bool {
    type Error = ValueConversionError;

    fn try_from(value: &AttributeValue) -> Result<Self, Self::Error> {
        match value {
            AttributeValue::Boolean(v) => Ok(*v),
            _ => Err(conversion_error("boolean", value)),
        }
    }
}

impl<'a> TryFrom<&'a AttributeValue> for &'a str {
    type Error = ValueConversionError;

    fn try_from(value: &'a AttributeValue) -> Result<Self, Self::Error> {
        match value {
            AttributeValue::String(v) => Ok(v),
            _ => Err(conversion_error("string", value)),
        }
    }
}

impl TryFrom<&AttributeValue> for DateTime<Utc> {
    type Error = ValueConversionError;

    fn try_from(value: &AttributeValue) -> Result<Self, Self::Error> {
        match value {
            AttributeValue::Date(v) => Ok(*v),
            _ => Err(conversion_error("date", value)),
        }
    }
}

/// Attributes of a feature in the order the source returned them.
///
/// Keys are case-sensitive. Use [`Attributes::get_ignore_case`] to match a field name the way
/// the sources' field lists do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(IndexMap<String, AttributeValue>);

impl Attributes {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of an attribute, keeping its position if it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value of the attribute with exactly this key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Value of the attribute with this key, ignoring case. An exact match is preferred.
    pub fn get_ignore_case(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Actual key of the attribute matching `key` ignoring case.
    pub fn key_ignore_case(&self, key: &str) -> Option<&str> {
        match self.0.get_key_value(key) {
            Some((k, _)) => Some(k),
            None => self
                .0
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .map(String::as_str),
        }
    }

    /// Removes the attribute, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.shift_remove(key)
    }

    /// Attribute keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A single record read from a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    /// Attribute values.
    pub attributes: Attributes,
    /// Geometry. Records without geometry are not drawn but take part in grouping.
    pub geometry: Option<Geom>,
}

impl FeatureRecord {
    /// Creates a new record.
    pub fn new(attributes: Attributes, geometry: Option<Geom>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }
}
