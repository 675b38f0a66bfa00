//! Document and Value types for qset
//!
//! This module provides the data structures templates and results are made of:
//! - Document: an ordered mapping of field name to value
//! - Value: an enum over the JSON types plus ObjectId, DateTime and Regex
//! - Conversion to and from extended JSON (`$oid`, `$date`, `$regex`, `$binary`)

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Length of an ObjectId rendered as hex
pub const OBJECT_ID_HEX_LEN: usize = 24;

/// Regex options understood by `Value::Regex`
pub const REGEX_OPTIONS: &str = "imsx";

/// ObjectId type for MongoDB compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Check that `s` is a well-formed 24 character hex ObjectId
    pub fn is_valid_hex(s: &str) -> bool {
        s.len() == OBJECT_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Parse an ObjectId from its hex representation
    pub fn parse_str(s: &str) -> Result<Self, DocumentError> {
        if !Self::is_valid_hex(s) {
            return Err(DocumentError::InvalidObjectId(s.to_string()));
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| DocumentError::InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

/// Value type supporting all JSON types plus ObjectId, DateTime and Regex
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// String value
    String(String),
    /// Binary data
    Binary(Vec<u8>),
    /// Array of values
    Array(Vec<Value>),
    /// Nested document
    Object(BTreeMap<String, Value>),
    /// ObjectId for MongoDB compatibility
    ObjectId(ObjectId),
    /// DateTime with UTC timezone
    DateTime(DateTime<Utc>),
    /// Regular expression literal
    Regex { pattern: String, options: String },
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if value is a number (int or float)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
    }

    /// Check if value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as array reference
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as mutable object reference
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as date-time
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Get as ObjectId
    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(oid),
            _ => None,
        }
    }

    /// Get regex pattern and options
    pub fn as_regex(&self) -> Option<(&str, &str)> {
        match self {
            Value::Regex { pattern, options } => Some((pattern.as_str(), options.as_str())),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "document",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "date",
            Value::Regex { .. } => "regex",
        }
    }

    /// Convert from plain or extended JSON.
    ///
    /// Single-key wrapper objects `{"$oid": hex}`, `{"$date": rfc3339}` and
    /// `{"$binary": hex}` as well as `{"$regex": p}` / `{"$regex": p, "$options": o}`
    /// become their typed variants. Malformed wrappers stay plain documents, as
    /// do wrappers holding a `#` value variable so templates can still be
    /// substituted.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        Value::Int32(i as i32)
                    } else {
                        Value::Int64(i)
                    }
                } else {
                    Value::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => Self::from_json_object(obj),
        }
    }

    fn from_json_object(obj: &JsonMap<String, JsonValue>) -> Self {
        match (obj.len(), obj.iter().next()) {
            (1, Some((key, JsonValue::String(s)))) if key == "$oid" => {
                if let Ok(oid) = ObjectId::parse_str(s) {
                    return Value::ObjectId(oid);
                }
            }
            (1, Some((key, JsonValue::String(s)))) if key == "$date" => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Value::DateTime(dt.with_timezone(&Utc));
                }
            }
            (1, Some((key, JsonValue::String(s)))) if key == "$binary" => {
                if let Ok(bytes) = hex::decode(s) {
                    return Value::Binary(bytes);
                }
            }
            _ => {}
        }

        if let Some(JsonValue::String(pattern)) = obj.get("$regex") {
            let options = match obj.get("$options") {
                Some(JsonValue::String(o)) => Some(o.clone()),
                None => Some(String::new()),
                Some(_) => None,
            };
            let expected_len = if obj.contains_key("$options") { 2 } else { 1 };
            if let Some(options) = options {
                let variable = pattern.starts_with('#') || options.starts_with('#');
                if obj.len() == expected_len && !variable {
                    return Value::Regex {
                        pattern: pattern.clone(),
                        options,
                    };
                }
            }
        }

        Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        )
    }

    /// Convert to extended JSON
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int32(i) => JsonValue::from(*i),
            Value::Int64(i) => JsonValue::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Binary(b) => wrapper("$binary", hex::encode(b)),
            Value::Array(arr) => JsonValue::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => JsonValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::ObjectId(oid) => wrapper("$oid", oid.to_hex()),
            Value::DateTime(dt) => wrapper("$date", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Regex { pattern, options } => {
                let mut map = JsonMap::new();
                map.insert("$regex".to_string(), JsonValue::String(pattern.clone()));
                map.insert("$options".to_string(), JsonValue::String(options.clone()));
                JsonValue::Object(map)
            }
        }
    }
}

fn wrapper(key: &str, value: String) -> JsonValue {
    let mut map = JsonMap::new();
    map.insert(key.to_string(), JsonValue::String(value));
    JsonValue::Object(map)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Value::Array(arr)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(obj: BTreeMap<String, Value>) -> Self {
        Value::Object(obj)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Value::ObjectId(oid)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}

/// Document: fields ordered by key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    /// Document fields stored in a BTreeMap for ordered iteration
    pub fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Create a document from fields
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    /// Consume the document, returning its fields
    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Insert a field
    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        self.fields.insert(key, value)
    }

    /// Get a field by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a mutable field by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Check if a field exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of top level fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Get field by path (e.g., "user.address.city")
    pub fn get_by_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;

        for part in parts {
            match current {
                Value::Object(obj) => {
                    current = obj.get(part)?;
                }
                Value::Array(arr) => {
                    // Support array indexing
                    let index = part.parse::<usize>().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// Convert to an extended JSON value
    pub fn to_json_value(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Convert from a JSON value, which must be an object
    pub fn from_json_value(json: &JsonValue) -> Result<Self, DocumentError> {
        match json {
            JsonValue::Object(obj) => Ok(Self {
                fields: obj
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            }),
            other => Err(DocumentError::NotAnObject(other.to_string())),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string(self).map_err(|e| DocumentError::SerializationError(e.to_string()))
    }

    /// Convert to pretty JSON string
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DocumentError::SerializationError(e.to_string()))
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::DeserializationError(e.to_string()))
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

/// Document-related errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Invalid ObjectId: {0:?}")]
    InvalidObjectId(String),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
