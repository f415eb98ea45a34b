//! Row values and their JSON encoding.
//!
//! A [`Row`] is stored as a JSON object mapping column names to scalars.
//! Integers and floats are JSON numbers, strings are JSON strings and blobs
//! are `0x`-prefixed hex strings. JSON does not say which of those a value
//! was, so rows read back are run through [`Value::coerce`] with the
//! declared column type.

use core::{cmp::Ordering, fmt};
use std::collections::{BTreeMap, btree_map};

use alloy_primitives::hex;
use comb_index::{IndexKey, KeyType};
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::Error as _};

use crate::{DbError, Result};

/// A typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl Value {
    /// Name of the variant, as used in error messages
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Blob(_) => "blob",
        }
    }

    /// Whether the variant is the one `column_type` stores
    pub const fn matches(&self, column_type: KeyType) -> bool {
        matches!(
            (self, column_type),
            (Self::Int(_), KeyType::Integer)
                | (Self::Float(_), KeyType::Float)
                | (Self::Str(_), KeyType::String)
                | (Self::Blob(_), KeyType::Blob)
        )
    }

    /// Encodes the value into a key slot for a column of `column_type`
    ///
    /// The variant must match the column exactly and floats must be finite.
    pub fn to_key(&self, column: &str, column_type: KeyType) -> Result<IndexKey> {
        let key = match (self, column_type) {
            (Self::Int(v), KeyType::Integer) => IndexKey::from_i64(*v),
            (Self::Float(v), KeyType::Float) if !v.is_finite() => {
                return Err(DbError::NonFiniteFloat(column.to_owned()));
            }
            (Self::Float(v), KeyType::Float) => IndexKey::from_f64(*v),
            (Self::Str(v), KeyType::String) => IndexKey::from_str_key(v)?,
            (Self::Blob(v), KeyType::Blob) => IndexKey::from_slice(v)?,
            _ => return Err(DbError::type_mismatch(column, column_type, self.kind())),
        };
        Ok(key)
    }

    /// Decodes a key slot produced by [`Value::to_key`]
    ///
    /// Strings and blobs lose trailing zero bytes.
    pub fn from_key(key: &IndexKey, column_type: KeyType) -> Self {
        match column_type {
            KeyType::Integer => Self::Int(key.as_i64()),
            KeyType::Float => Self::Float(key.as_f64()),
            KeyType::String => Self::Str(String::from_utf8_lossy(key.trimmed()).into_owned()),
            KeyType::Blob => Self::Blob(key.trimmed().to_vec()),
        }
    }

    /// Converts a value read back from JSON to the declared column type
    pub fn coerce(self, column: &str, column_type: KeyType) -> Result<Self> {
        let mismatch = |value: &Self| DbError::type_mismatch(column, column_type, value.kind());
        match (self, column_type) {
            (value, _) if value.matches(column_type) => Ok(value),
            (Self::Int(v), KeyType::Float) => Ok(Self::Float(v as f64)),
            (Self::Float(v), KeyType::Integer) if v.fract() == 0.0 => Ok(Self::Int(v as i64)),
            (Self::Str(s), KeyType::Blob) => match s.strip_prefix("0x").map(hex::decode) {
                Some(Ok(bytes)) => Ok(Self::Blob(bytes)),
                _ => Err(mismatch(&Self::Str(s))),
            },
            (value, _) => Err(mismatch(&value)),
        }
    }

    /// Orders two values of compatible variants
    ///
    /// Integers and floats compare numerically with each other; any other
    /// mix has no order.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Int(a), Self::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Self::Float(a), Self::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Blob(v) => f.write_str(&hex::encode_prefixed(v)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) if !v.is_finite() => Err(S::Error::custom(format!("non-finite float {v}"))),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Str(v) => serializer.serialize_str(v),
            Self::Blob(v) => serializer.serialize_str(&hex::encode_prefixed(v)),
        }
    }
}

/// JSON scalars as they appear in a stored payload
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Int(v) => Self::Int(v),
            Scalar::Float(v) => Self::Float(v),
            Scalar::Str(v) => Self::Str(v),
        })
    }
}

/// A mapping from column name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a column value, builder style
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Sets a column value, returning the previous one
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    /// Value of `column`, if present
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Removes `column` from the row
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Number of columns present
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no column is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates columns in name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Compact JSON encoding
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a JSON object without applying column types
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
