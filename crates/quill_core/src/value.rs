//! Record and value model.
//!
//! Tables store [`Record`]s: ordered maps from field name to [`Value`].
//! Indexes order values through [`IndexKey`], a byte encoding whose
//! lexicographic order matches the value order.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

/// A document: field names mapped to values, ordered by name.
///
/// # Example
///
/// ```rust
/// use quill_core::{Record, Value};
///
/// let user = Record::new().with("name", "ada").with("age", 36);
/// assert_eq!(user.get("age"), Some(&Value::Integer(36)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets `field` to `value`, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Returns the value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Removes `field`, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;

const SIGN_BIT: u64 = 1 << 63;

/// Order-preserving encoding of a [`Value`].
///
/// Comparing two keys bytewise gives the same answer as comparing the
/// values: first by type (null < bool < integer < float < text < bytes),
/// then within the type. Floats follow IEEE total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey(Vec<u8>);

impl IndexKey {
    /// Encodes a value.
    #[must_use]
    pub fn encode(value: &Value) -> Self {
        let mut out = Vec::with_capacity(9);
        match value {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::Integer(i) => {
                out.push(TAG_INTEGER);
                out.extend_from_slice(&((*i as u64) ^ SIGN_BIT).to_be_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                let bits = f.to_bits();
                let ordered = if bits & SIGN_BIT != 0 {
                    !bits
                } else {
                    bits | SIGN_BIT
                };
                out.extend_from_slice(&ordered.to_be_bytes());
            }
            Value::Text(s) => {
                out.push(TAG_TEXT);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                out.extend_from_slice(b);
            }
        }
        Self(out)
    }

    /// Decodes the value this key was built from.
    ///
    /// # Errors
    ///
    /// Returns a codec error for bytes that no value encodes to.
    pub fn decode(&self) -> CoreResult<Value> {
        let (tag, body) = self
            .0
            .split_first()
            .ok_or_else(|| CoreError::codec("empty index key"))?;

        match *tag {
            TAG_NULL if body.is_empty() => Ok(Value::Null),
            TAG_BOOL if body.len() == 1 => Ok(Value::Bool(body[0] != 0)),
            TAG_INTEGER => {
                let raw = u64::from_be_bytes(fixed8(body)?);
                Ok(Value::Integer((raw ^ SIGN_BIT) as i64))
            }
            TAG_FLOAT => {
                let ordered = u64::from_be_bytes(fixed8(body)?);
                let bits = if ordered & SIGN_BIT != 0 {
                    ordered & !SIGN_BIT
                } else {
                    !ordered
                };
                Ok(Value::Float(f64::from_bits(bits)))
            }
            TAG_TEXT => String::from_utf8(body.to_vec())
                .map(Value::Text)
                .map_err(|_| CoreError::codec("index key holds invalid UTF-8")),
            TAG_BYTES => Ok(Value::Bytes(body.to_vec())),
            other => Err(CoreError::codec(format!("unknown index key tag {other:#04x}"))),
        }
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn fixed8(body: &[u8]) -> CoreResult<[u8; 8]> {
    body.try_into()
        .map_err(|_| CoreError::codec("expected 8 bytes in index key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn record_builder_and_accessors() {
        let mut record = Record::new().with("name", "ada").with("age", 36);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("name"), Some(&Value::Text("ada".into())));

        let previous = record.set("age", 37);
        assert_eq!(previous, Some(Value::Integer(36)));
        assert_eq!(record.remove("name"), Some(Value::Text("ada".into())));
        assert_eq!(record.iter().count(), 1);
    }

    #[test]
    fn record_from_iterator() {
        let record: Record = vec![("b", 2), ("a", 1)].into_iter().collect();
        let names: Vec<_> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn keys_order_by_type_first() {
        let ordered = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Integer(-5),
            Value::Integer(3),
            Value::Float(-1.5),
            Value::Float(0.0),
            Value::Float(2.25),
            Value::Text("a".into()),
            Value::Text("ab".into()),
            Value::Bytes(vec![0]),
        ];
        let keys: Vec<_> = ordered.iter().map(IndexKey::encode).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(IndexKey(vec![]).decode().is_err());
        assert!(IndexKey(vec![0x7f]).decode().is_err());
        assert!(IndexKey(vec![TAG_INTEGER, 1, 2]).decode().is_err());
    }

    proptest! {
        #[test]
        fn integer_keys_preserve_order(a in any::<i64>(), b in any::<i64>()) {
            let ka = IndexKey::encode(&Value::Integer(a));
            let kb = IndexKey::encode(&Value::Integer(b));
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
            prop_assert_eq!(ka.decode().unwrap(), Value::Integer(a));
        }

        #[test]
        fn float_keys_follow_total_order(a in any::<f64>(), b in any::<f64>()) {
            let ka = IndexKey::encode(&Value::Float(a));
            let kb = IndexKey::encode(&Value::Float(b));
            prop_assert_eq!(ka.cmp(&kb), a.total_cmp(&b));
        }

        #[test]
        fn text_keys_preserve_order(a in ".{0,16}", b in ".{0,16}") {
            let ka = IndexKey::encode(&Value::Text(a.clone()));
            let kb = IndexKey::encode(&Value::Text(b.clone()));
            prop_assert_eq!(ka.cmp(&kb), a.as_bytes().cmp(b.as_bytes()));
        }
    }
}
