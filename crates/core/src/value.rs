//! Value type definitions for keyview.
//!
//! `Value` is the loosely typed payload carried by option bags, such as the
//! extra options passed to a derived view's initialize hook.

use crate::hash::HashUnknown;
use alloc::string::String;
use alloc::collections::BTreeMap;

/// Extra options forwarded to derived view initialize hooks.
pub type Extras = BTreeMap<String, Value>;

/// A loosely typed option value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
}

impl Value {
    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64 or Int64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl HashUnknown for Value {
    fn hash_unknown(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Boolean(v) => v.hash_unknown(),
            Value::Int64(v) => v.hash_unknown(),
            Value::Float64(v) => v.hash_unknown(),
            Value::String(v) => v.hash_unknown(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_string;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7i64).as_i64(), Some(7));
        assert_eq!(Value::from(7i64).as_f64(), Some(7.0));
        assert_eq!(Value::from(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::from("name").as_str(), Some("name"));
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::Null.as_str(), None);
    }

    #[test]
    fn test_value_hash_unknown() {
        assert_eq!(Value::Null.hash_unknown(), 0.0);
        assert_eq!(Value::Boolean(true).hash_unknown(), 1.0);
        assert_eq!(Value::Int64(12).hash_unknown(), 12.0);
        assert_eq!(Value::Float64(f64::NAN).hash_unknown(), 0.0);
        assert_eq!(
            Value::from("abc").hash_unknown(),
            hash_string("abc", 0) as f64
        );
    }

    #[test]
    fn test_extras_map() {
        let mut extras = Extras::new();
        extras.insert("limit".into(), Value::from(10));
        assert_eq!(extras.get("limit").and_then(Value::as_i64), Some(10));
    }
}
