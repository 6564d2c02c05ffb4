// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core value type shared by the connector and the pub/sub boundary.
//!
//! [`Value`] is the explicit variant used on every path that carries field
//! data: reading, writing, monitoring, method-call arguments and results, and
//! the messages exchanged over the buses. Its scalar variants follow the OPC UA
//! built-in types so that a value can be typed for the wire without guessing.

use std::fmt;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Value
// =============================================================================

/// A protocol-neutral data value.
///
/// # Examples
///
/// ```
/// use uabridge_core::types::Value;
///
/// let temp = Value::Double(25.5);
/// assert_eq!(temp.as_f64(), Some(25.5));
///
/// let json = serde_json::json!({"low": 0, "high": 100});
/// let range = Value::from_json(&json);
/// assert_eq!(range.field("high").and_then(Value::as_i64), Some(100));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Absent value.
    #[default]
    Null,

    /// Boolean value.
    Boolean(bool),

    /// Signed 8-bit integer.
    SByte(i8),

    /// Unsigned 8-bit integer.
    Byte(u8),

    /// Signed 16-bit integer.
    Int16(i16),

    /// Unsigned 16-bit integer.
    UInt16(u16),

    /// Signed 32-bit integer.
    Int32(i32),

    /// Unsigned 32-bit integer.
    UInt32(u32),

    /// Signed 64-bit integer.
    Int64(i64),

    /// Unsigned 64-bit integer.
    UInt64(u64),

    /// 32-bit floating point.
    Float(f32),

    /// 64-bit floating point.
    Double(f64),

    /// UTF-8 string.
    String(String),

    /// Point in time.
    DateTime(DateTime<Utc>),

    /// GUID.
    Guid(Uuid),

    /// Opaque bytes.
    ByteString(Vec<u8>),

    /// Ordered list of values.
    Array(Vec<Value>),

    /// Named fields, in declaration order.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::SByte(_) => "SByte",
            Value::Byte(_) => "Byte",
            Value::Int16(_) => "Int16",
            Value::UInt16(_) => "UInt16",
            Value::Int32(_) => "Int32",
            Value::UInt32(_) => "UInt32",
            Value::Int64(_) => "Int64",
            Value::UInt64(_) => "UInt64",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::DateTime(_) => "DateTime",
            Value::Guid(_) => "Guid",
            Value::ByteString(_) => "ByteString",
            Value::Array(_) => "Array",
            Value::Struct(_) => "Struct",
        }
    }

    /// Returns `true` if this is [`Value::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for integer and floating point variants.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::SByte(_)
                | Value::Byte(_)
                | Value::Int16(_)
                | Value::UInt16(_)
                | Value::Int32(_)
                | Value::UInt32(_)
                | Value::Int64(_)
                | Value::UInt64(_)
                | Value::Float(_)
                | Value::Double(_)
        )
    }

    /// Returns the boolean payload, if any.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns integer variants widened to `i64`.
    ///
    /// Floating point values are only accepted when they carry no fractional
    /// part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SByte(v) => Some(i64::from(*v)),
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::UInt16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Float(v) => float_to_i64(f64::from(*v)),
            Value::Double(v) => float_to_i64(*v),
            _ => None,
        }
    }

    /// Returns non-negative integer variants widened to `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Returns numeric variants as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::UInt64(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the string payload, if any.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the byte payload, if any.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteString(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the elements of an array value.
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Looks up a named field of a struct value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Converts this value to its natural JSON form.
    ///
    /// Byte strings become base64 text, timestamps RFC 3339 text and GUIDs
    /// their hyphenated form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::SByte(v) => serde_json::json!(*v),
            Value::Byte(v) => serde_json::json!(*v),
            Value::Int16(v) => serde_json::json!(*v),
            Value::UInt16(v) => serde_json::json!(*v),
            Value::Int32(v) => serde_json::json!(*v),
            Value::UInt32(v) => serde_json::json!(*v),
            Value::Int64(v) => serde_json::json!(*v),
            Value::UInt64(v) => serde_json::json!(*v),
            Value::Float(v) => serde_json::json!(*v),
            Value::Double(v) => serde_json::json!(*v),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::DateTime(v) => serde_json::Value::String(v.to_rfc3339()),
            Value::Guid(v) => serde_json::Value::String(v.to_string()),
            Value::ByteString(v) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(v),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Builds a value from arbitrary JSON.
    ///
    /// Integers map to `Int64` (or `UInt64` beyond `i64::MAX`), other numbers to
    /// `Double`, and objects to `Struct` with the object's key order.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt64(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::SByte(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Guid(v) => write!(f, "{}", v),
            Value::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Value::Array(v) => write!(f, "[{} elements]", v.len()),
            Value::Struct(v) => write!(f, "{{{} fields}}", v.len()),
        }
    }
}

macro_rules! impl_from_for_value {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_for_value!(Boolean, bool);
impl_from_for_value!(SByte, i8);
impl_from_for_value!(Byte, u8);
impl_from_for_value!(Int16, i16);
impl_from_for_value!(UInt16, u16);
impl_from_for_value!(Int32, i32);
impl_from_for_value!(UInt32, u32);
impl_from_for_value!(Int64, i64);
impl_from_for_value!(UInt64, u64);
impl_from_for_value!(Float, f32);
impl_from_for_value!(Double, f64);
impl_from_for_value!(String, String);
impl_from_for_value!(DateTime, DateTime<Utc>);
impl_from_for_value!(Guid, Uuid);
impl_from_for_value!(ByteString, Vec<u8>);
impl_from_for_value!(Array, Vec<Value>);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int16(-3).as_i64(), Some(-3));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::Double(10.0).as_i64(), Some(10));
        assert_eq!(Value::Double(10.5).as_i64(), None);
        assert_eq!(Value::Int32(-1).as_u64(), None);
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert!(Value::Byte(1).is_numeric());
        assert!(!Value::String("1".into()).is_numeric());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({
            "temp": 21.5,
            "count": 3,
            "tags": ["a", "b"],
            "missing": null,
        });
        let value = Value::from_json(&json);

        assert_eq!(value.field("temp"), Some(&Value::Double(21.5)));
        assert_eq!(value.field("count"), Some(&Value::Int64(3)));
        assert_eq!(value.field("missing"), Some(&Value::Null));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_bytes_to_json_base64() {
        let value = Value::ByteString(vec![0xFF, 0xA5, 0x00, 0x37]);
        assert_eq!(value.to_json(), serde_json::json!("/6UANw=="));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
        assert_eq!(Value::ByteString(vec![1, 2]).to_string(), "<2 bytes>");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(1i32)), Value::Int32(1));
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_tagged_serde() {
        let value = Value::Int32(7);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"Int32","value":7}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
