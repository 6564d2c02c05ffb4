// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value coercion between wire and application representation.
//!
//! A [`Coercion`] is an optional, pure, possibly failing function attached to
//! a data source. It runs with `for_reading = true` on read and monitor paths
//! (wire to application) and with `for_reading = false` on write and call
//! argument paths (application to wire).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uabridge_core::Value;

use crate::error::CoercionError;

type CoerceFn =
    dyn Fn(Value, Option<DateTime<Utc>>, bool) -> Result<Value, CoercionError> + Send + Sync;

/// A bidirectional value transform.
///
/// # Examples
///
/// ```
/// use uabridge_core::Value;
/// use uabridge_opcua::coercion::Coercion;
///
/// // Megabytes in the application, bytes on the wire.
/// let mb = Coercion::linear(1024.0 * 1024.0, 0.0);
///
/// let wire = mb.apply(Value::Int64(10), None, false).unwrap();
/// assert_eq!(wire, Value::Double(10_485_760.0));
///
/// let app = mb.apply(Value::UInt32(10_485_760), None, true).unwrap();
/// assert_eq!(app, Value::Double(10.0));
/// ```
#[derive(Clone)]
pub struct Coercion {
    label: String,
    func: Arc<CoerceFn>,
}

impl Coercion {
    /// Wraps a coercion function.
    ///
    /// The function receives the value, the source timestamp if the server
    /// reported one, and whether the value is being read.
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, Option<DateTime<Utc>>, bool) -> Result<Value, CoercionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// A linear transform with `wire = app * factor + offset`.
    ///
    /// Numbers are produced as `Double`. Arrays are transformed element-wise
    /// and `Null` passes through.
    pub fn linear(factor: f64, offset: f64) -> Self {
        Self::new(
            format!("linear(factor={}, offset={})", factor, offset),
            move |value, _, for_reading| linear_apply(value, factor, offset, for_reading),
        )
    }

    /// Runs the transform.
    pub fn apply(
        &self,
        value: Value,
        timestamp: Option<DateTime<Utc>>,
        for_reading: bool,
    ) -> Result<Value, CoercionError> {
        (self.func)(value, timestamp, for_reading)
    }

    /// Returns the descriptive label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Coercion").field(&self.label).finish()
    }
}

/// Applies an optional coercion; identity when absent.
pub fn coerce_value(
    coercion: Option<&Coercion>,
    value: Value,
    timestamp: Option<DateTime<Utc>>,
    for_reading: bool,
) -> Result<Value, CoercionError> {
    match coercion {
        Some(coercion) => coercion.apply(value, timestamp, for_reading),
        None => Ok(value),
    }
}

fn linear_apply(
    value: Value,
    factor: f64,
    offset: f64,
    for_reading: bool,
) -> Result<Value, CoercionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => items
            .into_iter()
            .map(|item| linear_apply(item, factor, offset, for_reading))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => {
            let x = other
                .as_f64()
                .filter(|_| other.is_numeric())
                .ok_or_else(|| CoercionError::type_mismatch("number", other.type_name()))?;
            if for_reading {
                if factor == 0.0 {
                    return Err(CoercionError::failed("linear factor must not be zero"));
                }
                Ok(Value::Double((x - offset) / factor))
            } else {
                Ok(Value::Double(x * factor + offset))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_without_coercion() {
        let value = Value::String("raw".into());
        assert_eq!(coerce_value(None, value.clone(), None, true).unwrap(), value);
    }

    #[test]
    fn test_linear_roundtrip() {
        let celsius_tenths = Coercion::linear(10.0, 2731.5);
        let wire = celsius_tenths.apply(Value::Double(21.5), None, false).unwrap();
        assert_eq!(wire, Value::Double(2946.5));
        let app = celsius_tenths.apply(wire, None, true).unwrap();
        assert_eq!(app, Value::Double(21.5));
    }

    #[test]
    fn test_linear_rejects_non_numbers() {
        let coercion = Coercion::linear(2.0, 0.0);
        assert!(coercion.apply(Value::String("x".into()), None, true).is_err());
        assert!(coercion.apply(Value::Boolean(true), None, false).is_err());
        assert_eq!(coercion.apply(Value::Null, None, true).unwrap(), Value::Null);
        assert!(Coercion::linear(0.0, 1.0).apply(Value::Int32(1), None, true).is_err());
    }

    #[test]
    fn test_custom_coercion_sees_timestamp() {
        let stamp = Coercion::new("stamp", |value, timestamp, for_reading| {
            if !for_reading {
                return Err(CoercionError::failed("read only"));
            }
            Ok(Value::Struct(vec![
                ("value".to_string(), value),
                ("hasTimestamp".to_string(), Value::Boolean(timestamp.is_some())),
            ]))
        });

        let out = stamp.apply(Value::Int32(1), Some(Utc::now()), true).unwrap();
        assert_eq!(out.field("hasTimestamp"), Some(&Value::Boolean(true)));
        assert!(stamp.apply(Value::Int32(1), None, false).is_err());
        assert_eq!(format!("{:?}", stamp), "Coercion(\"stamp\")");
    }
}
