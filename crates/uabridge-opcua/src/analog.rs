// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Analog item metadata.
//!
//! An analog item exposes its ranges and unit as properties (`HasProperty`
//! children) named `EURange`, `EngineeringUnits`, `InstrumentRange`,
//! `ValuePrecision` and `Definition`. Only `EURange` is mandatory.

use serde::Serialize;
use uabridge_core::Value;

use crate::error::CoercionError;

/// Browse names of the analog item properties.
pub const EU_RANGE: &str = "EURange";
/// Engineering units property.
pub const ENGINEERING_UNITS: &str = "EngineeringUnits";
/// Instrument range property.
pub const INSTRUMENT_RANGE: &str = "InstrumentRange";
/// Value precision property.
pub const VALUE_PRECISION: &str = "ValuePrecision";
/// Definition property.
pub const DEFINITION: &str = "Definition";

/// The properties read for an analog item.
pub const ANALOG_PROPERTIES: [&str; 5] = [
    EU_RANGE,
    ENGINEERING_UNITS,
    INSTRUMENT_RANGE,
    VALUE_PRECISION,
    DEFINITION,
];

/// A value range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    /// Lowest value.
    pub low: f64,
    /// Highest value.
    pub high: f64,
}

impl Range {
    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        let bound = |name: &str| {
            value
                .field(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| CoercionError::type_mismatch("Range", value.type_name()))
        };
        Ok(Self {
            low: bound("low")?,
            high: bound("high")?,
        })
    }
}

/// Unit of an analog value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EuInformation {
    /// Organization that defines the unit.
    pub namespace_uri: String,
    /// Unit code.
    pub unit_id: i32,
    /// Display name, e.g. `°C`.
    pub display_name: String,
    /// Full name, e.g. `degree Celsius`.
    pub description: String,
}

impl EuInformation {
    fn from_value(value: &Value) -> Result<Self, CoercionError> {
        let text = |name: &str| {
            value
                .field(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };
        let unit_id = value
            .field("unit_id")
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| CoercionError::type_mismatch("EUInformation", value.type_name()))?;
        Ok(Self {
            namespace_uri: text("namespace_uri"),
            unit_id,
            display_name: text("display_name"),
            description: text("description"),
        })
    }
}

/// Metadata of an analog item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogDataItem {
    /// Unit of the value.
    pub engineering_units: Option<EuInformation>,
    /// Range of values in normal operation.
    pub engineering_units_range: Range,
    /// Range the instrument can return.
    pub instrument_range: Option<Range>,
    /// Digits after the decimal point, or for time values the resolution in ns.
    pub value_precision: Option<f64>,
    /// Vendor-specific definition of how the value is calculated.
    pub definition: Option<String>,
}

impl AnalogDataItem {
    /// Builds the metadata from `(browse name, value)` pairs.
    ///
    /// Returns `Ok(None)` if `EURange` is missing. Null values count as absent.
    pub fn from_properties<'a, I>(properties: I) -> Result<Option<Self>, CoercionError>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut range = None;
        let mut item = PartialItem::default();

        for (name, value) in properties {
            if value.is_null() {
                continue;
            }
            match name {
                EU_RANGE => range = Some(Range::from_value(value)?),
                ENGINEERING_UNITS => item.engineering_units = Some(EuInformation::from_value(value)?),
                INSTRUMENT_RANGE => item.instrument_range = Some(Range::from_value(value)?),
                VALUE_PRECISION => {
                    item.value_precision = Some(
                        value
                            .as_f64()
                            .ok_or_else(|| CoercionError::type_mismatch("Double", value.type_name()))?,
                    )
                }
                DEFINITION => item.definition = value.as_str().map(str::to_string),
                _ => {}
            }
        }

        Ok(range.map(|engineering_units_range| Self {
            engineering_units: item.engineering_units,
            engineering_units_range,
            instrument_range: item.instrument_range,
            value_precision: item.value_precision,
            definition: item.definition,
        }))
    }
}

#[derive(Default)]
struct PartialItem {
    engineering_units: Option<EuInformation>,
    instrument_range: Option<Range>,
    value_precision: Option<f64>,
    definition: Option<String>,
}

/// Encodes a range the way transports report it.
pub fn range_value(low: f64, high: f64) -> Value {
    Value::Struct(vec![
        ("low".to_string(), Value::Double(low)),
        ("high".to_string(), Value::Double(high)),
    ])
}

/// Encodes unit information the way transports report it.
pub fn eu_information_value(namespace_uri: &str, unit_id: i32, display_name: &str, description: &str) -> Value {
    Value::Struct(vec![
        ("namespace_uri".to_string(), Value::String(namespace_uri.to_string())),
        ("unit_id".to_string(), Value::Int32(unit_id)),
        ("display_name".to_string(), Value::String(display_name.to_string())),
        ("description".to_string(), Value::String(description.to_string())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_properties() {
        let range = range_value(0.0, 100.0);
        let units = eu_information_value("http://www.opcfoundation.org/UA/units/un/cefact", 4408652, "°C", "degree Celsius");
        let precision = Value::Int32(2);

        let item = AnalogDataItem::from_properties([
            (EU_RANGE, &range),
            (ENGINEERING_UNITS, &units),
            (VALUE_PRECISION, &precision),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(item.engineering_units_range, Range { low: 0.0, high: 100.0 });
        assert_eq!(item.engineering_units.unwrap().display_name, "°C");
        assert_eq!(item.value_precision, Some(2.0));
        assert!(item.instrument_range.is_none());
        assert!(item.definition.is_none());
    }

    #[test]
    fn test_missing_range() {
        let definition = Value::String("(TempA - 25) + TempB".into());
        let item = AnalogDataItem::from_properties([(DEFINITION, &definition)]).unwrap();
        assert!(item.is_none());
    }

    #[test]
    fn test_malformed_range() {
        let bad = Value::Double(1.0);
        assert!(AnalogDataItem::from_properties([(EU_RANGE, &bad)]).is_err());
    }
}
