// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA specific types and connection options.
//!
//! This module contains:
//!
//! - **Addressing**: [`NodeId`], [`NodeIdentifier`], [`QualifiedName`]
//! - **Status**: [`StatusCode`] with good/uncertain/bad discrimination
//! - **Typing**: [`DataType`] and the coercion of application values to wire types
//! - **Attributes**: [`AttributeId`], [`NodeClass`]
//! - **Session**: [`UserIdentity`], [`SecurityMode`], [`SecurityPolicy`],
//!   [`ConnectionOptions`]

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uabridge_core::Value;
use uuid::Uuid;

use crate::error::{AddressError, CoercionError, ConfigurationError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node identifier.
///
/// # Examples
///
/// ```
/// use uabridge_opcua::types::NodeId;
///
/// let numeric = NodeId::numeric(0, 85);
/// let string: NodeId = "ns=2;s=Device001.Tag4711".parse().unwrap();
///
/// assert_eq!(numeric, NodeId::OBJECTS_FOLDER);
/// assert_eq!(string.namespace_index, 2);
/// assert_eq!(string.to_string(), "ns=2;s=Device001.Tag4711");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The identifier within the namespace.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Root folder (i=84).
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);
    /// Objects folder (i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    /// Types folder (i=86).
    pub const TYPES_FOLDER: NodeId = NodeId::numeric(0, 86);
    /// Views folder (i=87).
    pub const VIEWS_FOLDER: NodeId = NodeId::numeric(0, 87);
    /// Server object (i=2253).
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);
    /// Server namespace array variable (i=2255).
    pub const NAMESPACE_ARRAY: NodeId = NodeId::numeric(0, 2255);
    /// HierarchicalReferences reference type (i=33).
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);
    /// Aggregates reference type (i=44).
    pub const AGGREGATES: NodeId = NodeId::numeric(0, 44);
    /// HasProperty reference type (i=46).
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);

    /// Creates a numeric node id.
    pub const fn numeric(namespace_index: u16, id: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(id),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace_index: u16, id: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(id.into()),
        }
    }

    /// Creates a GUID node id.
    pub fn guid(namespace_index: u16, id: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(id),
        }
    }

    /// Creates an opaque node id.
    pub fn opaque(namespace_index: u16, id: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(id),
        }
    }

    /// Creates a node id from a namespace index and a typed identifier.
    pub fn new(namespace_index: u16, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }

    /// Looks up a well-known standard node by its symbolic name.
    ///
    /// Accepted names are `RootFolder`, `ObjectsFolder`, `TypesFolder`,
    /// `ViewsFolder` and `Server`, with or without the `Folder` suffix.
    pub fn well_known(name: &str) -> Option<NodeId> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rootfolder" | "root" => Some(Self::ROOT_FOLDER),
            "objectsfolder" | "objects" => Some(Self::OBJECTS_FOLDER),
            "typesfolder" | "types" => Some(Self::TYPES_FOLDER),
            "viewsfolder" | "views" => Some(Self::VIEWS_FOLDER),
            "server" => Some(Self::SERVER),
            _ => None,
        }
    }

    /// Parses a browse path root: a well-known name or a node id string.
    pub fn parse_root(root: &str) -> Result<NodeId, AddressError> {
        match Self::well_known(root) {
            Some(node) => Ok(node),
            None => root.parse(),
        }
    }

    /// Returns `true` if this node belongs to the standard namespace.
    #[inline]
    pub fn is_standard(&self) -> bool {
        self.namespace_index == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index != 0 {
            write!(f, "ns={};", self.namespace_index)?;
        }
        write!(f, "{}", self.identifier)
    }
}

impl FromStr for NodeId {
    type Err = AddressError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=1001`, `s=MyNode`, ... (namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest.split_once(';').ok_or_else(|| {
                    AddressError::invalid_node_id(s, "Missing identifier after namespace")
                })?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| AddressError::invalid_node_id(s, "Invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = identifier_part
            .parse::<NodeIdentifier>()
            .map_err(|e| match e {
                AddressError::InvalidNodeId { reason, .. } => AddressError::invalid_node_id(s, reason),
                other => other,
            })?;

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier (`i=`).
    Numeric(u32),

    /// String identifier (`s=`).
    String(String),

    /// GUID identifier (`g=`).
    Guid(Uuid),

    /// Opaque byte string identifier (`b=`, base64 in text form).
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "i={}", id),
            Self::String(id) => write!(f, "s={}", id),
            Self::Guid(id) => write!(f, "g={}", id),
            Self::Opaque(id) => write!(f, "b={}", BASE64.encode(id)),
        }
    }
}

impl FromStr for NodeIdentifier {
    type Err = AddressError;

    /// Parses `<type>=<value>` where type is one of `i`, `s`, `g`, `b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("i=") {
            id.parse()
                .map(Self::Numeric)
                .map_err(|_| AddressError::invalid_node_id(s, "Invalid numeric identifier"))
        } else if let Some(id) = s.strip_prefix("s=") {
            Ok(Self::String(id.to_string()))
        } else if let Some(id) = s.strip_prefix("g=") {
            Uuid::parse_str(id)
                .map(Self::Guid)
                .map_err(|e| AddressError::invalid_node_id(s, format!("Invalid GUID: {}", e)))
        } else if let Some(id) = s.strip_prefix("b=") {
            BASE64
                .decode(id)
                .map(Self::Opaque)
                .map_err(|e| AddressError::invalid_node_id(s, format!("Invalid base64: {}", e)))
        } else {
            Err(AddressError::invalid_node_id(
                s,
                "Unknown identifier type. Expected i=, s=, g=, or b=",
            ))
        }
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// OPC UA qualified name (namespace index + name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,

    /// The name string.
    pub name: String,
}

impl QualifiedName {
    /// Creates a new qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }

    /// Creates a qualified name in namespace 0.
    pub fn standard(name: impl Into<String>) -> Self {
        Self::new(0, name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The two most significant bits carry the severity: `00` good, `01`
/// uncertain, `1x` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Uncertain.
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    /// Bad.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// BadServiceUnsupported.
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    /// BadServerNotConnected.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800D_0000);
    /// BadUserAccessDenied.
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: StatusCode = StatusCode(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadAttributeIdInvalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// BadNotWritable.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// BadOutOfRange.
    pub const BAD_OUT_OF_RANGE: StatusCode = StatusCode(0x803C_0000);
    /// BadNotSupported.
    pub const BAD_NOT_SUPPORTED: StatusCode = StatusCode(0x803D_0000);
    /// BadNotFound.
    pub const BAD_NOT_FOUND: StatusCode = StatusCode(0x803E_0000);
    /// BadBrowseNameInvalid.
    pub const BAD_BROWSE_NAME_INVALID: StatusCode = StatusCode(0x8060_0000);
    /// BadNoMatch.
    pub const BAD_NO_MATCH: StatusCode = StatusCode(0x806F_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// BadMethodInvalid.
    pub const BAD_METHOD_INVALID: StatusCode = StatusCode(0x8075_0000);
    /// BadArgumentsMissing.
    pub const BAD_ARGUMENTS_MISSING: StatusCode = StatusCode(0x8076_0000);
    /// BadInvalidArgument.
    pub const BAD_INVALID_ARGUMENT: StatusCode = StatusCode(0x80AB_0000);

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity is uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the severity is bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of the status code.
    ///
    /// Unknown codes fall back to their severity (`Good`, `Uncertain`, `Bad`).
    pub fn name(&self) -> &'static str {
        match self.0 & 0xFFFF_0000 {
            0x0000_0000 => "Good",
            0x4000_0000 => "Uncertain",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x800A_0000 => "BadTimeout",
            0x800B_0000 => "BadServiceUnsupported",
            0x800D_0000 => "BadServerNotConnected",
            0x801F_0000 => "BadUserAccessDenied",
            0x8026_0000 => "BadSessionClosed",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x803B_0000 => "BadNotWritable",
            0x803C_0000 => "BadOutOfRange",
            0x803D_0000 => "BadNotSupported",
            0x803E_0000 => "BadNotFound",
            0x8060_0000 => "BadBrowseNameInvalid",
            0x806F_0000 => "BadNoMatch",
            0x8074_0000 => "BadTypeMismatch",
            0x8075_0000 => "BadMethodInvalid",
            0x8076_0000 => "BadArgumentsMissing",
            0x80AB_0000 => "BadInvalidArgument",
            _ if self.is_good() => "Good",
            _ if self.is_uncertain() => "Uncertain",
            _ => "Bad",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if matches!(name, "Good" | "Uncertain" | "Bad") && self.0 & 0x3FFF_0000 != 0 {
            write!(f, "{} (0x{:08X})", name, self.0)
        } else {
            write!(f, "{}", name)
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        StatusCode(code)
    }
}

// =============================================================================
// DataType
// =============================================================================

/// OPC UA built-in data types used to type values for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// Boolean value.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 double.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// GUID.
    Guid,
    /// Byte string.
    ByteString,
    /// Any value; passed through untyped.
    Variant,
}

impl DataType {
    /// Returns the OPC UA type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
            Self::Variant => "Variant",
        }
    }

    /// Returns the numeric id of the data type node in namespace 0.
    pub const fn type_id(&self) -> u32 {
        match self {
            Self::Boolean => 1,
            Self::SByte => 2,
            Self::Byte => 3,
            Self::Int16 => 4,
            Self::UInt16 => 5,
            Self::Int32 => 6,
            Self::UInt32 => 7,
            Self::Int64 => 8,
            Self::UInt64 => 9,
            Self::Float => 10,
            Self::Double => 11,
            Self::String => 12,
            Self::DateTime => 13,
            Self::Guid => 14,
            Self::ByteString => 15,
            Self::Variant => 24,
        }
    }

    /// Types an application value for the wire.
    ///
    /// Numbers convert between widths when the value fits exactly; numeric
    /// strings are parsed. Arrays are converted element-wise. `Variant` passes
    /// any value through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use uabridge_core::Value;
    /// use uabridge_opcua::types::DataType;
    ///
    /// assert_eq!(DataType::Double.coerce(Value::Int64(40)).unwrap(), Value::Double(40.0));
    /// assert!(DataType::Byte.coerce(Value::Int64(300)).is_err());
    /// ```
    pub fn coerce(&self, value: Value) -> Result<Value, CoercionError> {
        if let Value::Array(items) = value {
            if *self == Self::ByteString {
                return bytes_from_array(&items).map(Value::ByteString);
            }
            return items
                .into_iter()
                .map(|item| self.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array);
        }

        match self {
            Self::Variant => Ok(value),
            Self::Boolean => match &value {
                Value::Boolean(_) => Ok(value),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Boolean(false)),
                v if v.is_numeric() => match v.as_i64() {
                    Some(0) => Ok(Value::Boolean(false)),
                    Some(1) => Ok(Value::Boolean(true)),
                    _ => Err(self.mismatch(v)),
                },
                v => Err(self.mismatch(v)),
            },
            Self::SByte => self.integer(&value).and_then(|v| fit(v, Value::SByte, self)),
            Self::Byte => self.integer(&value).and_then(|v| fit(v, Value::Byte, self)),
            Self::Int16 => self.integer(&value).and_then(|v| fit(v, Value::Int16, self)),
            Self::UInt16 => self.integer(&value).and_then(|v| fit(v, Value::UInt16, self)),
            Self::Int32 => self.integer(&value).and_then(|v| fit(v, Value::Int32, self)),
            Self::UInt32 => self.integer(&value).and_then(|v| fit(v, Value::UInt32, self)),
            Self::Int64 => self.integer(&value).and_then(|v| fit(v, Value::Int64, self)),
            Self::UInt64 => match value {
                Value::UInt64(v) => Ok(Value::UInt64(v)),
                other => self.integer(&other).and_then(|v| fit(v, Value::UInt64, self)),
            },
            Self::Float => self.float(&value).and_then(|v| {
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    Err(CoercionError::overflow(v, self.name()))
                } else {
                    Ok(Value::Float(v as f32))
                }
            }),
            Self::Double => self.float(&value).map(Value::Double),
            Self::String => match value {
                Value::String(_) => Ok(value),
                Value::Boolean(_) => Ok(Value::String(value.to_string())),
                v if v.is_numeric() => Ok(Value::String(v.to_string())),
                v => Err(self.mismatch(&v)),
            },
            Self::DateTime => match value {
                Value::DateTime(_) => Ok(value),
                Value::String(s) => DateTime::parse_from_rfc3339(&s)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| CoercionError::type_mismatch(self.name(), "String")),
                v => Err(self.mismatch(&v)),
            },
            Self::Guid => match value {
                Value::Guid(_) => Ok(value),
                Value::String(s) => Uuid::parse_str(&s)
                    .map(Value::Guid)
                    .map_err(|_| CoercionError::type_mismatch(self.name(), "String")),
                v => Err(self.mismatch(&v)),
            },
            Self::ByteString => match value {
                Value::ByteString(_) => Ok(value),
                Value::String(s) => BASE64
                    .decode(s.as_bytes())
                    .map(Value::ByteString)
                    .map_err(|_| CoercionError::type_mismatch(self.name(), "String")),
                v => Err(self.mismatch(&v)),
            },
        }
    }

    fn mismatch(&self, value: &Value) -> CoercionError {
        CoercionError::type_mismatch(self.name(), value.type_name())
    }

    fn integer(&self, value: &Value) -> Result<i128, CoercionError> {
        match value {
            Value::UInt64(v) => Ok(i128::from(*v)),
            Value::String(s) => s
                .trim()
                .parse::<i128>()
                .map_err(|_| CoercionError::type_mismatch(self.name(), "String")),
            v if v.is_numeric() => v
                .as_i64()
                .map(i128::from)
                .ok_or_else(|| CoercionError::type_mismatch(self.name(), v.type_name())),
            v => Err(self.mismatch(v)),
        }
    }

    fn float(&self, value: &Value) -> Result<f64, CoercionError> {
        match value {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| CoercionError::type_mismatch(self.name(), "String")),
            v => v.as_f64().ok_or_else(|| self.mismatch(v)),
        }
    }
}

fn fit<T: TryFrom<i128>>(
    value: i128,
    wrap: impl FnOnce(T) -> Value,
    data_type: &DataType,
) -> Result<Value, CoercionError> {
    T::try_from(value)
        .map(wrap)
        .map_err(|_| CoercionError::overflow(value, data_type.name()))
}

fn bytes_from_array(items: &[Value]) -> Result<Vec<u8>, CoercionError> {
    items
        .iter()
        .map(|item| {
            item.as_i64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| CoercionError::type_mismatch("Byte", item.type_name()))
        })
        .collect()
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DataType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "sbyte" | "int8" | "i8" => Ok(Self::SByte),
            "byte" | "uint8" | "u8" => Ok(Self::Byte),
            "int16" | "i16" | "short" => Ok(Self::Int16),
            "uint16" | "u16" | "ushort" => Ok(Self::UInt16),
            "int32" | "i32" | "int" => Ok(Self::Int32),
            "uint32" | "u32" | "uint" => Ok(Self::UInt32),
            "int64" | "i64" | "long" => Ok(Self::Int64),
            "uint64" | "u64" | "ulong" => Ok(Self::UInt64),
            "float" | "f32" | "single" => Ok(Self::Float),
            "double" | "f64" => Ok(Self::Double),
            "string" | "str" => Ok(Self::String),
            "datetime" | "date" | "time" => Ok(Self::DateTime),
            "guid" | "uuid" => Ok(Self::Guid),
            "bytestring" | "bytes" | "binary" => Ok(Self::ByteString),
            "variant" | "any" => Ok(Self::Variant),
            _ => Err(ConfigurationError::UnknownDataType { name: s.to_string() }),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.name().to_string()
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attribute IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Write mask attribute.
    WriteMask,
    /// User write mask attribute.
    UserWriteMask,
    /// Is abstract attribute.
    IsAbstract,
    /// Symmetric attribute.
    Symmetric,
    /// Inverse name attribute.
    InverseName,
    /// Contains no loops attribute.
    ContainsNoLoops,
    /// Event notifier attribute.
    EventNotifier,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
    /// Value rank attribute.
    ValueRank,
    /// Array dimensions attribute.
    ArrayDimensions,
    /// Access level attribute.
    AccessLevel,
    /// User access level attribute.
    UserAccessLevel,
    /// Minimum sampling interval attribute.
    MinimumSamplingInterval,
    /// Historizing attribute.
    Historizing,
    /// Executable attribute.
    Executable,
    /// User executable attribute.
    UserExecutable,
}

impl AttributeId {
    const ALL: [AttributeId; 22] = [
        Self::NodeId,
        Self::NodeClass,
        Self::BrowseName,
        Self::DisplayName,
        Self::Description,
        Self::WriteMask,
        Self::UserWriteMask,
        Self::IsAbstract,
        Self::Symmetric,
        Self::InverseName,
        Self::ContainsNoLoops,
        Self::EventNotifier,
        Self::Value,
        Self::DataType,
        Self::ValueRank,
        Self::ArrayDimensions,
        Self::AccessLevel,
        Self::UserAccessLevel,
        Self::MinimumSamplingInterval,
        Self::Historizing,
        Self::Executable,
        Self::UserExecutable,
    ];

    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        *self as u32 + 1
    }

    /// Creates from the OPC UA numeric value.
    pub fn from_value(value: u32) -> Option<Self> {
        value
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i as usize).copied())
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }
}

// =============================================================================
// Session Identity and Security
// =============================================================================

/// How the client authenticates when creating a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous authentication.
    #[default]
    Anonymous,

    /// Username and password authentication.
    #[serde(rename = "username")]
    UserName {
        /// The username.
        user: String,
        /// The password.
        password: String,
    },
}

impl UserIdentity {
    /// Creates a username/password identity.
    pub fn user_name(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserName {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Returns `true` if this is anonymous authentication.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { user, .. } => f
                .debug_struct("UserName")
                .field("user", user)
                .field("password", &"***")
                .finish(),
        }
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { user, .. } => write!(f, "UserName({})", user),
        }
    }
}

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }
}

// =============================================================================
// ConnectionOptions
// =============================================================================

/// Client-side connection options passed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Application name announced to the server.
    pub application_name: String,

    /// Application URI announced to the server.
    pub application_uri: String,

    /// Session name.
    pub session_name: String,

    /// Requested session timeout.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Message security mode.
    pub security_mode: SecurityMode,

    /// Security policy.
    pub security_policy: SecurityPolicy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            application_name: "uabridge".to_string(),
            application_uri: "urn:uabridge:client".to_string(),
            session_name: "uabridge-session".to_string(),
            session_timeout: Duration::from_secs(60),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
        }
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        let node: NodeId = "ns=2;i=1001".parse().unwrap();
        assert_eq!(node, NodeId::numeric(2, 1001));

        let node: NodeId = "s=Device001.Tag4711".parse().unwrap();
        assert_eq!(node, NodeId::string(0, "Device001.Tag4711"));

        let node: NodeId = "g=01cb879b-ddd7-4edc-909c-37f23ff9e6c3".parse().unwrap();
        assert!(matches!(node.identifier, NodeIdentifier::Guid(_)));

        let node: NodeId = "ns=1;b=/6UANw==".parse().unwrap();
        assert_eq!(node.identifier, NodeIdentifier::Opaque(vec![0xFF, 0xA5, 0x00, 0x37]));
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=1".parse::<NodeId>().is_err());
        assert!("q=1".parse::<NodeId>().is_err());
        assert!("i=abc".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_display_roundtrip() {
        for text in ["i=85", "ns=3;s=Pump.Speed", "ns=1;b=AQI="] {
            let node: NodeId = text.parse().unwrap();
            assert_eq!(node.to_string(), text);
        }
    }

    #[test]
    fn test_parse_root() {
        assert_eq!(NodeId::parse_root("RootFolder").unwrap(), NodeId::ROOT_FOLDER);
        assert_eq!(NodeId::parse_root("ObjectsFolder").unwrap(), NodeId::OBJECTS_FOLDER);
        assert_eq!(NodeId::parse_root("i=2253").unwrap(), NodeId::SERVER);
        assert!(NodeId::parse_root("NoSuchFolder").is_err());
    }

    #[test]
    fn test_status_code() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN.is_uncertain());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x80AA_0000).to_string(), "Bad (0x80AA0000)");
        assert_eq!(StatusCode::BAD_NO_MATCH.to_string(), "BadNoMatch");
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("Double".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!("bool".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!("Quaternion".parse::<DataType>().is_err());

        let parsed: DataType = serde_json::from_str(r#""UInt32""#).unwrap();
        assert_eq!(parsed, DataType::UInt32);
        assert_eq!(serde_json::to_string(&DataType::Int16).unwrap(), r#""Int16""#);
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(DataType::Int32.coerce(Value::Int64(42)).unwrap(), Value::Int32(42));
        assert_eq!(DataType::UInt16.coerce(Value::Double(7.0)).unwrap(), Value::UInt16(7));
        assert_eq!(
            DataType::Int64.coerce(Value::String("-12".into())).unwrap(),
            Value::Int64(-12)
        );
        assert!(matches!(
            DataType::Byte.coerce(Value::Int32(-1)),
            Err(CoercionError::Overflow { .. })
        ));
        assert!(matches!(
            DataType::Int32.coerce(Value::Double(1.5)),
            Err(CoercionError::TypeMismatch { .. })
        ));
        assert_eq!(
            DataType::UInt64.coerce(Value::UInt64(u64::MAX)).unwrap(),
            Value::UInt64(u64::MAX)
        );
    }

    #[test]
    fn test_coerce_other_types() {
        assert_eq!(DataType::Boolean.coerce(Value::Int64(1)).unwrap(), Value::Boolean(true));
        assert!(DataType::Boolean.coerce(Value::Int64(2)).is_err());
        assert_eq!(
            DataType::String.coerce(Value::Double(2.5)).unwrap(),
            Value::String("2.5".into())
        );
        assert!(matches!(
            DataType::DateTime.coerce(Value::String("2024-01-02T03:04:05Z".into())).unwrap(),
            Value::DateTime(_)
        ));
        assert_eq!(
            DataType::ByteString
                .coerce(Value::Array(vec![Value::Int64(1), Value::Int64(2)]))
                .unwrap(),
            Value::ByteString(vec![1, 2])
        );
        assert_eq!(
            DataType::Double
                .coerce(Value::Array(vec![Value::Int64(1), Value::Int64(2)]))
                .unwrap(),
            Value::Array(vec![Value::Double(1.0), Value::Double(2.0)])
        );
        assert_eq!(DataType::Variant.coerce(Value::Null).unwrap(), Value::Null);
        assert!(DataType::Int32.coerce(Value::Null).is_err());
    }

    #[test]
    fn test_attribute_id_values() {
        assert_eq!(AttributeId::Value.value(), 13);
        assert_eq!(AttributeId::from_value(13), Some(AttributeId::Value));
        assert_eq!(AttributeId::from_value(4), Some(AttributeId::DisplayName));
        assert_eq!(AttributeId::from_value(0), None);
        assert_eq!(AttributeId::from_value(23), None);
    }

    #[test]
    fn test_user_identity_debug_hides_password() {
        let identity = UserIdentity::user_name("operator", "secret");
        let debug = format!("{:?}", identity);
        assert!(debug.contains("operator"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_connection_options_serde() {
        let yaml = "session_timeout: 30s\nsecurity_mode: sign\n";
        let options: ConnectionOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.session_timeout, Duration::from_secs(30));
        assert_eq!(options.security_mode, SecurityMode::Sign);
        assert_eq!(options.application_name, "uabridge");
    }
}
