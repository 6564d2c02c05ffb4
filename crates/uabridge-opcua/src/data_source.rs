// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Data source descriptors.
//!
//! A [`DataSource`] is an application-named handle for one item of the
//! server's address space. Its [`NodeAddress`] is either an explicit node
//! (namespace URI plus typed identifier) or a browse path from a root node.
//! Both forms are resolved against the session at the time of each operation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coercion::Coercion;
use crate::error::ConfigurationError;
use crate::relative_path::RelativePath;
use crate::types::{DataType, NodeId, NodeIdentifier};

// =============================================================================
// NodeAddress
// =============================================================================

/// Where a data source lives in the address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAddress {
    /// An explicit node.
    Node {
        /// Namespace URI; the standard namespace (index 0) when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace_uri: Option<String>,
        /// Identifier with type prefix, e.g. `s=Device001.Tag4711` or `i=2258`.
        identifier_with_type: String,
    },

    /// A browse path.
    BrowsePath {
        /// Root node: a well-known name such as `ObjectsFolder`, or a node id.
        root_node: String,
        /// Relative path; may contain `[namespace-uri]:` placeholders.
        relative_path: String,
    },
}

impl NodeAddress {
    /// Creates an explicit node address.
    pub fn node(namespace_uri: Option<String>, identifier_with_type: impl Into<String>) -> Self {
        Self::Node {
            namespace_uri,
            identifier_with_type: identifier_with_type.into(),
        }
    }

    /// Creates a browse path address.
    pub fn browse_path(root_node: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self::BrowsePath {
            root_node: root_node.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Builds an address from the two optional configuration forms.
    ///
    /// Exactly one form must be present.
    pub fn from_parts(
        identifier: &str,
        node: Option<(Option<String>, String)>,
        browse_path: Option<(String, String)>,
    ) -> Result<Self, ConfigurationError> {
        match (node, browse_path) {
            (Some((namespace_uri, identifier_with_type)), None) => {
                Ok(Self::node(namespace_uri, identifier_with_type))
            }
            (None, Some((root_node, relative_path))) => {
                Ok(Self::browse_path(root_node, relative_path))
            }
            (None, None) => Err(ConfigurationError::invalid_address(
                identifier,
                "either a node id or a browse path is required",
            )),
            (Some(_), Some(_)) => Err(ConfigurationError::invalid_address(
                identifier,
                "a node id and a browse path are mutually exclusive",
            )),
        }
    }

    /// Checks the syntax of the address without a session.
    ///
    /// Namespace URI placeholders in a relative path are checked as if they
    /// resolved to index 0.
    pub fn validate(&self, identifier: &str) -> Result<(), ConfigurationError> {
        match self {
            Self::Node {
                identifier_with_type,
                ..
            } => identifier_with_type
                .parse::<NodeIdentifier>()
                .map(|_| ())
                .map_err(|e| ConfigurationError::invalid_address(identifier, e.to_string())),
            Self::BrowsePath {
                root_node,
                relative_path,
            } => {
                NodeId::parse_root(root_node)
                    .map_err(|e| ConfigurationError::invalid_address(identifier, e.to_string()))?;
                placeholder_free(relative_path)
                    .parse::<RelativePath>()
                    .map(|_| ())
                    .map_err(|e| ConfigurationError::invalid_address(identifier, e.to_string()))
            }
        }
    }
}

fn placeholder_free(relative_path: &str) -> String {
    let mut output = String::with_capacity(relative_path.len());
    let mut rest = relative_path;
    while let Some(start) = rest.find('[') {
        match rest[start..].find(']') {
            Some(end) => {
                output.push_str(&rest[..start]);
                output.push('0');
                rest = &rest[start + end + 1..];
            }
            None => break,
        }
    }
    output.push_str(rest);
    output
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node {
                namespace_uri: Some(uri),
                identifier_with_type,
            } => write!(f, "[{}]{}", uri, identifier_with_type),
            Self::Node {
                namespace_uri: None,
                identifier_with_type,
            } => write!(f, "{}", identifier_with_type),
            Self::BrowsePath {
                root_node,
                relative_path,
            } => write!(f, "{} {}", root_node, relative_path),
        }
    }
}

// =============================================================================
// DataSource
// =============================================================================

/// Descriptor of one addressable field item.
///
/// Data sources are immutable once registered with a connector.
///
/// # Examples
///
/// ```
/// use uabridge_opcua::data_source::DataSource;
/// use uabridge_opcua::types::DataType;
///
/// let temperature = DataSource::browse_path("ObjectsFolder", "/[urn:plant]:PLC2/[urn:plant]:Temperature")
///     .monitored(Some(500.0));
///
/// let setpoint = DataSource::node(Some("urn:plant".into()), "s=PLC2.Setpoint")
///     .with_data_type(DataType::Double);
///
/// assert!(temperature.should_monitor);
/// assert!(!setpoint.should_monitor);
/// ```
#[derive(Debug, Clone)]
pub struct DataSource {
    /// Address of the item.
    pub address: NodeAddress,
    /// Create a monitored item for this source after session creation.
    pub should_monitor: bool,
    /// Requested sampling interval in milliseconds; only used when monitored.
    pub sampling_interval: Option<f64>,
    /// Optional wire/application transform.
    pub coercion: Option<Coercion>,
    /// Wire data type; required for writes and call arguments.
    pub data_type: Option<DataType>,
}

impl DataSource {
    /// Creates a data source for an address.
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            should_monitor: false,
            sampling_interval: None,
            coercion: None,
            data_type: None,
        }
    }

    /// Creates an explicit node data source.
    pub fn node(namespace_uri: Option<String>, identifier_with_type: impl Into<String>) -> Self {
        Self::new(NodeAddress::node(namespace_uri, identifier_with_type))
    }

    /// Creates a browse path data source.
    pub fn browse_path(root_node: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self::new(NodeAddress::browse_path(root_node, relative_path))
    }

    /// Requests monitoring with an optional sampling interval.
    pub fn monitored(mut self, sampling_interval: Option<f64>) -> Self {
        self.should_monitor = true;
        self.sampling_interval = sampling_interval;
        self
    }

    /// Attaches a coercion.
    pub fn with_coercion(mut self, coercion: Coercion) -> Self {
        self.coercion = Some(coercion);
        self
    }

    /// Declares the wire data type.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_requires_exactly_one_form() {
        let node = Some((None, "i=2258".to_string()));
        let path = Some(("ObjectsFolder".to_string(), "/2:PLC".to_string()));

        assert!(NodeAddress::from_parts("a", node.clone(), None).is_ok());
        assert!(NodeAddress::from_parts("b", None, path.clone()).is_ok());

        let neither = NodeAddress::from_parts("c", None, None).unwrap_err();
        assert!(neither.to_string().contains("'c'"));
        assert!(NodeAddress::from_parts("d", node, path).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(NodeAddress::node(None, "s=Device.Tag").validate("x").is_ok());
        assert!(NodeAddress::node(None, "ns=2;s=Device.Tag").validate("x").is_err());
        assert!(NodeAddress::node(None, "Tag").validate("x").is_err());

        let path = NodeAddress::browse_path("ObjectsFolder", "/[urn:plant]:PLC2.[urn:plant]:Temp");
        assert!(path.validate("x").is_ok());
        assert!(NodeAddress::browse_path("Nowhere", "/A").validate("x").is_err());
        assert!(NodeAddress::browse_path("RootFolder", "A/B").validate("x").is_err());
    }

    #[test]
    fn test_display() {
        let node = DataSource::node(Some("urn:plant".into()), "s=Temp");
        assert_eq!(node.to_string(), "[urn:plant]s=Temp");
        let path = DataSource::browse_path("ObjectsFolder", "/2:PLC");
        assert_eq!(path.to_string(), "ObjectsFolder /2:PLC");
    }

    #[test]
    fn test_builder() {
        let source = DataSource::node(None, "i=2258")
            .monitored(None)
            .with_data_type(DataType::DateTime)
            .with_coercion(Coercion::linear(1.0, 0.0));
        assert!(source.should_monitor);
        assert_eq!(source.sampling_interval, None);
        assert_eq!(source.data_type, Some(DataType::DateTime));
        assert!(source.coercion.is_some());
    }
}
