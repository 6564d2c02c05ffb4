// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node resolution.
//!
//! Turns a [`NodeAddress`] into a [`NodeId`] of the current session. Namespace
//! indices are looked up in the session's [`NamespaceTable`] on every call and
//! never cached, since the server may assign them differently on the next
//! session.

use crate::client::{NamespaceTable, OpcUaTransport};
use crate::data_source::NodeAddress;
use crate::error::{AddressError, OpcUaResult};
use crate::relative_path::{substitute_namespace_uris, RelativePath};
use crate::types::{NodeId, NodeIdentifier};

/// Resolves an address against the live session.
pub async fn resolve<T>(transport: &T, namespaces: &NamespaceTable, address: &NodeAddress) -> OpcUaResult<NodeId>
where
    T: OpcUaTransport + ?Sized,
{
    match address {
        NodeAddress::Node {
            namespace_uri,
            identifier_with_type,
        } => Ok(resolve_node(namespaces, namespace_uri.as_deref(), identifier_with_type)?),
        NodeAddress::BrowsePath {
            root_node,
            relative_path,
        } => resolve_browse_path(transport, namespaces, root_node, relative_path).await,
    }
}

/// Builds the node id of an explicit node address.
///
/// An absent namespace URI selects the standard namespace.
pub fn resolve_node(
    namespaces: &NamespaceTable,
    namespace_uri: Option<&str>,
    identifier_with_type: &str,
) -> Result<NodeId, AddressError> {
    let namespace_index = match namespace_uri {
        None => 0,
        Some(uri) => namespaces
            .index_of(uri)
            .ok_or_else(|| AddressError::unknown_namespace(uri, identifier_with_type))?,
    };
    let identifier: NodeIdentifier = identifier_with_type.parse()?;
    Ok(NodeId::new(namespace_index, identifier))
}

async fn resolve_browse_path<T>(
    transport: &T,
    namespaces: &NamespaceTable,
    root_node: &str,
    relative_path: &str,
) -> OpcUaResult<NodeId>
where
    T: OpcUaTransport + ?Sized,
{
    let item = format!("{} {}", root_node, relative_path);
    let substituted = substitute_namespace_uris(relative_path, namespaces, &item)?;
    let path: RelativePath = substituted.parse()?;
    let root = NodeId::parse_root(root_node)?;

    let result = transport.translate_browse_path(&root, &path).await?;
    if !result.status.is_good() {
        return Err(AddressError::path_not_found(root_node, relative_path, Some(result.status)).into());
    }
    match result.targets.into_iter().next() {
        Some(node) => {
            tracing::trace!(path = %item, node = %node, "Browse path resolved");
            Ok(node)
        }
        None => Err(AddressError::path_not_found(root_node, relative_path, None).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryTransport;
    use crate::error::OpcUaError;
    use crate::types::{ConnectionOptions, UserIdentity};
    use uabridge_core::Value;

    async fn server() -> (MemoryTransport, NamespaceTable, NodeId) {
        let server = MemoryTransport::new();
        let ns = server.add_namespace("urn:plant");
        let plc = server.add_object(&NodeId::OBJECTS_FOLDER, NodeId::string(ns, "PLC2"), "PLC2");
        let temp = server.add_variable(&plc, NodeId::string(ns, "PLC2.Temp"), "Temp", Value::Double(20.0));
        server
            .connect("opc.tcp://memory", &ConnectionOptions::default())
            .await
            .unwrap();
        server.create_session(&UserIdentity::Anonymous).await.unwrap();
        let namespaces = NamespaceTable::new(server.read_namespace_array().await.unwrap());
        (server, namespaces, temp)
    }

    #[tokio::test]
    async fn test_resolve_node_by_namespace_uri() {
        let (server, namespaces, temp) = server().await;
        let address = NodeAddress::node(Some("urn:plant".into()), "s=PLC2.Temp");
        assert_eq!(resolve(&server, &namespaces, &address).await.unwrap(), temp);

        let standard = NodeAddress::node(None, "i=2255");
        assert_eq!(
            resolve(&server, &namespaces, &standard).await.unwrap(),
            NodeId::NAMESPACE_ARRAY
        );
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let (server, namespaces, _) = server().await;
        let address = NodeAddress::node(Some("urn:nowhere".into()), "s=X");
        let err = resolve(&server, &namespaces, &address).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Ignoring item s=X with undefined OPC UA namespace URI urn:nowhere"
        );

        let path = NodeAddress::browse_path("ObjectsFolder", "/[urn:nowhere]:PLC2");
        let err = resolve(&server, &namespaces, &path).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Address(AddressError::UnknownNamespace { .. })));
        assert!(err.to_string().contains("ObjectsFolder /[urn:nowhere]:PLC2"));
    }

    #[tokio::test]
    async fn test_resolve_browse_path() {
        let (server, namespaces, temp) = server().await;
        let address = NodeAddress::browse_path("ObjectsFolder", "/[urn:plant]:PLC2.[urn:plant]:Temp");
        assert_eq!(resolve(&server, &namespaces, &address).await.unwrap(), temp);
    }

    #[tokio::test]
    async fn test_path_not_found() {
        let (server, namespaces, _) = server().await;
        let address = NodeAddress::browse_path("ObjectsFolder", "/[urn:plant]:PLC9");
        let err = resolve(&server, &namespaces, &address).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "BrowsePath invalid: BadNoMatch ObjectsFolder /[urn:plant]:PLC9"
        );
    }
}
