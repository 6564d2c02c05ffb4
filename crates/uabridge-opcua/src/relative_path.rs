// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Relative path parsing for browse path addressing.
//!
//! A relative path is the text form of a sequence of hops from a root node:
//!
//! ```text
//! /2:Devices/2:PLC2.2:Temperature<!HasComponent>2:Plant
//! │          │      │             │
//! │          │      │             └─ explicit reference type, inverse
//! │          │      └─ aggregates (HasComponent, HasProperty, ...)
//! │          └─ hierarchical references
//! └─ hierarchical references
//! ```
//!
//! Reserved characters (`/ . < > : # ! &`) inside names are escaped with `&`.
//!
//! Configured paths may carry namespace URIs instead of indices,
//! `/[urn:plant]:Devices`; [`substitute_namespace_uris`] rewrites them against
//! the namespace table of the current session before parsing.

use std::fmt;
use std::str::FromStr;

use crate::client::NamespaceTable;
use crate::error::AddressError;
use crate::types::{NodeId, QualifiedName};

/// Standard reference types that may be named in a relative path.
const STANDARD_REFERENCE_TYPES: &[(&str, u32)] = &[
    ("References", 31),
    ("NonHierarchicalReferences", 32),
    ("HierarchicalReferences", 33),
    ("HasChild", 34),
    ("Organizes", 35),
    ("HasEventSource", 36),
    ("HasModellingRule", 37),
    ("HasEncoding", 38),
    ("HasDescription", 39),
    ("HasTypeDefinition", 40),
    ("GeneratesEvent", 41),
    ("Aggregates", 44),
    ("HasSubtype", 45),
    ("HasProperty", 46),
    ("HasComponent", 47),
    ("HasNotifier", 48),
    ("HasOrderedComponent", 49),
];

/// Supertype of each standard reference type.
const REFERENCE_TYPE_PARENTS: &[(u32, u32)] = &[
    (32, 31),
    (33, 31),
    (34, 33),
    (35, 33),
    (36, 33),
    (37, 32),
    (38, 32),
    (39, 32),
    (40, 32),
    (41, 32),
    (44, 34),
    (45, 34),
    (46, 44),
    (47, 44),
    (48, 36),
    (49, 47),
];

/// Returns `true` if `reference_type` equals `ancestor` or derives from it.
///
/// Only the standard reference type hierarchy of namespace 0 is known.
pub fn is_reference_subtype(reference_type: &NodeId, ancestor: &NodeId) -> bool {
    if reference_type == ancestor {
        return true;
    }
    let (Some(mut current), Some(target)) = (numeric_ns0(reference_type), numeric_ns0(ancestor))
    else {
        return false;
    };
    while let Some(&(_, parent)) = REFERENCE_TYPE_PARENTS.iter().find(|(id, _)| *id == current) {
        if parent == target {
            return true;
        }
        current = parent;
    }
    false
}

fn numeric_ns0(node: &NodeId) -> Option<u32> {
    match node.identifier {
        crate::types::NodeIdentifier::Numeric(id) if node.namespace_index == 0 => Some(id),
        _ => None,
    }
}

fn reference_type_name(node: &NodeId) -> Option<&'static str> {
    let id = numeric_ns0(node)?;
    STANDARD_REFERENCE_TYPES
        .iter()
        .find(|(_, type_id)| *type_id == id)
        .map(|(name, _)| *name)
}

// =============================================================================
// RelativePathElement
// =============================================================================

/// One hop of a relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePathElement {
    /// Reference type to follow.
    pub reference_type: NodeId,
    /// Follow the reference backwards.
    pub is_inverse: bool,
    /// Also follow subtypes of the reference type.
    pub include_subtypes: bool,
    /// Browse name of the target node.
    pub target_name: QualifiedName,
}

impl RelativePathElement {
    /// A `/name` hop.
    pub fn hierarchical(target_name: QualifiedName) -> Self {
        Self {
            reference_type: NodeId::HIERARCHICAL_REFERENCES,
            is_inverse: false,
            include_subtypes: true,
            target_name,
        }
    }

    /// A `.name` hop.
    pub fn aggregate(target_name: QualifiedName) -> Self {
        Self {
            reference_type: NodeId::AGGREGATES,
            is_inverse: false,
            include_subtypes: true,
            target_name,
        }
    }
}

impl fmt::Display for RelativePathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = !self.is_inverse && self.include_subtypes;
        if plain && self.reference_type == NodeId::HIERARCHICAL_REFERENCES {
            f.write_str("/")?;
        } else if plain && self.reference_type == NodeId::AGGREGATES {
            f.write_str(".")?;
        } else {
            f.write_str("<")?;
            if !self.include_subtypes {
                f.write_str("#")?;
            }
            if self.is_inverse {
                f.write_str("!")?;
            }
            match (reference_type_name(&self.reference_type), &self.reference_type.identifier) {
                (Some(name), _) => f.write_str(name)?,
                (None, crate::types::NodeIdentifier::String(name)) => {
                    write!(f, "{}:{}", self.reference_type.namespace_index, escape(name))?
                }
                (None, _) => write!(f, "{}", self.reference_type)?,
            }
            f.write_str(">")?;
        }
        if self.target_name.namespace_index != 0 {
            write!(f, "{}:", self.target_name.namespace_index)?;
        }
        f.write_str(&escape(&self.target_name.name))
    }
}

// =============================================================================
// RelativePath
// =============================================================================

/// A parsed relative path.
///
/// # Examples
///
/// ```
/// use uabridge_opcua::relative_path::RelativePath;
///
/// let path: RelativePath = "/Objects/2:Devices/2:PLC2.2:Temperature".parse().unwrap();
/// assert_eq!(path.elements.len(), 4);
/// assert_eq!(path.elements[3].target_name.name, "Temperature");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RelativePath {
    /// The hops, in order.
    pub elements: Vec<RelativePathElement>,
}

impl RelativePath {
    /// Creates a path from elements.
    pub fn new(elements: Vec<RelativePathElement>) -> Self {
        Self { elements }
    }

    /// Returns `true` for a path without hops.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}

impl FromStr for RelativePath {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s).parse()
    }
}

const RESERVED: &[char] = &['/', '.', '<', '>', ':', '#', '!', '&'];

fn escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if RESERVED.contains(&c) {
            escaped.push('&');
        }
        escaped.push(c);
    }
    escaped
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> AddressError {
        AddressError::invalid_path(self.input, reason)
    }

    fn parse(mut self) -> Result<RelativePath, AddressError> {
        let mut elements = Vec::new();

        while let Some(c) = self.chars.next() {
            let mut element = match c {
                '/' => RelativePathElement::hierarchical(QualifiedName::default()),
                '.' => RelativePathElement::aggregate(QualifiedName::default()),
                '<' => self.reference_type()?,
                other => {
                    return Err(self.error(format!(
                        "expected '/', '.' or '<' but found '{}'",
                        other
                    )))
                }
            };
            element.target_name = self.qualified_name()?;
            if element.target_name.name.is_empty() && self.chars.peek().is_some() {
                return Err(self.error("empty target name"));
            }
            elements.push(element);
        }

        Ok(RelativePath { elements })
    }

    fn reference_type(&mut self) -> Result<RelativePathElement, AddressError> {
        let mut include_subtypes = true;
        let mut is_inverse = false;
        loop {
            match self.chars.peek() {
                Some('#') => include_subtypes = false,
                Some('!') => is_inverse = true,
                _ => break,
            }
            self.chars.next();
        }

        let name = self.token(&['>'])?;
        match self.chars.next() {
            Some('>') => {}
            _ => return Err(self.error("unterminated reference type")),
        }

        let reference_type = if name.namespace_index == 0 {
            STANDARD_REFERENCE_TYPES
                .iter()
                .find(|(type_name, _)| *type_name == name.name)
                .map(|(_, id)| NodeId::numeric(0, *id))
                .ok_or_else(|| self.error(format!("unknown reference type '{}'", name.name)))?
        } else {
            NodeId::string(name.namespace_index, name.name)
        };

        Ok(RelativePathElement {
            reference_type,
            is_inverse,
            include_subtypes,
            target_name: QualifiedName::default(),
        })
    }

    fn qualified_name(&mut self) -> Result<QualifiedName, AddressError> {
        self.token(&['/', '.', '<'])
    }

    /// Reads `[ns:]name` up to an unescaped terminator.
    fn token(&mut self, terminators: &[char]) -> Result<QualifiedName, AddressError> {
        let mut text = String::new();
        let mut namespace_index = None;

        while let Some(&c) = self.chars.peek() {
            if terminators.contains(&c) {
                break;
            }
            self.chars.next();
            match c {
                '&' => match self.chars.next() {
                    Some(escaped) => text.push(escaped),
                    None => return Err(self.error("dangling escape character")),
                },
                ':' if namespace_index.is_none() => {
                    let index = text
                        .parse::<u16>()
                        .map_err(|_| self.error(format!("invalid namespace index '{}'", text)))?;
                    namespace_index = Some(index);
                    text.clear();
                }
                '>' | '#' | '!' | ':' => {
                    return Err(self.error(format!("unescaped reserved character '{}'", c)))
                }
                other => text.push(other),
            }
        }

        Ok(QualifiedName::new(namespace_index.unwrap_or(0), text))
    }
}

// =============================================================================
// Namespace URI substitution
// =============================================================================

/// Replaces every `[uri]` placeholder by the session's index for `uri`.
///
/// `item` names the addressed item in the error raised for unknown URIs.
pub fn substitute_namespace_uris(
    relative_path: &str,
    namespaces: &NamespaceTable,
    item: &str,
) -> Result<String, AddressError> {
    let mut output = String::with_capacity(relative_path.len());
    let mut rest = relative_path;

    while let Some(start) = rest.find('[') {
        let Some(len) = rest[start + 1..].find(']') else {
            break;
        };
        let uri = &rest[start + 1..start + 1 + len];
        let index = namespaces
            .index_of(uri)
            .ok_or_else(|| AddressError::unknown_namespace(uri, item))?;

        output.push_str(&rest[..start]);
        output.push_str(&index.to_string());
        rest = &rest[start + len + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================
