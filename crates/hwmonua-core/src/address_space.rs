//! Address space - the hierarchical set of nodes exposed to clients.
//!
//! The address space starts out with the Objects folder as its only node.
//! Applications hang their own nodes below it with
//! [`AddressSpace::add_data_source_variable`]. Nodes are never removed.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::data_source::DataSource;
use crate::types::{
    ns0, AccessLevel, LocalizedText, NodeId, QualifiedName, StatusCode, VALUE_RANK_ANY,
};

/// Node class of an address-space node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeClass {
    Object,
    Variable,
}

/// Attributes of a variable node.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAttributes {
    pub display_name: LocalizedText,
    pub description: LocalizedText,
    pub access_level: AccessLevel,
    pub data_type: NodeId,
    pub value_rank: i32,
}

impl Default for VariableAttributes {
    fn default() -> Self {
        Self {
            display_name: LocalizedText::default(),
            description: LocalizedText::default(),
            access_level: AccessLevel::CURRENT_READ,
            data_type: NodeId::ns0(ns0::BASE_DATA_TYPE),
            value_rank: VALUE_RANK_ANY,
        }
    }
}

/// Object node (folders).
#[derive(Debug, Clone)]
pub struct ObjectNode {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub type_definition: NodeId,
}

/// Variable node whose value is computed by a bound data source.
pub struct VariableNode {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub type_definition: NodeId,
    pub attributes: VariableAttributes,
    data_source: Box<dyn DataSource>,
}

impl VariableNode {
    pub fn data_source(&self) -> &dyn DataSource {
        self.data_source.as_ref()
    }
}

impl fmt::Debug for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableNode")
            .field("node_id", &self.node_id)
            .field("browse_name", &self.browse_name)
            .field("type_definition", &self.type_definition)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Node stored in the address space.
#[derive(Debug)]
pub enum Node {
    Object(ObjectNode),
    Variable(VariableNode),
}

impl Node {
    pub fn node_id(&self) -> &NodeId {
        match self {
            Node::Object(node) => &node.node_id,
            Node::Variable(node) => &node.node_id,
        }
    }

    pub fn browse_name(&self) -> &QualifiedName {
        match self {
            Node::Object(node) => &node.browse_name,
            Node::Variable(node) => &node.browse_name,
        }
    }

    pub fn display_name(&self) -> &LocalizedText {
        match self {
            Node::Object(node) => &node.display_name,
            Node::Variable(node) => &node.attributes.display_name,
        }
    }

    pub fn node_class(&self) -> NodeClass {
        match self {
            Node::Object(_) => NodeClass::Object,
            Node::Variable(_) => NodeClass::Variable,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableNode> {
        match self {
            Node::Variable(node) => Some(node),
            Node::Object(_) => None,
        }
    }
}

/// Request to add a data-source variable node.
pub struct DataSourceVariable {
    /// Requested identity of the new node
    pub node_id: NodeId,
    pub parent: NodeId,
    pub reference_type: NodeId,
    pub browse_name: QualifiedName,
    pub type_definition: NodeId,
    pub attributes: VariableAttributes,
    pub data_source: Box<dyn DataSource>,
}

/// Forward reference from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: NodeId,
    pub target: NodeId,
}

/// One row of a browse result.
#[derive(Debug, Clone, Serialize)]
pub struct BrowseEntry {
    pub node_id: NodeId,
    pub reference_type: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub node_class: NodeClass,
}

/// Node storage plus the forward references between nodes.
#[derive(Debug)]
pub struct AddressSpace {
    nodes: HashMap<NodeId, Node>,
    references: HashMap<NodeId, Vec<Reference>>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// Create an address space holding only the Objects folder.
    pub fn new() -> Self {
        let objects = ObjectNode {
            node_id: NodeId::objects_folder(),
            browse_name: QualifiedName::new(0, "Objects"),
            display_name: LocalizedText::en_us("Objects"),
            type_definition: NodeId::ns0(ns0::FOLDER_TYPE),
        };

        let mut nodes = HashMap::new();
        nodes.insert(objects.node_id.clone(), Node::Object(objects));

        Self {
            nodes,
            references: HashMap::new(),
        }
    }

    /// Add a variable node bound to a data source.
    ///
    /// Fails with `BadNodeIdExists` when the identity is taken and with
    /// `BadParentNodeIdInvalid` when the parent does not exist. Nothing is
    /// added on failure.
    pub fn add_data_source_variable(
        &mut self,
        variable: DataSourceVariable,
    ) -> Result<NodeId, StatusCode> {
        if self.nodes.contains_key(&variable.node_id) {
            return Err(StatusCode::BAD_NODE_ID_EXISTS);
        }
        if !self.nodes.contains_key(&variable.parent) {
            return Err(StatusCode::BAD_PARENT_NODE_ID_INVALID);
        }

        let node_id = variable.node_id.clone();
        self.references
            .entry(variable.parent)
            .or_default()
            .push(Reference {
                reference_type: variable.reference_type,
                target: node_id.clone(),
            });

        let node = VariableNode {
            node_id: node_id.clone(),
            browse_name: variable.browse_name,
            type_definition: variable.type_definition,
            attributes: variable.attributes,
            data_source: variable.data_source,
        };
        self.nodes.insert(node_id.clone(), Node::Variable(node));

        Ok(node_id)
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Number of nodes, including the Objects folder.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a node, in insertion order.
    pub fn browse(&self, node_id: &NodeId) -> Result<Vec<BrowseEntry>, StatusCode> {
        if !self.nodes.contains_key(node_id) {
            return Err(StatusCode::BAD_NODE_ID_UNKNOWN);
        }

        let entries = self
            .references
            .get(node_id)
            .map(|refs| {
                refs.iter()
                    .filter_map(|reference| {
                        let target = self.nodes.get(&reference.target)?;
                        Some(BrowseEntry {
                            node_id: reference.target.clone(),
                            reference_type: reference.reference_type.clone(),
                            browse_name: target.browse_name().clone(),
                            display_name: target.display_name().clone(),
                            node_class: target.node_class(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(entries)
    }
}
