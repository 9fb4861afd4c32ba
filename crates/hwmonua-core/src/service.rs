//! Read, write and browse services.
//!
//! These functions are the body of one dispatch cycle of the run-loop. They
//! run synchronously against the address space; the access-control hook is
//! consulted before any data source is invoked.

use chrono::Utc;
use serde::Serialize;

use crate::access::{AccessControl, SessionId};
use crate::address_space::{AddressSpace, BrowseEntry, Node, VariableNode};
use crate::data_source::{ReadContext, WriteContext};
use crate::types::{
    AccessLevel, AttributeId, DataValue, NodeId, NumericRange, StatusCode, TimestampsToReturn,
    Variant,
};

/// Read one attribute of one node.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub node_id: NodeId,
    pub attribute: AttributeId,
    /// Raw index range string, parsed by the service.
    pub index_range: Option<String>,
    pub timestamps: TimestampsToReturn,
}

impl ReadRequest {
    /// Read the Value attribute with default options.
    pub fn value(node_id: NodeId) -> Self {
        Self {
            node_id,
            attribute: AttributeId::Value,
            index_range: None,
            timestamps: TimestampsToReturn::default(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeId) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn with_index_range(mut self, range: impl Into<String>) -> Self {
        self.index_range = Some(range.into());
        self
    }

    pub fn with_timestamps(mut self, timestamps: TimestampsToReturn) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// Outcome of a read: the operation status plus the data value.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResponse {
    pub node_id: NodeId,
    pub attribute: AttributeId,
    pub status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_value: Option<DataValue>,
}

impl ReadResponse {
    fn failed(request: &ReadRequest, status: StatusCode) -> Self {
        Self {
            node_id: request.node_id.clone(),
            attribute: request.attribute,
            status,
            data_value: None,
        }
    }
}

/// Write the Value attribute of one node.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub node_id: NodeId,
    pub value: Variant,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    pub node_id: NodeId,
    pub status: StatusCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseResponse {
    pub node_id: NodeId,
    pub status: StatusCode,
    pub references: Vec<BrowseEntry>,
}

/// Execute a read request.
pub fn read(
    space: &AddressSpace,
    access: &dyn AccessControl,
    session: &SessionId,
    request: &ReadRequest,
) -> ReadResponse {
    let Some(node) = space.node(&request.node_id) else {
        return ReadResponse::failed(request, StatusCode::BAD_NODE_ID_UNKNOWN);
    };

    let range = NumericRange::parse(request.index_range.as_deref().unwrap_or_default());

    let result = match (request.attribute, range) {
        (AttributeId::Value, range) => read_value(node, access, session, request, range),
        // Index ranges only apply to values
        (_, Ok(Some(_)) | Err(_)) => Err(StatusCode::BAD_INDEX_RANGE_INVALID),
        (attribute, Ok(None)) => {
            read_attribute(node, access, session, attribute).map(DataValue::from)
        }
    };

    match result {
        Ok(mut data_value) => {
            if request.timestamps.includes_server() {
                data_value.server_timestamp = Some(Utc::now());
            }
            ReadResponse {
                node_id: request.node_id.clone(),
                attribute: request.attribute,
                status: StatusCode::GOOD,
                data_value: Some(data_value),
            }
        }
        Err(status) => ReadResponse::failed(request, status),
    }
}

fn effective_access(
    node: &VariableNode,
    access: &dyn AccessControl,
    session: &SessionId,
) -> AccessLevel {
    access.user_access_level(session, &node.node_id) & node.attributes.access_level
}

fn read_value(
    node: &Node,
    access: &dyn AccessControl,
    session: &SessionId,
    request: &ReadRequest,
    range: Result<Option<NumericRange>, StatusCode>,
) -> Result<DataValue, StatusCode> {
    let variable = node
        .as_variable()
        .ok_or(StatusCode::BAD_ATTRIBUTE_ID_INVALID)?;

    if !variable.attributes.access_level.contains(AccessLevel::CURRENT_READ) {
        return Err(StatusCode::BAD_NOT_READABLE);
    }
    if !effective_access(variable, access, session).contains(AccessLevel::CURRENT_READ) {
        tracing::debug!("Read of {} denied for session {}", variable.node_id, session);
        return Err(StatusCode::BAD_USER_ACCESS_DENIED);
    }

    // A range that does not parse is reported on the value, like any other
    // range the node cannot serve
    let range = match range {
        Ok(range) => range,
        Err(status) => return Ok(DataValue::with_status(status)),
    };

    let ctx = ReadContext {
        session,
        node_id: &variable.node_id,
        source_timestamp: request.timestamps.includes_source(),
        range: range.as_ref(),
    };
    let mut value = variable.data_source().read(&ctx)?;
    if !ctx.source_timestamp {
        value.source_timestamp = None;
    }
    Ok(value)
}

fn read_attribute(
    node: &Node,
    access: &dyn AccessControl,
    session: &SessionId,
    attribute: AttributeId,
) -> Result<Variant, StatusCode> {
    let value = match (attribute, node) {
        (AttributeId::NodeId, _) => Variant::NodeId(node.node_id().clone()),
        (AttributeId::BrowseName, _) => Variant::QualifiedName(node.browse_name().clone()),
        (AttributeId::DisplayName, _) => Variant::LocalizedText(node.display_name().clone()),
        (AttributeId::Description, Node::Variable(v)) => {
            Variant::LocalizedText(v.attributes.description.clone())
        }
        (AttributeId::DataType, Node::Variable(v)) => Variant::NodeId(v.attributes.data_type.clone()),
        (AttributeId::ValueRank, Node::Variable(v)) => Variant::Int32(v.attributes.value_rank),
        (AttributeId::AccessLevel, Node::Variable(v)) => {
            Variant::Byte(v.attributes.access_level.bits())
        }
        (AttributeId::UserAccessLevel, Node::Variable(v)) => {
            Variant::Byte(effective_access(v, access, session).bits())
        }
        _ => return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
    };
    Ok(value)
}

/// Execute a write request.
pub fn write(
    space: &AddressSpace,
    access: &dyn AccessControl,
    session: &SessionId,
    request: &WriteRequest,
) -> WriteResponse {
    let status = match write_value(space, access, session, request) {
        Ok(()) => StatusCode::GOOD,
        Err(status) => status,
    };
    WriteResponse {
        node_id: request.node_id.clone(),
        status,
    }
}

fn write_value(
    space: &AddressSpace,
    access: &dyn AccessControl,
    session: &SessionId,
    request: &WriteRequest,
) -> Result<(), StatusCode> {
    let node = space
        .node(&request.node_id)
        .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
    let variable = node
        .as_variable()
        .ok_or(StatusCode::BAD_NOT_WRITABLE)?;

    if !variable.attributes.access_level.contains(AccessLevel::CURRENT_WRITE) {
        return Err(StatusCode::BAD_NOT_WRITABLE);
    }
    if !effective_access(variable, access, session).contains(AccessLevel::CURRENT_WRITE) {
        return Err(StatusCode::BAD_USER_ACCESS_DENIED);
    }

    let ctx = WriteContext {
        session,
        node_id: &variable.node_id,
    };
    variable.data_source().write(&ctx, &request.value)
}

/// Execute a browse request.
pub fn browse(space: &AddressSpace, node_id: &NodeId) -> BrowseResponse {
    match space.browse(node_id) {
        Ok(references) => BrowseResponse {
            node_id: node_id.clone(),
            status: StatusCode::GOOD,
            references,
        },
        Err(status) => BrowseResponse {
            node_id: node_id.clone(),
            status,
            references: Vec::new(),
        },
    }
}
