//! Node registration for discovered sensors.
//!
//! Every measurement point becomes one read-only, scalar `Double` variable
//! organized under the Objects folder, identified by the string node id
//! `ns=1;s=<chip>_<subfeature>` and bound to a [`SensorDataSource`].

use std::sync::Arc;

use hwmonua_core::address_space::DataSourceVariable;
use hwmonua_core::types::{ns0, VALUE_RANK_SCALAR};
use hwmonua_core::{
    AccessLevel, AddressSpace, LocalizedText, NodeId, QualifiedName, StatusCode,
    VariableAttributes,
};
use thiserror::Error;

use crate::bridge::SensorDataSource;
use crate::enumerate::{Inventory, MeasurementPoint};
use crate::library::SensorLibrary;

/// Namespace index of sensor nodes.
pub const SENSOR_NAMESPACE: u16 = 1;

/// Error type for sensor registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Two measurement points map to the same node id
    #[error("Duplicate sensor node: {0}")]
    DuplicateNode(NodeId),

    /// The address space refused the node
    #[error("Unable to register sensor node {node_id}: {status}")]
    AddressSpace { node_id: NodeId, status: StatusCode },
}

/// Node id of a measurement point.
pub fn sensor_node_id(point: &MeasurementPoint) -> NodeId {
    NodeId::string(SENSOR_NAMESPACE, point.name())
}

/// Register one measurement point.
pub fn register_sensor(
    space: &mut AddressSpace,
    library: Arc<dyn SensorLibrary>,
    point: &MeasurementPoint,
) -> Result<NodeId, RegistrationError> {
    let name = point.name();
    let node_id = NodeId::string(SENSOR_NAMESPACE, name.as_str());
    let description = point
        .feature
        .label
        .clone()
        .unwrap_or_else(|| point.chip.name.to_string());

    let variable = DataSourceVariable {
        node_id: node_id.clone(),
        parent: NodeId::objects_folder(),
        reference_type: NodeId::ns0(ns0::ORGANIZES),
        browse_name: QualifiedName::new(SENSOR_NAMESPACE, name.as_str()),
        type_definition: NodeId::ns0(ns0::BASE_DATA_VARIABLE_TYPE),
        attributes: VariableAttributes {
            display_name: LocalizedText::en_us(name.as_str()),
            description: LocalizedText::en_us(description),
            access_level: AccessLevel::CURRENT_READ,
            data_type: NodeId::ns0(ns0::DOUBLE),
            value_rank: VALUE_RANK_SCALAR,
        },
        data_source: Box::new(SensorDataSource::new(library, point.clone())),
    };

    match space.add_data_source_variable(variable) {
        Ok(node_id) => {
            tracing::debug!("Registered sensor node {}", node_id);
            Ok(node_id)
        }
        Err(StatusCode::BAD_NODE_ID_EXISTS) => Err(RegistrationError::DuplicateNode(node_id)),
        Err(status) => Err(RegistrationError::AddressSpace { node_id, status }),
    }
}

/// Register every measurement point of `inventory`, in inventory order.
///
/// Stops at the first failure. Nodes registered before the failure stay in
/// the address space.
pub fn register_sensors(
    space: &mut AddressSpace,
    inventory: &Inventory,
) -> Result<usize, RegistrationError> {
    let Some(library) = inventory.library() else {
        tracing::info!("No sensor library, nothing to register");
        return Ok(0);
    };

    for point in inventory.points() {
        register_sensor(space, library.clone(), point)?;
    }

    tracing::info!("Registered {} sensor nodes", inventory.len());
    Ok(inventory.len())
}
