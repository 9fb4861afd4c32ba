//! Protocol server runtime for HwmonUA.
//!
//! This crate provides the in-process address space, the read/write/browse
//! services, the access-control hook and the server run-loop that the sensor
//! bridge plugs into:
//! - [`AddressSpace`] holds the node hierarchy
//! - [`DataSource`] is the callback bound to a variable's Value attribute
//! - [`AccessControl`] decides the per-session access level of a node
//! - [`Server`] owns the address space and services requests until its
//!   [`RunningFlag`] is cleared

pub mod access;
pub mod address_space;
pub mod config;
pub mod data_source;
pub mod error;
pub mod lifecycle;
pub mod server;
pub mod service;
pub mod types;

mod transport;
#[cfg(feature = "encryption")]
mod tls;

pub use access::{AccessControl, DefaultAccessControl, DenyListAccessControl, SessionId};
pub use address_space::{AddressSpace, DataSourceVariable, Node, NodeClass, VariableAttributes};
pub use config::{SecurityConfig, ServerConfig};
pub use data_source::{DataSource, ReadContext, WriteContext};
pub use error::{ConfigError, Result, ServerError};
pub use lifecycle::{install_signal_handlers, RunningFlag};
pub use server::{Server, ServerInfo};
pub use types::{
    AccessLevel, AttributeId, DataValue, LocalizedText, NodeId, NumericRange, QualifiedName,
    StatusCode, TimestampsToReturn, Variant,
};
