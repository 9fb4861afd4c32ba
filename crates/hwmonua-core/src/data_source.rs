//! Data-source binding.
//!
//! A variable node bound to a [`DataSource`] computes its value on demand
//! instead of holding it. The data source is also the node's typed context:
//! whatever it needs to answer a read lives inside the implementing type.

use crate::access::SessionId;
use crate::types::{DataValue, NodeId, NumericRange, StatusCode, Variant};

/// Parameters of a single value read.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub session: &'a SessionId,
    pub node_id: &'a NodeId,
    /// The client asked for a source timestamp.
    pub source_timestamp: bool,
    /// Requested index range, `None` when the whole value is requested.
    pub range: Option<&'a NumericRange>,
}

/// Parameters of a single value write.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    pub session: &'a SessionId,
    pub node_id: &'a NodeId,
}

/// Read/write callback pair bound to a variable node.
///
/// The outer `Result` is the status of the operation itself; the quality of
/// the value travels inside the returned [`DataValue`].
pub trait DataSource: Send + Sync {
    fn read(&self, ctx: &ReadContext<'_>) -> Result<DataValue, StatusCode>;

    /// Write callback. The default is "absent": the node is not writable no
    /// matter what its access mask says.
    fn write(&self, _ctx: &WriteContext<'_>, _value: &Variant) -> Result<(), StatusCode> {
        Err(StatusCode::BAD_NOT_WRITABLE)
    }
}
