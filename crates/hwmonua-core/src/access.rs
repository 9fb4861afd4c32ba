//! Access control hook.
//!
//! The runtime asks an [`AccessControl`] implementation for the access mask a
//! session has on a node, then intersects it with the node's own access
//! level. Installing a different implementation in
//! [`ServerConfig`](crate::config::ServerConfig) fully replaces the default
//! per-session computation.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::types::{AccessLevel, NodeId};

/// Identity of the client session a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Session used when the transport cannot tell clients apart.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Session derived from the connection peer.
    pub fn from_peer(peer: SocketAddr) -> Self {
        Self(format!("peer:{}", peer))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the access mask of a session on a node.
pub trait AccessControl: Send + Sync {
    fn user_access_level(&self, session: &SessionId, node_id: &NodeId) -> AccessLevel;
}

/// Grants every session every right; the node's access level is the only
/// restriction left.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccessControl;

impl AccessControl for DefaultAccessControl {
    fn user_access_level(&self, _session: &SessionId, _node_id: &NodeId) -> AccessLevel {
        AccessLevel::ALL
    }
}

/// Denies all access to a fixed set of nodes, independent of session.
///
/// Every other node, including ids the server has never heard of, resolves
/// to [`AccessLevel::ALL`].
#[derive(Debug, Clone, Default)]
pub struct DenyListAccessControl {
    denied: HashSet<NodeId>,
}

impl DenyListAccessControl {
    /// Node denied when no deny list is configured (`ns=1;i=1337`).
    pub fn default_denied_node() -> NodeId {
        NodeId::numeric(1, 1337)
    }

    pub fn new(denied: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    pub fn is_denied(&self, node_id: &NodeId) -> bool {
        self.denied.contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }
}

impl AccessControl for DenyListAccessControl {
    fn user_access_level(&self, _session: &SessionId, node_id: &NodeId) -> AccessLevel {
        if self.is_denied(node_id) {
            AccessLevel::NONE
        } else {
            AccessLevel::ALL
        }
    }
}
