//! Node Registry Events
//!
//! Events emitted by the node registry for external consumers to react to
//! node lifecycle changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the node registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    /// A node was added to the registry
    NodeRegistered {
        cluster: String,
        node: String,
        hypervisor: String,
    },

    /// A node was removed and its ports handed back to the hypervisor
    NodeRemoved {
        cluster: String,
        node: String,
        hypervisor: String,
        released_ports: Vec<(String, u16)>,
    },
}

impl NodeEvent {
    /// Cluster of the node the event is about
    pub fn cluster(&self) -> &str {
        match self {
            NodeEvent::NodeRegistered { cluster, .. } | NodeEvent::NodeRemoved { cluster, .. } => {
                cluster
            }
        }
    }

    /// Name of the node the event is about
    pub fn node(&self) -> &str {
        match self {
            NodeEvent::NodeRegistered { node, .. } | NodeEvent::NodeRemoved { node, .. } => node,
        }
    }
}

impl std::fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeEvent::NodeRegistered { .. } => write!(f, "node_registered"),
            NodeEvent::NodeRemoved { .. } => write!(f, "node_removed"),
        }
    }
}
