//! Node Registry
//!
//! Nodes keyed by `(cluster, name)`. Removing a node releases its host
//! ports on the owning hypervisor.

use super::events::NodeEvent;
use super::node::{Node, NodeKey};
use crate::crd;
use crate::error::{Error, Result};
use crate::infra::HypervisorRegistry;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared handle to a registered node
pub type SharedNode = Arc<RwLock<Node>>;

/// Registry of control plane nodes
pub struct NodeRegistry {
    /// Nodes by key
    nodes: RwLock<BTreeMap<NodeKey, SharedNode>>,
    /// Event broadcaster
    event_sender: broadcast::Sender<NodeEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.keys())
            .finish()
    }
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(1024);
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            event_sender,
        }
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_sender.subscribe()
    }

    /// Register a node.
    ///
    /// Insert does not touch port reservations. When it fails, ports that
    /// [`Node::create_with_random_hypervisor`] reserved for `node` stay held:
    /// the caller hands them back with [`Node::release_ports`], unless `node`
    /// sits on the same hypervisor as the registered node, whose reservations
    /// they then are.
    pub fn insert(&self, node: Node) -> Result<SharedNode> {
        let key = node.key();
        let hypervisor = node.hypervisor_name().to_string();

        let shared = {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(&key) {
                return Err(Error::NodeAlreadyRegistered {
                    cluster: key.cluster,
                    name: key.name,
                });
            }
            let shared = Arc::new(RwLock::new(node));
            nodes.insert(key.clone(), shared.clone());
            shared
        };

        info!("Registered node {} on hypervisor {}", key, hypervisor);

        let _ = self.event_sender.send(NodeEvent::NodeRegistered {
            cluster: key.cluster,
            node: key.name,
            hypervisor,
        });

        Ok(shared)
    }

    /// Remove a node and release its ports back to its hypervisor
    pub fn remove(&self, cluster: &str, name: &str, hypervisors: &HypervisorRegistry) -> Result<Node> {
        let key = NodeKey::new(cluster, name);
        let shared = self.nodes.write().remove(&key).ok_or_else(|| Error::NodeNotFound {
            cluster: cluster.to_string(),
            name: name.to_string(),
        })?;

        // Ports are released under the node's write lock; a reconciler that
        // still holds a handle sees the node as removed once it gets the lock.
        let (node, released_ports) = {
            let mut node = shared.write();
            node.mark_removed();
            let released_ports = match hypervisors.get(node.hypervisor_name()) {
                Some(hypervisor) => node.release_ports(&hypervisor),
                None => {
                    warn!(
                        "Hypervisor {} of node {} is not registered, no ports to release",
                        node.hypervisor_name(),
                        key
                    );
                    Vec::new()
                }
            };
            (node.clone(), released_ports)
        };

        info!("Removed node {} ({} ports released)", key, released_ports.len());

        let _ = self.event_sender.send(NodeEvent::NodeRemoved {
            cluster: key.cluster,
            node: key.name,
            hypervisor: node.hypervisor_name().to_string(),
            released_ports,
        });

        Ok(node)
    }

    /// Get a node by cluster and name
    pub fn get(&self, cluster: &str, name: &str) -> Option<SharedNode> {
        self.nodes.read().get(&NodeKey::new(cluster, name)).cloned()
    }

    /// Check if a node exists
    pub fn contains(&self, cluster: &str, name: &str) -> bool {
        self.nodes.read().contains_key(&NodeKey::new(cluster, name))
    }

    /// Keys of all nodes, sorted
    pub fn keys(&self) -> Vec<NodeKey> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Snapshot of all node handles, sorted by key
    pub fn nodes(&self) -> Vec<SharedNode> {
        self.nodes.read().values().cloned().collect()
    }

    /// Nodes belonging to a cluster
    pub fn nodes_in_cluster(&self, cluster: &str) -> Vec<SharedNode> {
        self.nodes
            .read()
            .iter()
            .filter(|(key, _)| key.cluster == cluster)
            .map(|(_, node)| node.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Versioned representation of every node, sorted by key
    pub fn export(&self) -> Vec<crd::Node> {
        self.nodes().iter().map(|node| node.read().export()).collect()
    }

    /// Concatenated versioned YAML documents of every node
    pub fn specs(&self) -> Result<String> {
        let mut res = String::new();
        for node in self.nodes() {
            let document = node.read().specs()?;
            res.push_str(&document);
        }
        Ok(res)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{Hypervisor, PortRange};
    use crate::node::{Role, APISERVER_RESOURCE};
    use assert_matches::assert_matches;

    fn hypervisors() -> HypervisorRegistry {
        let registry = HypervisorRegistry::new();
        registry
            .insert(Hypervisor::new("hv-1", "", PortRange::new(30000, 30010).unwrap()))
            .unwrap();
        registry
    }

    #[test]
    fn test_insert_and_get() {
        let hypervisors = hypervisors();
        let registry = NodeRegistry::new();
        let node =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();

        registry.insert(node).unwrap();

        assert!(registry.contains("c1", "n1"));
        assert!(!registry.contains("c2", "n1"));
        let shared = registry.get("c1", "n1").unwrap();
        assert_eq!(shared.read().hypervisor_name(), "hv-1");
        assert_eq!(registry.nodes_in_cluster("c1").len(), 1);
    }

    #[test]
    fn test_duplicate_insert() {
        let hypervisors = hypervisors();
        let registry = NodeRegistry::new();
        let node =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();

        registry.insert(node.clone()).unwrap();
        assert_matches!(registry.insert(node), Err(Error::NodeAlreadyRegistered { .. }));
    }

    #[test]
    fn test_remove_releases_ports() {
        let hypervisors = hypervisors();
        let registry = NodeRegistry::new();
        let node =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();
        let port = node.host_port(APISERVER_RESOURCE).unwrap();
        registry.insert(node).unwrap();

        let removed = registry.remove("c1", "n1", &hypervisors).unwrap();

        assert_eq!(removed.name(), "n1");
        assert!(removed.is_removed());
        assert!(registry.is_empty());
        let hv = hypervisors.get("hv-1").unwrap();
        assert_eq!(hv.holder_of(port), None);

        assert_matches!(
            registry.remove("c1", "n1", &hypervisors),
            Err(Error::NodeNotFound { .. })
        );
    }

    #[test]
    fn test_rejected_insert_ports_released_by_caller() {
        let hypervisors = hypervisors();
        hypervisors
            .insert(Hypervisor::new("hv-2", "", PortRange::new(31000, 31010).unwrap()))
            .unwrap();
        let registry = NodeRegistry::new();

        let first =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();
        // Take the first node's hypervisor out of the pool so the duplicate lands elsewhere
        let first_hv = hypervisors.remove(first.hypervisor_name()).unwrap();
        registry.insert(first.clone()).unwrap();

        let rejected =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();
        assert_ne!(rejected.hypervisor_name(), first.hypervisor_name());
        assert_matches!(
            registry.insert(rejected.clone()),
            Err(Error::NodeAlreadyRegistered { .. })
        );

        let other = hypervisors.lookup(rejected.hypervisor_name()).unwrap();
        assert_eq!(other.reserved_count(), 1);
        rejected.release_ports(&other);
        assert_eq!(other.reserved_count(), 0);
        assert_eq!(first_hv.reserved_count(), 1);
    }

    #[test]
    fn test_events() {
        let hypervisors = hypervisors();
        let registry = NodeRegistry::new();
        let mut events = registry.subscribe();

        let node =
            Node::create_with_random_hypervisor("c1", "n1", Role::ControlPlane, &hypervisors).unwrap();
        registry.insert(node).unwrap();
        registry.remove("c1", "n1", &hypervisors).unwrap();

        let registered = events.try_recv().unwrap();
        assert_eq!(registered.to_string(), "node_registered");
        assert_eq!(registered.node(), "n1");

        assert_matches!(
            events.try_recv().unwrap(),
            NodeEvent::NodeRemoved { ref released_ports, .. } if released_ports.len() == 1
        );
    }

    #[test]
    fn test_specs_sorted_by_key() {
        let hypervisors = hypervisors();
        let registry = NodeRegistry::new();
        for (cluster, name) in [("c2", "a"), ("c1", "b")] {
            let node =
                Node::create_with_random_hypervisor(cluster, name, Role::ControlPlane, &hypervisors)
                    .unwrap();
            registry.insert(node).unwrap();
        }

        let specs = registry.specs().unwrap();
        assert!(specs.find("cluster: c1").unwrap() < specs.find("cluster: c2").unwrap());
        assert_eq!(registry.export().len(), 2);
    }
}
