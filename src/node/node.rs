//! Control Plane Node
//!
//! In-memory model of a control plane node and its conversion to and from
//! the versioned `Node` resource.

use crate::crd;
use crate::error::{Error, Result};
use crate::infra::{Hypervisor, HypervisorRegistry};
use crate::specs;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Resource name of the API server host port
pub const APISERVER_RESOURCE: &str = "apiserver";

/// Host port resources reserved for every new node
pub const NODE_PORT_RESOURCES: &[&str] = &[APISERVER_RESOURCE];

// =============================================================================
// Role
// =============================================================================

/// Functional kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Control plane instance
    ControlPlane,
    /// Control plane ingress
    ControlPlaneIngress,
}

impl Role {
    /// Wire value of this role
    pub fn as_versioned(&self) -> &'static str {
        match self {
            Role::ControlPlane => crd::CONTROL_PLANE_ROLE,
            Role::ControlPlaneIngress => crd::CONTROL_PLANE_INGRESS_ROLE,
        }
    }

    /// Parse a wire value, `None` if the value is not a known role
    pub fn from_versioned(role: &str) -> Option<Self> {
        match role {
            crd::CONTROL_PLANE_ROLE => Some(Role::ControlPlane),
            crd::CONTROL_PLANE_INGRESS_ROLE => Some(Role::ControlPlaneIngress),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_versioned())
    }
}

// =============================================================================
// Node Key
// =============================================================================

/// Identity of a node: its cluster and its name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub cluster: String,
    pub name: String,
}

impl NodeKey {
    pub fn new(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster, self.name)
    }
}

// =============================================================================
// Node
// =============================================================================

/// A control plane node bound to exactly one hypervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    cluster_name: String,
    role: Option<Role>,
    hypervisor_name: String,
    allocated_host_ports: BTreeMap<String, u16>,
    removed: bool,
}

impl Node {
    /// Schedule a new node onto a randomly sampled hypervisor and reserve
    /// its host ports there.
    ///
    /// The hypervisor is not re-sampled when port reservation fails; the
    /// caller decides whether to retry. Ports reserved before a failure are
    /// released again before the error is returned.
    pub fn create_with_random_hypervisor(
        cluster_name: &str,
        name: &str,
        role: Role,
        hypervisors: &HypervisorRegistry,
    ) -> Result<Self> {
        let hypervisor = hypervisors.sample()?;
        let allocated_host_ports =
            reserve_all(&hypervisor, cluster_name, name, NODE_PORT_RESOURCES)?;

        info!(
            "Scheduled node {}/{} ({}) on hypervisor {}",
            cluster_name,
            name,
            role,
            hypervisor.name()
        );

        Ok(Self {
            name: name.to_string(),
            cluster_name: cluster_name.to_string(),
            role: Some(role),
            hypervisor_name: hypervisor.name().to_string(),
            allocated_host_ports,
            removed: false,
        })
    }

    /// Build a node from its versioned representation.
    ///
    /// No ports are reserved: the allocated host ports are taken as already
    /// held upstream. An unrecognized role does not fail the import, it
    /// leaves the role unset; use [`Node::from_versioned_strict`] to reject it.
    pub fn from_versioned(node: &crd::Node) -> Result<Self> {
        let mut res = Self::from_versioned_parts(node)?;
        res.role = Role::from_versioned(&node.spec.role);
        if res.role.is_none() {
            warn!(
                "Node {}/{} has unrecognized role {:?}, leaving it unset",
                res.cluster_name, res.name, node.spec.role
            );
        }
        Ok(res)
    }

    /// Like [`Node::from_versioned`], but fails on an unrecognized role
    pub fn from_versioned_strict(node: &crd::Node) -> Result<Self> {
        let mut res = Self::from_versioned_parts(node)?;
        res.role = Some(Role::from_versioned(&node.spec.role).ok_or_else(|| {
            Error::UnrecognizedRole {
                node: res.name.clone(),
                role: node.spec.role.clone(),
            }
        })?);
        Ok(res)
    }

    fn from_versioned_parts(node: &crd::Node) -> Result<Self> {
        let name = node.name_any();
        let mut allocated_host_ports = BTreeMap::new();
        for host_port in node.allocated_host_ports() {
            let port = u16::try_from(host_port.port).map_err(|_| Error::InvalidPort {
                node: name.clone(),
                resource: host_port.name.clone(),
                port: host_port.port as i64,
            })?;
            allocated_host_ports.insert(host_port.name.clone(), port);
        }

        Ok(Self {
            name,
            cluster_name: node.spec.cluster.clone(),
            role: None,
            hypervisor_name: node.spec.hypervisor.clone(),
            allocated_host_ports,
            removed: false,
        })
    }

    /// Export to the versioned representation
    pub fn export(&self) -> crd::Node {
        let mut res = crd::Node::new(
            &self.name,
            crd::NodeSpec {
                hypervisor: self.hypervisor_name.clone(),
                cluster: self.cluster_name.clone(),
                role: self
                    .role
                    .map(|role| role.as_versioned().to_string())
                    .unwrap_or_default(),
            },
        );
        res.status = Some(crd::NodeStatus {
            allocated_host_ports: self
                .allocated_host_ports
                .iter()
                .map(|(name, port)| crd::NodeHostPortAllocation {
                    name: name.clone(),
                    port: *port as i32,
                })
                .collect(),
        });
        res
    }

    /// Versioned YAML document of this node
    pub fn specs(&self) -> Result<String> {
        specs::encode("Node", &self.name, &self.export())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.cluster_name, &self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Role, `None` when imported with an unrecognized role
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn hypervisor_name(&self) -> &str {
        &self.hypervisor_name
    }

    pub fn allocated_host_ports(&self) -> &BTreeMap<String, u16> {
        &self.allocated_host_ports
    }

    /// Host port allocated for a resource
    pub fn host_port(&self, resource: &str) -> Option<u16> {
        self.allocated_host_ports.get(resource).copied()
    }

    /// Whether the node has been taken out of its registry. A removed node
    /// must not reserve ports again.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Record a host port reserved on this node's hypervisor
    pub fn record_host_port(&mut self, resource: impl Into<String>, port: u16) {
        self.allocated_host_ports.insert(resource.into(), port);
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    /// Release every host port of this node on its hypervisor
    pub fn release_ports(&self, hypervisor: &Hypervisor) -> Vec<(String, u16)> {
        let released = hypervisor.release_node_ports(&self.cluster_name, &self.name);
        debug!(
            "Released {} ports of node {}/{} on hypervisor {}",
            released.len(),
            self.cluster_name,
            self.name,
            hypervisor.name()
        );
        released
    }
}

/// Reserve a port for each resource, all or nothing
fn reserve_all(
    hypervisor: &Hypervisor,
    cluster: &str,
    node: &str,
    resources: &[&str],
) -> Result<BTreeMap<String, u16>> {
    let mut reserved = BTreeMap::new();
    for resource in resources {
        let held_before = hypervisor.port_of(cluster, node, resource).is_some();
        match hypervisor.request_port(cluster, node, resource) {
            Ok(port) => {
                if !held_before {
                    reserved.insert(resource.to_string(), port);
                }
            }
            Err(e) => {
                for resource in reserved.keys() {
                    hypervisor.release_port(cluster, node, resource);
                }
                return Err(e);
            }
        }
    }

    // Ports the owner already held are part of the allocation too
    for resource in resources {
        if let Some(port) = hypervisor.port_of(cluster, node, resource) {
            reserved.insert(resource.to_string(), port);
        }
    }
    Ok(reserved)
}
