//! Port Reservation Reconciler
//!
//! Node reconciler that keeps a node's host ports and its hypervisor's
//! reservations in agreement:
//! - ports recorded on the node but missing on the hypervisor are reserved again
//! - resources every node needs but that have no port yet get one
//!
//! A port recorded on the node but held by another owner is a conflict and
//! is reported as an error; the node is left untouched.

use super::node::NODE_PORT_RESOURCES;
use crate::cluster::Inquirer;
use crate::domain::ports::NodeReconciler;
use crate::error::Result;
use crate::infra::{Hypervisor, PortOwner};
use crate::node::SharedNode;
use async_trait::async_trait;
use tracing::{debug, info};

/// Restores and completes host port reservations of a node
#[derive(Debug, Default, Clone, Copy)]
pub struct PortReservationReconciler;

impl PortReservationReconciler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeReconciler for PortReservationReconciler {
    async fn reconcile(&self, inquirer: &Inquirer<'_>) -> Result<()> {
        let hypervisor = inquirer.hypervisor()?;
        inquirer.cluster()?;

        sync_ports(inquirer.node(), &hypervisor)
    }

    fn name(&self) -> &str {
        "port-reservation"
    }
}

/// Reserve the node's recorded ports and allocate missing ones.
///
/// Runs under the node's write lock, which node removal also takes before
/// releasing ports, so a removed node never gets ports again.
fn sync_ports(shared: &SharedNode, hypervisor: &Hypervisor) -> Result<()> {
    let mut node = shared.write();
    if node.is_removed() {
        debug!("Node {} was removed, skipping port reservations", node.key());
        return Ok(());
    }

    for (resource, port) in node.allocated_host_ports() {
        let owner = PortOwner::new(node.cluster_name(), node.name(), resource.as_str());
        if hypervisor.port_of(node.cluster_name(), node.name(), resource) != Some(*port) {
            info!(
                "Restoring reservation of port {} on hypervisor {} for {}",
                port,
                hypervisor.name(),
                owner
            );
        }
        hypervisor.reserve_port(owner, *port)?;
    }

    for resource in NODE_PORT_RESOURCES {
        if node.host_port(resource).is_some() {
            continue;
        }
        let port = hypervisor.request_port(node.cluster_name(), node.name(), resource)?;
        info!(
            "Allocated missing {} port {} for node {} on hypervisor {}",
            resource,
            port,
            node.key(),
            hypervisor.name()
        );
        node.record_host_port(*resource, port);
    }

    debug!("Node {} port reservations in sync", node.key());
    Ok(())
}
