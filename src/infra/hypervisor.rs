//! Hypervisor
//!
//! An execution host together with its host port reservations. Every
//! hypervisor guards its own reservation set with a mutex so that
//! "find a free port, reserve it" is atomic with respect to concurrent
//! allocation requests.

use crate::crd;
use crate::error::{Error, Result};
use crate::specs;
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// Port Range
// =============================================================================

/// Inclusive range of host ports a hypervisor hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    /// Create a port range, rejecting empty ranges
    pub fn new(low: u16, high: u16) -> Result<Self> {
        if low > high {
            return Err(Error::Configuration(format!(
                "invalid port range {}-{}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }

    /// Check if a port belongs to this range
    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        (self.low..=self.high).contains(&port)
    }

    /// Number of ports in the range
    pub fn len(&self) -> usize {
        (self.high - self.low) as usize + 1
    }

    fn from_versioned(range: &crd::HypervisorPortRange) -> Result<Self> {
        let convert = |port: i32| {
            u16::try_from(port).map_err(|_| {
                Error::Configuration(format!("port {} out of bounds in port range", port))
            })
        };
        Self::new(convert(range.low)?, convert(range.high)?)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            low: 30000,
            high: 32767,
        }
    }
}

// =============================================================================
// Port Owner
// =============================================================================

/// Key of a port reservation: the node and the resource the port serves
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortOwner {
    pub cluster: String,
    pub node: String,
    pub resource: String,
}

impl PortOwner {
    pub fn new(
        cluster: impl Into<String>,
        node: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            node: node.into(),
            resource: resource.into(),
        }
    }

    fn is_node(&self, cluster: &str, node: &str) -> bool {
        self.cluster == cluster && self.node == node
    }
}

impl std::fmt::Display for PortOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.cluster, self.node, self.resource)
    }
}

// =============================================================================
// Reservations
// =============================================================================

/// Reservation set indexed both ways; the two maps always mirror each other
#[derive(Debug, Default)]
struct PortReservations {
    by_owner: BTreeMap<PortOwner, u16>,
    by_port: BTreeMap<u16, PortOwner>,
}

impl PortReservations {
    fn insert(&mut self, owner: PortOwner, port: u16) {
        self.by_port.insert(port, owner.clone());
        self.by_owner.insert(owner, port);
    }

    fn remove(&mut self, owner: &PortOwner) -> Option<u16> {
        let port = self.by_owner.remove(owner)?;
        self.by_port.remove(&port);
        Some(port)
    }

    fn first_free(&self, range: PortRange) -> Option<u16> {
        (range.low..=range.high).find(|port| !self.by_port.contains_key(port))
    }
}

// =============================================================================
// Hypervisor
// =============================================================================

/// An execution host able to run control plane nodes
#[derive(Debug)]
pub struct Hypervisor {
    name: String,
    cri_endpoint: String,
    labels: BTreeMap<String, String>,
    port_range: PortRange,
    reservations: Mutex<PortReservations>,
}

impl Hypervisor {
    /// Create a hypervisor with no reservations
    pub fn new(name: impl Into<String>, cri_endpoint: impl Into<String>, port_range: PortRange) -> Self {
        Self {
            name: name.into(),
            cri_endpoint: cri_endpoint.into(),
            labels: BTreeMap::new(),
            port_range,
            reservations: Mutex::new(PortReservations::default()),
        }
    }

    /// Attach descriptive labels
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cri_endpoint(&self) -> &str {
        &self.cri_endpoint
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn port_range(&self) -> PortRange {
        self.port_range
    }

    /// Reserve a free port for `resource` of node `cluster/node`.
    ///
    /// The lowest free port of the range is handed out. Asking again for an
    /// owner that already holds a port returns that same port.
    pub fn request_port(&self, cluster: &str, node: &str, resource: &str) -> Result<u16> {
        let owner = PortOwner::new(cluster, node, resource);
        let mut reservations = self.reservations.lock();

        if let Some(port) = reservations.by_owner.get(&owner) {
            return Ok(*port);
        }

        let port = reservations
            .first_free(self.port_range)
            .ok_or_else(|| Error::PortExhaustion {
                hypervisor: self.name.clone(),
                low: self.port_range.low,
                high: self.port_range.high,
            })?;

        debug!("Reserved port {} on hypervisor {} for {}", port, self.name, owner);
        reservations.insert(owner, port);

        Ok(port)
    }

    /// Reserve a specific port for an owner.
    ///
    /// Used to restore reservations known from persisted state. If the owner
    /// held a different port, that port is released in favour of `port`.
    pub fn reserve_port(&self, owner: PortOwner, port: u16) -> Result<()> {
        if !self.port_range.contains(port) {
            return Err(Error::PortOutOfRange {
                hypervisor: self.name.clone(),
                port,
                low: self.port_range.low,
                high: self.port_range.high,
            });
        }

        let mut reservations = self.reservations.lock();
        match reservations.by_port.get(&port) {
            Some(holder) if *holder == owner => return Ok(()),
            Some(holder) => {
                return Err(Error::PortConflict {
                    hypervisor: self.name.clone(),
                    port,
                    holder: holder.to_string(),
                })
            }
            None => {}
        }

        reservations.remove(&owner);
        debug!("Restored port {} on hypervisor {} for {}", port, self.name, owner);
        reservations.insert(owner, port);

        Ok(())
    }

    /// Release the port held for `resource` of node `cluster/node`.
    ///
    /// Releasing a port that is not held is a no-op and returns `None`.
    pub fn release_port(&self, cluster: &str, node: &str, resource: &str) -> Option<u16> {
        let owner = PortOwner::new(cluster, node, resource);
        let released = self.reservations.lock().remove(&owner);
        if let Some(port) = released {
            debug!("Released port {} on hypervisor {} from {}", port, self.name, owner);
        }
        released
    }

    /// Release every port held by node `cluster/node`
    pub fn release_node_ports(&self, cluster: &str, node: &str) -> Vec<(String, u16)> {
        let mut reservations = self.reservations.lock();
        let owners: Vec<PortOwner> = reservations
            .by_owner
            .keys()
            .filter(|owner| owner.is_node(cluster, node))
            .cloned()
            .collect();

        owners
            .into_iter()
            .filter_map(|owner| {
                let port = reservations.remove(&owner)?;
                Some((owner.resource, port))
            })
            .collect()
    }

    /// Port currently held for an owner
    pub fn port_of(&self, cluster: &str, node: &str, resource: &str) -> Option<u16> {
        self.reservations
            .lock()
            .by_owner
            .get(&PortOwner::new(cluster, node, resource))
            .copied()
    }

    /// Owner currently holding a port
    pub fn holder_of(&self, port: u16) -> Option<PortOwner> {
        self.reservations.lock().by_port.get(&port).cloned()
    }

    /// Snapshot of all reservations, ordered by owner
    pub fn reservations(&self) -> Vec<(PortOwner, u16)> {
        self.reservations
            .lock()
            .by_owner
            .iter()
            .map(|(owner, port)| (owner.clone(), *port))
            .collect()
    }

    /// Number of reserved ports
    pub fn reserved_count(&self) -> usize {
        self.reservations.lock().by_owner.len()
    }

    // =========================================================================
    // Versioned conversion
    // =========================================================================

    /// Build a hypervisor from its versioned representation, restoring the
    /// reservations recorded in its status
    pub fn from_versioned(hypervisor: &crd::Hypervisor) -> Result<Self> {
        let name = hypervisor.name_any();
        let port_range = PortRange::from_versioned(&hypervisor.spec.port_range)?;
        let res = Self::new(name, hypervisor.spec.cri_endpoint.clone(), port_range)
            .with_labels(hypervisor.spec.labels.clone());

        let allocations = hypervisor
            .status
            .as_ref()
            .map(|s| s.allocated_ports.as_slice())
            .unwrap_or_default();

        for allocation in allocations {
            let port = u16::try_from(allocation.port).map_err(|_| Error::InvalidPort {
                node: format!("{}/{}", allocation.cluster, allocation.node),
                resource: allocation.resource.clone(),
                port: allocation.port as i64,
            })?;
            res.reserve_port(
                PortOwner::new(&allocation.cluster, &allocation.node, &allocation.resource),
                port,
            )?;
        }

        Ok(res)
    }

    /// Export to the versioned representation
    pub fn export(&self) -> crd::Hypervisor {
        let mut res = crd::Hypervisor::new(
            &self.name,
            crd::HypervisorSpec {
                cri_endpoint: self.cri_endpoint.clone(),
                port_range: crd::HypervisorPortRange {
                    low: self.port_range.low as i32,
                    high: self.port_range.high as i32,
                },
                labels: self.labels.clone(),
            },
        );
        res.status = Some(crd::HypervisorStatus {
            allocated_ports: self
                .reservations()
                .into_iter()
                .map(|(owner, port)| crd::HypervisorPortAllocation {
                    cluster: owner.cluster,
                    node: owner.node,
                    resource: owner.resource,
                    port: port as i32,
                })
                .collect(),
        });
        res
    }

    /// Versioned YAML document of this hypervisor
    pub fn specs(&self) -> Result<String> {
        specs::encode("Hypervisor", &self.name, &self.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn hypervisor(low: u16, high: u16) -> Hypervisor {
        Hypervisor::new("hv-1", "unix:///run/containerd.sock", PortRange::new(low, high).unwrap())
    }

    #[test]
    fn test_port_range_validation() {
        assert!(PortRange::new(10, 9).is_err());
        let range = PortRange::new(10, 10).unwrap();
        assert_eq!(range.len(), 1);
        assert!(range.contains(10));
        assert!(!range.contains(11));
    }

    #[test]
    fn test_request_port_unique_per_owner() {
        let hv = hypervisor(30000, 30100);
        let mut seen = HashSet::new();

        for i in 0..50 {
            let port = hv.request_port("cluster", &format!("node-{}", i), "apiserver").unwrap();
            assert!(hv.port_range().contains(port));
            assert!(seen.insert(port), "port {} handed out twice", port);
        }
        assert_eq!(hv.reserved_count(), 50);
    }

    #[test]
    fn test_request_port_is_idempotent_per_owner() {
        let hv = hypervisor(30000, 30010);
        let first = hv.request_port("c1", "n1", "apiserver").unwrap();
        let second = hv.request_port("c1", "n1", "apiserver").unwrap();

        assert_eq!(first, second);
        assert_eq!(hv.reserved_count(), 1);
    }

    #[test]
    fn test_port_exhaustion() {
        let hv = hypervisor(30000, 30001);
        hv.request_port("c1", "n1", "apiserver").unwrap();
        hv.request_port("c1", "n2", "apiserver").unwrap();

        let result = hv.request_port("c1", "n3", "apiserver");
        assert_matches!(result, Err(Error::PortExhaustion { low: 30000, high: 30001, .. }));
        assert_eq!(hv.reserved_count(), 2);
    }

    #[test]
    fn test_release_port_and_reuse() {
        let hv = hypervisor(30000, 30000);
        let port = hv.request_port("c1", "n1", "apiserver").unwrap();

        assert_eq!(hv.release_port("c1", "n1", "apiserver"), Some(port));
        // Second release is a no-op
        assert_eq!(hv.release_port("c1", "n1", "apiserver"), None);

        let reused = hv.request_port("c1", "n2", "apiserver").unwrap();
        assert_eq!(reused, port);
        assert_eq!(hv.holder_of(port), Some(PortOwner::new("c1", "n2", "apiserver")));
    }

    #[test]
    fn test_release_node_ports() {
        let hv = hypervisor(30000, 30010);
        hv.request_port("c1", "n1", "apiserver").unwrap();
        hv.request_port("c1", "n1", "etcd").unwrap();
        hv.request_port("c1", "n2", "apiserver").unwrap();

        let released = hv.release_node_ports("c1", "n1");
        assert_eq!(released.len(), 2);
        assert_eq!(hv.reserved_count(), 1);
        assert!(hv.port_of("c1", "n2", "apiserver").is_some());
    }

    #[test]
    fn test_reserve_port_conflicts() {
        let hv = hypervisor(30000, 30010);
        let owner = PortOwner::new("c1", "n1", "apiserver");
        hv.reserve_port(owner.clone(), 30005).unwrap();
        // Same owner, same port
        hv.reserve_port(owner, 30005).unwrap();

        let result = hv.reserve_port(PortOwner::new("c1", "n2", "apiserver"), 30005);
        assert_matches!(result, Err(Error::PortConflict { port: 30005, .. }));

        let result = hv.reserve_port(PortOwner::new("c1", "n2", "apiserver"), 40000);
        assert_matches!(result, Err(Error::PortOutOfRange { port: 40000, .. }));
    }

    #[test]
    fn test_reserve_port_moves_owner() {
        let hv = hypervisor(30000, 30010);
        let owner = PortOwner::new("c1", "n1", "apiserver");
        hv.reserve_port(owner.clone(), 30001).unwrap();
        hv.reserve_port(owner.clone(), 30002).unwrap();

        assert_eq!(hv.port_of("c1", "n1", "apiserver"), Some(30002));
        assert_eq!(hv.holder_of(30001), None);
        assert_eq!(hv.reserved_count(), 1);
    }

    #[test]
    fn test_concurrent_requests_get_distinct_ports() {
        let hv = Arc::new(hypervisor(30000, 32767));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let hv = hv.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| {
                            hv.request_port("c1", &format!("node-{}-{}", t, i), "apiserver")
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(seen.insert(port));
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_versioned_round_trip() {
        let hv = hypervisor(30000, 30010);
        hv.request_port("c1", "n1", "apiserver").unwrap();
        hv.request_port("c2", "n1", "apiserver").unwrap();

        let restored = Hypervisor::from_versioned(&hv.export()).unwrap();

        assert_eq!(restored.name(), "hv-1");
        assert_eq!(restored.port_range(), hv.port_range());
        assert_eq!(restored.reservations(), hv.reservations());
    }

    #[test]
    fn test_specs_document() {
        let hv = hypervisor(30000, 30010);
        hv.request_port("c1", "n1", "apiserver").unwrap();

        let specs = hv.specs().unwrap();
        assert!(specs.starts_with("---\n"));
        assert!(specs.contains("apiVersion: infra.controlplane.dev/v1alpha1"));
        assert!(specs.contains("kind: Hypervisor"));
        assert!(specs.contains("port: 30000"));
    }
}
