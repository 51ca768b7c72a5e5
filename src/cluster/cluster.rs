//! Cluster
//!
//! A named control plane cluster. Its nodes live in the node registry.

use crate::crd;
use crate::error::Result;
use crate::specs;
use kube::ResourceExt;

/// A control plane cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    name: String,
    control_plane_replicas: u32,
}

impl Cluster {
    pub fn new(name: impl Into<String>, control_plane_replicas: u32) -> Self {
        Self {
            name: name.into(),
            control_plane_replicas,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Desired number of control plane nodes
    pub fn control_plane_replicas(&self) -> u32 {
        self.control_plane_replicas
    }

    /// Build a cluster from its versioned representation
    pub fn from_versioned(cluster: &crd::Cluster) -> Self {
        Self {
            name: cluster.name_any(),
            control_plane_replicas: cluster.spec.control_plane_replicas,
        }
    }

    /// Export to the versioned representation
    pub fn export(&self) -> crd::Cluster {
        crd::Cluster::new(
            &self.name,
            crd::ClusterSpec {
                control_plane_replicas: self.control_plane_replicas,
            },
        )
    }

    /// Versioned YAML document of this cluster
    pub fn specs(&self) -> Result<String> {
        specs::encode("Cluster", &self.name, &self.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cluster = Cluster::new("c1", 3);
        assert_eq!(Cluster::from_versioned(&cluster.export()), cluster);
    }

    #[test]
    fn test_specs() {
        let specs = Cluster::new("c1", 3).specs().unwrap();
        assert!(specs.contains("kind: Cluster"));
        assert!(specs.contains("controlPlaneReplicas: 3"));
    }
}
