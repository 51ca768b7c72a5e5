//! Cluster Registry

use super::cluster::Cluster;
use crate::crd;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Registry of clusters keyed by name
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: RwLock<BTreeMap<String, Arc<Cluster>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster
    pub fn insert(&self, cluster: Cluster) -> Result<Arc<Cluster>> {
        let mut clusters = self.clusters.write();
        if clusters.contains_key(cluster.name()) {
            return Err(Error::ClusterAlreadyRegistered {
                name: cluster.name().to_string(),
            });
        }

        info!("Registering cluster: {}", cluster.name());
        let cluster = Arc::new(cluster);
        clusters.insert(cluster.name().to_string(), cluster.clone());
        Ok(cluster)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.read().get(name).cloned()
    }

    /// Get a cluster by name, failing if it is unknown
    pub fn lookup(&self, name: &str) -> Result<Arc<Cluster>> {
        self.get(name).ok_or_else(|| Error::ClusterNotFound {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.clusters.read().keys().cloned().collect()
    }

    /// Snapshot of all clusters, sorted by name
    pub fn all(&self) -> Vec<Arc<Cluster>> {
        self.clusters.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }

    pub fn export(&self) -> Vec<crd::Cluster> {
        self.all().iter().map(|c| c.export()).collect()
    }

    /// Concatenated versioned YAML documents of every cluster
    pub fn specs(&self) -> Result<String> {
        let mut res = String::new();
        for cluster in self.all() {
            res.push_str(&cluster.specs()?);
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_insert_lookup_remove() {
        let registry = ClusterRegistry::new();
        registry.insert(Cluster::new("c1", 1)).unwrap();

        assert_matches!(
            registry.insert(Cluster::new("c1", 3)),
            Err(Error::ClusterAlreadyRegistered { .. })
        );
        assert_eq!(registry.lookup("c1").unwrap().control_plane_replicas(), 1);

        registry.remove("c1");
        assert_matches!(registry.lookup("c1"), Err(Error::ClusterNotFound { .. }));
        assert!(registry.is_empty());
    }
}
