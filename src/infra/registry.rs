//! Hypervisor Registry
//!
//! Holds the pool of known hypervisors and samples one uniformly at random
//! when a node needs to be scheduled.

use super::hypervisor::Hypervisor;
use crate::crd;
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of hypervisors keyed by name
pub struct HypervisorRegistry {
    /// Hypervisors by name
    hypervisors: RwLock<BTreeMap<String, Arc<Hypervisor>>>,
    /// Random source used for sampling
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl std::fmt::Debug for HypervisorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypervisorRegistry")
            .field("hypervisors", &self.names())
            .finish()
    }
}

impl HypervisorRegistry {
    /// Create an empty registry sampling from an entropy-seeded generator
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty registry sampling from the given random source
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            hypervisors: RwLock::new(BTreeMap::new()),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Register a hypervisor
    pub fn insert(&self, hypervisor: Hypervisor) -> Result<Arc<Hypervisor>> {
        let mut hypervisors = self.hypervisors.write();
        if hypervisors.contains_key(hypervisor.name()) {
            return Err(Error::HypervisorAlreadyRegistered {
                name: hypervisor.name().to_string(),
            });
        }

        info!("Registering hypervisor: {}", hypervisor.name());
        let hypervisor = Arc::new(hypervisor);
        hypervisors.insert(hypervisor.name().to_string(), hypervisor.clone());

        Ok(hypervisor)
    }

    /// Remove a hypervisor from the pool
    pub fn remove(&self, name: &str) -> Option<Arc<Hypervisor>> {
        let removed = self.hypervisors.write().remove(name);
        if removed.is_some() {
            info!("Removed hypervisor: {}", name);
        }
        removed
    }

    /// Get a hypervisor by name
    pub fn get(&self, name: &str) -> Option<Arc<Hypervisor>> {
        self.hypervisors.read().get(name).cloned()
    }

    /// Get a hypervisor by name, failing if it is unknown
    pub fn lookup(&self, name: &str) -> Result<Arc<Hypervisor>> {
        self.get(name).ok_or_else(|| Error::HypervisorNotFound {
            name: name.to_string(),
        })
    }

    /// Check if a hypervisor is registered
    pub fn contains(&self, name: &str) -> bool {
        self.hypervisors.read().contains_key(name)
    }

    /// Names of all hypervisors, sorted
    pub fn names(&self) -> Vec<String> {
        self.hypervisors.read().keys().cloned().collect()
    }

    /// Snapshot of all hypervisors, sorted by name
    pub fn all(&self) -> Vec<Arc<Hypervisor>> {
        self.hypervisors.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.hypervisors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypervisors.read().is_empty()
    }

    /// Pick a hypervisor uniformly at random
    pub fn sample(&self) -> Result<Arc<Hypervisor>> {
        let hypervisors = self.hypervisors.read();
        if hypervisors.is_empty() {
            return Err(Error::EmptyPool);
        }

        let index = self.rng.lock().gen_range(0..hypervisors.len());
        let hypervisor = hypervisors
            .values()
            .nth(index)
            .cloned()
            .ok_or(Error::EmptyPool)?;

        debug!("Sampled hypervisor {}", hypervisor.name());
        Ok(hypervisor)
    }

    /// Versioned representation of every hypervisor, sorted by name
    pub fn export(&self) -> Vec<crd::Hypervisor> {
        self.all().iter().map(|h| h.export()).collect()
    }

    /// Concatenated versioned YAML documents of every hypervisor
    pub fn specs(&self) -> Result<String> {
        let mut res = String::new();
        for hypervisor in self.all() {
            res.push_str(&hypervisor.specs()?);
        }
        Ok(res)
    }
}

impl Default for HypervisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::PortRange;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    fn registry_with(names: &[&str]) -> HypervisorRegistry {
        let registry = HypervisorRegistry::with_rng(StdRng::seed_from_u64(7));
        for name in names {
            registry
                .insert(Hypervisor::new(*name, "", PortRange::default()))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_sample_empty_pool() {
        let registry = HypervisorRegistry::new();
        assert_matches!(registry.sample(), Err(Error::EmptyPool));
    }

    #[test]
    fn test_sample_covers_all_hypervisors() {
        let registry = registry_with(&["a", "b", "c"]);
        let mut seen = HashSet::new();

        for _ in 0..300 {
            seen.insert(registry.sample().unwrap().name().to_string());
        }

        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_sample_is_deterministic_with_seeded_rng() {
        let first = registry_with(&["a", "b", "c", "d"]);
        let second = registry_with(&["a", "b", "c", "d"]);

        let picks = |r: &HypervisorRegistry| -> Vec<String> {
            (0..20).map(|_| r.sample().unwrap().name().to_string()).collect()
        };

        assert_eq!(picks(&first), picks(&second));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = registry_with(&["a"]);
        let result = registry.insert(Hypervisor::new("a", "", PortRange::default()));
        assert_matches!(result, Err(Error::HypervisorAlreadyRegistered { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_lookup() {
        let registry = registry_with(&["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_matches!(registry.lookup("a"), Err(Error::HypervisorNotFound { .. }));
        assert_eq!(registry.names(), vec!["b".to_string()]);
    }

    #[test]
    fn test_specs_sorted_by_name() {
        let registry = registry_with(&["b", "a"]);
        let specs = registry.specs().unwrap();

        let a = specs.find("name: a").unwrap();
        let b = specs.find("name: b").unwrap();
        assert!(a < b);
        assert_eq!(registry.export().len(), 2);
    }
}
