//! Cluster Reconciler
//!
//! Drives one reconciliation pass over every known node and aggregates the
//! versioned specs of all resources.
//!
//! The reconciler borrows the hypervisor, cluster and node registries; their
//! lifetime is owned by whoever builds it. Each node is handed to the
//! external [`NodeReconciler`] through an [`Inquirer`], which can look up the
//! node's hypervisor and cluster but cannot add or remove registry entries.
//!
//! Per-node failures are not reported through [`ClusterReconciler::reconcile`];
//! they are logged, counted in metrics, and otherwise left to the node
//! reconciler to report.

use super::cluster::Cluster;
use super::registry::ClusterRegistry;
use crate::domain::ports::NodeReconciler;
use crate::error::{Error, Result};
use crate::infra::{Hypervisor, HypervisorRegistry};
use crate::metrics::Metrics;
use crate::node::{NodeRegistry, SharedNode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// Inquirer
// =============================================================================

/// Read-only view handed to a [`NodeReconciler`] for one node
pub struct Inquirer<'a> {
    node: &'a SharedNode,
    hypervisors: &'a HypervisorRegistry,
    clusters: &'a ClusterRegistry,
}

impl<'a> Inquirer<'a> {
    /// Node being reconciled
    pub fn node(&self) -> &SharedNode {
        self.node
    }

    /// Hypervisor the node is bound to
    pub fn hypervisor(&self) -> Result<Arc<Hypervisor>> {
        let name = self.node.read().hypervisor_name().to_string();
        self.lookup_hypervisor(&name)
    }

    /// Cluster the node belongs to
    pub fn cluster(&self) -> Result<Arc<Cluster>> {
        let name = self.node.read().cluster_name().to_string();
        self.lookup_cluster(&name)
    }

    /// Look up any hypervisor by name
    pub fn lookup_hypervisor(&self, name: &str) -> Result<Arc<Hypervisor>> {
        self.hypervisors.lookup(name)
    }

    /// Look up any cluster by name
    pub fn lookup_cluster(&self, name: &str) -> Result<Arc<Cluster>> {
        self.clusters.lookup(name)
    }
}

// =============================================================================
// Reconcile Summary
// =============================================================================

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Nodes handed to the node reconciler
    pub visited: usize,
    /// Wall time of the pass
    pub duration: Duration,
}

// =============================================================================
// Cluster Reconciler
// =============================================================================

/// Reconciles every node known to the node registry
pub struct ClusterReconciler<'a> {
    hypervisors: &'a HypervisorRegistry,
    clusters: &'a ClusterRegistry,
    nodes: &'a NodeRegistry,
    node_reconciler: &'a dyn NodeReconciler,
    metrics: Option<&'a Metrics>,
}

impl<'a> ClusterReconciler<'a> {
    /// Create a cluster reconciler over the given registries
    pub fn new(
        hypervisors: &'a HypervisorRegistry,
        clusters: &'a ClusterRegistry,
        nodes: &'a NodeRegistry,
        node_reconciler: &'a dyn NodeReconciler,
    ) -> Self {
        Self {
            hypervisors,
            clusters,
            nodes,
            node_reconciler,
            metrics: None,
        }
    }

    /// Record pass and failure counts in `metrics`
    pub fn with_metrics(mut self, metrics: &'a Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Every node present when the pass starts is visited exactly once, in
    /// key order, whatever the outcome of the nodes before it.
    pub async fn reconcile(&self) -> ReconcileSummary {
        info!(
            "Starting reconciliation process with {}",
            self.node_reconciler.name()
        );
        let start = Instant::now();

        let nodes = self.nodes.nodes();
        for node in &nodes {
            let inquirer = Inquirer {
                node,
                hypervisors: self.hypervisors,
                clusters: self.clusters,
            };

            if let Err(e) = self.node_reconciler.reconcile(&inquirer).await {
                let key = node.read().key();
                warn!("Reconciliation of node {} failed: {}", key, e);
                if let Some(metrics) = self.metrics {
                    metrics.node_reconcile_failures.inc();
                }
            }
        }

        let summary = ReconcileSummary {
            visited: nodes.len(),
            duration: start.elapsed(),
        };

        if let Some(metrics) = self.metrics {
            metrics.reconcile_passes.inc();
            metrics.reconcile_duration.observe(summary.duration.as_secs_f64());
            metrics.observe(self.hypervisors, self.nodes);
        }

        debug!(
            "Reconciliation pass visited {} nodes in {:?}",
            summary.visited, summary.duration
        );
        summary
    }

    /// Versioned specs of all hypervisors, then all clusters, then all nodes.
    ///
    /// The only failure source is YAML encoding ([`Error::Encoding`]), which
    /// the bundled resource types, made of strings, integers and string
    /// maps, do not trigger. A failure is still wrapped in
    /// [`Error::Aggregation`] naming the collection it came from.
    pub fn specs(&self) -> Result<String> {
        let hypervisors = self.hypervisors.specs().map_err(|e| aggregation("hypervisors", e))?;
        let clusters = self.clusters.specs().map_err(|e| aggregation("clusters", e))?;
        let nodes = self.nodes.specs().map_err(|e| aggregation("nodes", e))?;

        Ok(hypervisors + &clusters + &nodes)
    }
}

fn aggregation(collection: &'static str, source: Error) -> Error {
    Error::Aggregation {
        collection,
        source: Box::new(source),
    }
}
