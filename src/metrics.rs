//! Operator Metrics
//!
//! Prometheus metrics for reconciliation passes and hypervisor port usage,
//! kept in a dedicated registry so tests can create independent instances.

use crate::error::Result;
use crate::infra::HypervisorRegistry;
use crate::node::NodeRegistry;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Metrics exported by the operator
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Completed reconciliation passes
    pub reconcile_passes: IntCounter,
    /// Per-node reconciliations that returned an error
    pub node_reconcile_failures: IntCounter,
    /// Passes cut short by the pass timeout
    pub reconcile_timeouts: IntCounter,
    /// Duration of reconciliation passes
    pub reconcile_duration: Histogram,
    /// Registered nodes
    pub nodes: IntGauge,
    /// Reserved host ports per hypervisor
    pub reserved_ports: IntGaugeVec,
}

impl Metrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconcile_passes = IntCounter::new(
            "controlplane_reconcile_passes_total",
            "Total number of reconciliation passes",
        )?;
        let node_reconcile_failures = IntCounter::new(
            "controlplane_node_reconcile_failures_total",
            "Total number of failed per-node reconciliations",
        )?;
        let reconcile_timeouts = IntCounter::new(
            "controlplane_reconcile_timeouts_total",
            "Total number of reconciliation passes that timed out",
        )?;
        let reconcile_duration = Histogram::with_opts(HistogramOpts::new(
            "controlplane_reconcile_duration_seconds",
            "Duration of reconciliation passes",
        ))?;
        let nodes = IntGauge::new("controlplane_nodes", "Number of registered nodes")?;
        let reserved_ports = IntGaugeVec::new(
            Opts::new(
                "controlplane_hypervisor_reserved_ports",
                "Number of host ports reserved per hypervisor",
            ),
            &["hypervisor"],
        )?;

        registry.register(Box::new(reconcile_passes.clone()))?;
        registry.register(Box::new(node_reconcile_failures.clone()))?;
        registry.register(Box::new(reconcile_timeouts.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(nodes.clone()))?;
        registry.register(Box::new(reserved_ports.clone()))?;

        Ok(Self {
            registry,
            reconcile_passes,
            node_reconcile_failures,
            reconcile_timeouts,
            reconcile_duration,
            nodes,
            reserved_ports,
        })
    }

    /// Refresh gauges from the registries
    pub fn observe(&self, hypervisors: &HypervisorRegistry, nodes: &NodeRegistry) {
        self.nodes.set(nodes.len() as i64);
        self.reserved_ports.reset();
        for hypervisor in hypervisors.all() {
            self.reserved_ports
                .with_label_values(&[hypervisor.name()])
                .set(hypervisor.reserved_count() as i64);
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{Hypervisor, PortRange};

    #[test]
    fn test_observe_and_render() {
        let metrics = Metrics::new().unwrap();
        let hypervisors = HypervisorRegistry::new();
        let hv = hypervisors
            .insert(Hypervisor::new("hv-1", "", PortRange::default()))
            .unwrap();
        hv.request_port("c1", "n1", "apiserver").unwrap();

        metrics.reconcile_passes.inc();
        metrics.observe(&hypervisors, &NodeRegistry::new());

        let (content_type, body) = metrics.render().unwrap();
        let body = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("controlplane_reconcile_passes_total 1"));
        assert!(body.contains(r#"controlplane_hypervisor_reserved_ports{hypervisor="hv-1"} 1"#));
        assert!(body.contains("controlplane_nodes 0"));
    }
}
