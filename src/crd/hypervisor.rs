//! Hypervisor CRD
//!
//! Versioned representation of an execution host: how to reach it, which
//! host ports it can hand out and which of them are currently reserved.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Hypervisor CRD
// =============================================================================

/// Hypervisor is an execution host able to run control plane nodes.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infra.controlplane.dev",
    version = "v1alpha1",
    kind = "Hypervisor",
    plural = "hypervisors",
    shortname = "hv",
    status = "HypervisorStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Endpoint", "type": "string", "jsonPath": ".spec.criEndpoint"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct HypervisorSpec {
    /// Container runtime endpoint of the hypervisor
    #[serde(default)]
    pub cri_endpoint: String,

    /// Range of host ports this hypervisor hands out
    #[serde(default)]
    pub port_range: HypervisorPortRange,

    /// Free-form labels describing the host
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Inclusive host port range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HypervisorPortRange {
    pub low: i32,
    pub high: i32,
}

impl Default for HypervisorPortRange {
    fn default() -> Self {
        Self {
            low: 30000,
            high: 32767,
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of the Hypervisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HypervisorStatus {
    /// Ports currently reserved on this hypervisor
    #[serde(default)]
    pub allocated_ports: Vec<HypervisorPortAllocation>,
}

/// A single port reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HypervisorPortAllocation {
    pub cluster: String,
    pub node: String,
    pub resource: String,
    pub port: i32,
}
