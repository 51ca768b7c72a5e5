//! Cluster CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster groups the control plane nodes serving one Kubernetes cluster.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.controlplane.dev",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Replicas", "type": "integer", "jsonPath": ".spec.controlPlaneReplicas"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Desired number of control plane nodes
    #[serde(default = "default_control_plane_replicas")]
    pub control_plane_replicas: u32,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            control_plane_replicas: default_control_plane_replicas(),
        }
    }
}

fn default_control_plane_replicas() -> u32 {
    1
}
