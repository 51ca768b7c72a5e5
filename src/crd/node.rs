//! Node CRD
//!
//! Versioned representation of a control plane node: the hypervisor it is
//! bound to, its cluster, its role and the host ports reserved for it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Wire value for the control plane role
pub const CONTROL_PLANE_ROLE: &str = "control-plane";

/// Wire value for the control plane ingress role
pub const CONTROL_PLANE_INGRESS_ROLE: &str = "control-plane-ingress";

// =============================================================================
// Node CRD
// =============================================================================

/// Node is a control plane (or control plane ingress) instance scheduled
/// on a hypervisor.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.controlplane.dev",
    version = "v1alpha1",
    kind = "Node",
    plural = "nodes",
    status = "NodeStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.cluster"}"#,
    printcolumn = r#"{"name": "Hypervisor", "type": "string", "jsonPath": ".spec.hypervisor"}"#,
    printcolumn = r#"{"name": "Role", "type": "string", "jsonPath": ".spec.role"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Name of the hypervisor hosting this node
    pub hypervisor: String,

    /// Name of the cluster this node belongs to
    pub cluster: String,

    /// Role of this node (`control-plane` or `control-plane-ingress`).
    /// Kept as a plain string so unknown values survive decoding.
    #[serde(default)]
    pub role: String,
}

/// Status of the Node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Host ports reserved on the hypervisor for this node
    #[serde(default)]
    pub allocated_host_ports: Vec<NodeHostPortAllocation>,
}

/// A named host port reserved for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeHostPortAllocation {
    /// Resource the port serves (e.g. `apiserver`)
    pub name: String,

    /// Port number on the hypervisor
    pub port: i32,
}

impl Node {
    /// Name of the hypervisor hosting this node
    pub fn hypervisor_name(&self) -> &str {
        &self.spec.hypervisor
    }

    /// Name of the cluster this node belongs to
    pub fn cluster_name(&self) -> &str {
        &self.spec.cluster
    }

    /// Allocated host ports, empty when no status is present
    pub fn allocated_host_ports(&self) -> &[NodeHostPortAllocation] {
        self.status
            .as_ref()
            .map(|s| s.allocated_host_ports.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_yaml_shape() {
        let yaml = r#"
apiVersion: cluster.controlplane.dev/v1alpha1
kind: Node
metadata:
  name: test-node
spec:
  hypervisor: hv-1
  cluster: test-cluster
  role: control-plane-ingress
status:
  allocatedHostPorts:
    - name: apiserver
      port: 30000
"#;
        let node: Node = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(node.metadata.name.as_deref(), Some("test-node"));
        assert_eq!(node.hypervisor_name(), "hv-1");
        assert_eq!(node.cluster_name(), "test-cluster");
        assert_eq!(node.spec.role, CONTROL_PLANE_INGRESS_ROLE);
        assert_eq!(
            node.allocated_host_ports(),
            &[NodeHostPortAllocation {
                name: "apiserver".into(),
                port: 30000
            }]
        );
    }

    #[test]
    fn test_node_without_status() {
        let node = Node::new(
            "n1",
            NodeSpec {
                hypervisor: "hv-1".into(),
                cluster: "c1".into(),
                role: CONTROL_PLANE_ROLE.into(),
            },
        );
        assert!(node.allocated_host_ports().is_empty());
    }
}
