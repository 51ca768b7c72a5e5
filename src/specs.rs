//! Versioned Specs
//!
//! YAML encoding of versioned resources and decoding of multi-document
//! manifests back into registries.
//!
//! Every encoded document starts with a `---` separator, so concatenating
//! the specs of several resources yields a valid multi-document stream that
//! [`decode_manifests`] reads back.

use crate::cluster::{Cluster, ClusterRegistry};
use crate::crd;
use crate::error::{Error, Result};
use crate::infra::{Hypervisor, HypervisorRegistry};
use crate::node::{Node, NodeRegistry};
use kube::{CustomResourceExt, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Encode a versioned resource as a YAML document
pub fn encode<K: Serialize>(kind: &'static str, name: &str, object: &K) -> Result<String> {
    let document = serde_yaml::to_string(object).map_err(|source| Error::Encoding {
        kind,
        name: name.to_string(),
        source,
    })?;
    Ok(format!("---\n{}", document))
}

/// Custom resource definitions of the hypervisor, cluster and node kinds
pub fn crd_specs() -> Result<String> {
    let definitions = [
        crd::Hypervisor::crd(),
        crd::Cluster::crd(),
        crd::Node::crd(),
    ];

    let mut res = String::new();
    for definition in &definitions {
        res.push_str(&encode(
            "CustomResourceDefinition",
            &definition.name_any(),
            definition,
        )?);
    }
    Ok(res)
}

// =============================================================================
// Manifests
// =============================================================================

/// Versioned resources decoded from a manifest stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifests {
    pub hypervisors: Vec<crd::Hypervisor>,
    pub clusters: Vec<crd::Cluster>,
    pub nodes: Vec<crd::Node>,
}

/// apiVersion and kind of a document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

fn is<K: Resource<DynamicType = ()>>(type_meta: &TypeMeta) -> bool {
    type_meta.api_version == K::api_version(&()) && type_meta.kind == K::kind(&())
}

/// Decode a multi-document YAML stream of hypervisors, clusters and nodes.
///
/// Empty documents are skipped; any other kind fails the whole decode.
pub fn decode_manifests(input: &str) -> Result<Manifests> {
    let mut manifests = Manifests::default();

    for document in serde_yaml::Deserializer::from_str(input) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let type_meta: TypeMeta = serde_yaml::from_value(value.clone())?;
        if is::<crd::Hypervisor>(&type_meta) {
            manifests.hypervisors.push(serde_yaml::from_value(value)?);
        } else if is::<crd::Cluster>(&type_meta) {
            manifests.clusters.push(serde_yaml::from_value(value)?);
        } else if is::<crd::Node>(&type_meta) {
            manifests.nodes.push(serde_yaml::from_value(value)?);
        } else {
            return Err(Error::UnknownKind {
                api_version: type_meta.api_version,
                kind: type_meta.kind,
            });
        }
    }

    debug!(
        "Decoded {} hypervisors, {} clusters, {} nodes",
        manifests.hypervisors.len(),
        manifests.clusters.len(),
        manifests.nodes.len()
    );
    Ok(manifests)
}

// =============================================================================
// Registries
// =============================================================================

/// The three registries a cluster reconciler works on
#[derive(Debug, Default)]
pub struct Registries {
    pub hypervisors: HypervisorRegistry,
    pub clusters: ClusterRegistry,
    pub nodes: NodeRegistry,
}

impl Registries {
    /// Empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Import decoded manifests.
    ///
    /// Hypervisor reservations are restored from their status; node ports
    /// are taken as already reserved and nothing new is allocated.
    pub fn load(manifests: &Manifests) -> Result<Self> {
        let res = Self::new();

        for hypervisor in &manifests.hypervisors {
            res.hypervisors.insert(Hypervisor::from_versioned(hypervisor)?)?;
        }
        for cluster in &manifests.clusters {
            res.clusters.insert(Cluster::from_versioned(cluster))?;
        }
        for node in &manifests.nodes {
            res.nodes.insert(Node::from_versioned(node)?)?;
        }

        info!(
            "Loaded {} hypervisors, {} clusters, {} nodes",
            res.hypervisors.len(),
            res.clusters.len(),
            res.nodes.len()
        );
        Ok(res)
    }

    /// Decode a manifest stream and import it
    pub fn from_yaml(input: &str) -> Result<Self> {
        Self::load(&decode_manifests(input)?)
    }

    /// Read and import a manifest file
    pub async fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let input = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&input)
    }
}
